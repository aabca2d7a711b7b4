// Current season lookup, memoized for an hour.

use std::sync::Mutex;
use std::time::Duration;

use chrono::Datelike;
use tokio::time::Instant;
use tracing::warn;

use crate::cartola::{CartolaClient, Transport};

pub const SEASON_TTL: Duration = Duration::from_secs(3600);

pub struct SeasonCache {
    ttl: Duration,
    cached: Mutex<Option<(i32, Instant)>>,
}

impl Default for SeasonCache {
    fn default() -> Self {
        Self::new(SEASON_TTL)
    }
}

impl SeasonCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            cached: Mutex::new(None),
        }
    }

    fn fresh(&self) -> Option<i32> {
        let cached = *self.cached.lock().expect("season cache lock poisoned");
        cached
            .filter(|(_, at)| at.elapsed() < self.ttl)
            .map(|(season, _)| season)
    }

    /// Season reported by the market status. Falls back to the calendar
    /// year when the API is unreachable or omits it; fallbacks are not cached.
    pub async fn current_season<T: Transport>(&self, client: &CartolaClient<T>) -> i32 {
        if let Some(season) = self.fresh() {
            return season;
        }
        match client.market_status().await {
            Ok(status) => {
                if let Some(season) = status.season {
                    *self.cached.lock().expect("season cache lock poisoned") = Some((season, Instant::now()));
                    return season;
                }
                warn!("market status has no season, using the current year");
            }
            Err(e) => warn!("season lookup failed ({e}), using the current year"),
        }
        chrono::Local::now().year()
    }
}
