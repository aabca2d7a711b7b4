// Goalkeeper hack and goalkeeper reserve selection.
//
// The hack starts a goalkeeper who will not play, priced above the best
// provável goalkeeper, and benches the best one. Automatic substitution
// brings the reserve in.

use std::collections::HashSet;

use tracing::info;

use super::selection::BUDGET_EPSILON;
use super::universe::{GoalkeeperEntry, Pick, SelectionUniverse};
use crate::model::{Position, STATUS_DUVIDA, STATUS_PROVAVEL};

/// Goalkeeper slot after the hack or reserve pass.
#[derive(Debug, Clone, PartialEq)]
pub struct GoalkeeperChoice {
    pub starter: Pick,
    pub reserve: Option<Pick>,
}

/// Best live goalkeeper by ranking score. With no ranked goalkeeper, the
/// cheapest live one.
fn best_live(universe: &SelectionUniverse) -> Option<Pick> {
    universe
        .ranked(Position::Goleiro)
        .first()
        .cloned()
        .or_else(|| {
            universe
                .goalkeepers()
                .iter()
                .find(|gk| gk.live)
                .map(|gk| gk.pick.clone())
        })
}

fn is_null(gk: &GoalkeeperEntry) -> bool {
    gk.status_id != STATUS_PROVAVEL && gk.status_id != STATUS_DUVIDA
}

/// Highest-scoring live goalkeeper strictly cheaper than `starter`, not
/// already in the lineup.
pub fn cheaper_reserve(universe: &SelectionUniverse, starter: &Pick, used: &HashSet<i64>) -> Option<Pick> {
    universe
        .ranked(Position::Goleiro)
        .iter()
        .find(|gk| {
            gk.athlete_id != starter.athlete_id && !used.contains(&gk.athlete_id) && gk.price < starter.price
        })
        .cloned()
}

/// Apply the hack to the goalkeeper slot. `cost` is the lineup cost with
/// `current` as starter.
pub fn apply(
    universe: &SelectionUniverse,
    current: &Pick,
    cost: f64,
    patrimonio: f64,
    used: &HashSet<i64>,
) -> GoalkeeperChoice {
    let Some(best) = best_live(universe) else {
        return GoalkeeperChoice {
            starter: current.clone(),
            reserve: cheaper_reserve(universe, current, used),
        };
    };

    let null = universe
        .goalkeepers()
        .iter()
        .filter(|gk| is_null(gk))
        .find(|gk| gk.pick.price > best.price);

    let base = cost - current.price;
    if let Some(null) = null {
        if base + null.pick.price <= patrimonio + BUDGET_EPSILON {
            info!(
                "goalkeeper hack: starting {} ({:.2}) with {} ({:.2}) as reserve",
                null.pick.nickname, null.pick.price, best.nickname, best.price
            );
            return GoalkeeperChoice {
                starter: null.pick.clone(),
                reserve: Some(best),
            };
        }
    }

    let starter = if base + best.price <= patrimonio + BUDGET_EPSILON {
        best
    } else {
        current.clone()
    };
    info!("goalkeeper hack: no affordable non-playing goalkeeper, starting {}", starter.nickname);
    let reserve = cheaper_reserve(universe, &starter, used);
    GoalkeeperChoice { starter, reserve }
}
