// End-to-end run per team: market check, ranking, optimization, submission.

use tracing::{error, info, warn};

use escalador_core::config::Config;
use escalador_core::db::Database;
use escalador_core::error::{EscalacaoError, Result};
use escalador_core::model::Team;
use escalador_core::optimizer::{optimize, Lineup, OptimizeRequest, SelectionUniverse};
use escalador_core::repository::Liveness;
use escalador_core::scoring::{rank_all, ScoringRequest};

use crate::cartola::{CartolaClient, MarketState, Transport};
use crate::submitter::Submitter;

/// What happened for one team.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamOutcome {
    pub team_id: i64,
    pub round: u32,
    pub lineup: Lineup,
    pub submitted: bool,
}

/// Per-team results of a batch run.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<TeamOutcome>,
    pub failures: Vec<(i64, EscalacaoError)>,
}

pub struct Pipeline<'a, T: Transport> {
    db: &'a Database,
    client: &'a CartolaClient<T>,
    config: &'a Config,
}

impl<'a, T: Transport> Pipeline<'a, T> {
    pub fn new(db: &'a Database, client: &'a CartolaClient<T>, config: &'a Config) -> Self {
        Self { db, client, config }
    }

    /// Round to work on. Refuses when the market is closed; an unknown
    /// market state is logged and tolerated.
    pub async fn open_round(&self) -> Result<u32> {
        let status = self.client.market_status().await?;
        let round = self.config.pipeline.round.or(status.round);
        match status.state {
            MarketState::Closed => {
                return Err(EscalacaoError::MarketClosed {
                    round: round.unwrap_or_default(),
                })
            }
            MarketState::Unknown => warn!("market status unknown, proceeding"),
            MarketState::Open => {}
        }
        round.ok_or_else(|| EscalacaoError::NetworkError("market status did not report the current round".into()))
    }

    /// Rank, optimize and (unless dry-run) submit for one team.
    pub async fn run_team(&self, team: &Team, round: u32) -> Result<TeamOutcome> {
        let scoring = ScoringRequest::new(team.user_id, team.team_id, round, &self.config.scoring);
        rank_all(self.db, &scoring)?;

        let submitter = Submitter::new(self.db, self.client);
        let patrimonio = submitter.fetch_patrimonio(team.team_id).await?;
        let settings = self.db.escalacao_settings(team.user_id, team.team_id)?;
        let request = OptimizeRequest::from_settings(&settings, patrimonio);

        let liveness = Liveness::from_flag(self.config.scoring.usar_provaveis_cartola);
        let universe = SelectionUniverse::load(self.db, team.user_id, team.team_id, round, liveness)?;
        let lineup = optimize(&universe, &request)?;
        info!("team {} ({}), round {}:\n{}", team.team_id, team.name, round, lineup.summary());

        let submitted = if self.config.pipeline.dry_run {
            info!("dry run: lineup for team {} not submitted", team.team_id);
            false
        } else {
            submitter.submit_lineup(team.team_id, &lineup.to_payload()).await?;
            true
        };

        Ok(TeamOutcome {
            team_id: team.team_id,
            round,
            lineup,
            submitted,
        })
    }

    /// Run every stored team. One team's failure does not stop the others.
    pub async fn run_all(&self) -> Result<BatchReport> {
        let round = self.open_round().await?;
        let teams = self.db.teams()?;
        info!("running {} teams for round {}", teams.len(), round);

        let mut report = BatchReport::default();
        for team in &teams {
            match self.run_team(team, round).await {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(e) => {
                    error!("team {} ({}) failed: {}", team.team_id, team.name, e);
                    report.failures.push((team.team_id, e));
                }
            }
        }
        info!(
            "batch done: {} succeeded, {} failed",
            report.outcomes.len(),
            report.failures.len()
        );
        Ok(report)
    }
}
