// Caller-visible failure reasons for ranking, optimization and submission.

use thiserror::Error;

use crate::model::Position;

#[derive(Debug, Error)]
pub enum EscalacaoError {
    #[error("market is closed for round {round}; lineup not submitted")]
    MarketClosed { round: u32 },

    #[error("team {team_id} has no usable access token")]
    TokenUnavailable { team_id: i64 },

    #[error("not enough candidates for {position}: needed {needed}, found {found}")]
    InsufficientCandidates {
        position: Position,
        needed: usize,
        found: usize,
    },

    #[error("no combination fits within patrimonio {patrimonio:.2}")]
    BudgetInfeasible { patrimonio: f64 },

    #[error("upstream rejected the request (HTTP {status}): {message}")]
    UpstreamRejected { status: u16, message: String },

    #[error("upstream conflict: lineup already submitted or invalid")]
    UpstreamConflict,

    /// A built lineup broke its own invariants.
    #[error("invalid lineup: {0}")]
    InvalidLineup(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("network error: {0}")]
    NetworkError(String),
}

impl EscalacaoError {
    /// Wrap a datastore failure, keeping the whole context chain.
    pub fn storage(err: anyhow::Error) -> Self {
        EscalacaoError::StorageError(format!("{err:#}"))
    }
}

impl From<anyhow::Error> for EscalacaoError {
    fn from(err: anyhow::Error) -> Self {
        EscalacaoError::storage(err)
    }
}

pub type Result<T> = std::result::Result<T, EscalacaoError>;
