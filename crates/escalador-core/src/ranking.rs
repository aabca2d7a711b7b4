// Persisted per-position rankings keyed by (user, team, config, position, round).

use anyhow::{Context, Result};
use rusqlite::{params, OptionalExtension};

use crate::db::Database;
use crate::model::{CandidateScore, Position};

/// Identifies one stored ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankingKey {
    pub user_id: i64,
    pub team_id: i64,
    pub config_id: i64,
    pub position: Position,
    pub round: u32,
}

pub struct RankingStore<'a> {
    db: &'a Database,
}

impl<'a> RankingStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Replace the ranking stored under `key`. The serialized list and the
    /// timestamp are written in one statement inside a transaction.
    pub fn write_ranking(&self, key: &RankingKey, candidates: &[CandidateScore]) -> Result<()> {
        let json = serde_json::to_string(candidates).context("failed to serialize ranking")?;
        let updated_at = chrono::Utc::now().to_rfc3339();

        let mut conn = self.db.conn();
        let tx = conn.transaction().context("failed to begin ranking write")?;
        tx.execute(
            "INSERT INTO rankings (user_id, team_id, config_id, position_id, round_id, candidates, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(user_id, team_id, config_id, position_id, round_id) DO UPDATE SET
                candidates = excluded.candidates,
                updated_at = excluded.updated_at",
            params![
                key.user_id,
                key.team_id,
                key.config_id,
                key.position.id(),
                key.round,
                json,
                updated_at,
            ],
        )
        .with_context(|| format!("failed to store {} ranking for round {}", key.position, key.round))?;
        tx.commit().context("failed to commit ranking write")?;
        Ok(())
    }

    /// Stored ranking in its persisted order; empty when none exists.
    pub fn read_ranking(&self, key: &RankingKey) -> Result<Vec<CandidateScore>> {
        let json: Option<String> = self
            .db
            .conn()
            .query_row(
                "SELECT candidates FROM rankings
                 WHERE user_id = ?1 AND team_id = ?2 AND config_id = ?3
                   AND position_id = ?4 AND round_id = ?5",
                params![key.user_id, key.team_id, key.config_id, key.position.id(), key.round],
                |row| row.get(0),
            )
            .optional()
            .context("failed to read ranking")?;
        match json {
            Some(text) => serde_json::from_str(&text).context("stored ranking is not valid JSON"),
            None => Ok(Vec::new()),
        }
    }

    /// Timestamp of the last write under `key`.
    pub fn updated_at(&self, key: &RankingKey) -> Result<Option<String>> {
        self.db
            .conn()
            .query_row(
                "SELECT updated_at FROM rankings
                 WHERE user_id = ?1 AND team_id = ?2 AND config_id = ?3
                   AND position_id = ?4 AND round_id = ?5",
                params![key.user_id, key.team_id, key.config_id, key.position.id(), key.round],
                |row| row.get(0),
            )
            .optional()
            .context("failed to read ranking timestamp")
    }

    /// Drop every ranking of a (user, team). Returns the rows removed.
    pub fn delete_team_rankings(&self, user_id: i64, team_id: i64) -> Result<usize> {
        let removed = self
            .db
            .conn()
            .execute(
                "DELETE FROM rankings WHERE user_id = ?1 AND team_id = ?2",
                params![user_id, team_id],
            )
            .context("failed to delete team rankings")?;
        Ok(removed)
    }
}
