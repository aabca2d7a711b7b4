// Scoring coefficients per position and club-level game/SG weight profiles.
//
// Every read here degrades instead of failing: a storage error is logged and
// the caller gets the documented default (coefficients) or zero (profiles).

use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result};
use rusqlite::{params, OptionalExtension};
use tracing::{debug, warn};

use crate::db::Database;
use crate::model::Position;

// ---------------------------------------------------------------------------
// Coefficient names
// ---------------------------------------------------------------------------

pub const FATOR_MEDIA: &str = "FATOR_MEDIA";
pub const FATOR_DS: &str = "FATOR_DS";
pub const FATOR_FF: &str = "FATOR_FF";
pub const FATOR_FS: &str = "FATOR_FS";
pub const FATOR_FD: &str = "FATOR_FD";
pub const FATOR_G: &str = "FATOR_G";
pub const FATOR_A: &str = "FATOR_A";
pub const FATOR_SG: &str = "FATOR_SG";
pub const FATOR_ESCALACAO: &str = "FATOR_ESCALACAO";
pub const FATOR_PESO_JOGO: &str = "FATOR_PESO_JOGO";
pub const FATOR_GOL_ADVERSARIO: &str = "FATOR_GOL_ADVERSARIO";

/// Typed coefficient table for one position family. Terms a position does
/// not use stay at 0.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PositionWeights {
    pub media: f64,
    pub ds: f64,
    pub ff: f64,
    pub fs: f64,
    pub fd: f64,
    pub g: f64,
    pub a: f64,
    pub sg: f64,
    pub escalacao: f64,
    pub peso_jogo: f64,
    pub gol_adversario: f64,
}

impl PositionWeights {
    /// Built-in coefficients used when a (user, team) stored none.
    pub fn defaults(position: Position) -> Self {
        match position {
            Position::Goleiro => PositionWeights {
                media: 0.2,
                ff: 4.5,
                fd: 6.5,
                sg: 1.5,
                peso_jogo: 1.5,
                gol_adversario: 2.0,
                ..Default::default()
            },
            Position::Zagueiro => PositionWeights {
                media: 1.5,
                ds: 4.5,
                sg: 4.0,
                escalacao: 5.0,
                peso_jogo: 5.0,
                ..Default::default()
            },
            Position::Lateral => PositionWeights {
                media: 3.0,
                ds: 8.0,
                sg: 2.0,
                escalacao: 10.0,
                ff: 2.0,
                fs: 1.0,
                fd: 2.0,
                g: 4.0,
                a: 4.0,
                peso_jogo: 1.0,
                ..Default::default()
            },
            Position::Meia => PositionWeights {
                media: 3.1,
                ds: 2.0,
                ff: 2.0,
                fs: 1.8,
                fd: 2.5,
                g: 5.0,
                a: 4.5,
                escalacao: 1.0,
                peso_jogo: 2.2,
                ..Default::default()
            },
            Position::Atacante => PositionWeights {
                media: 2.5,
                ds: 2.0,
                ff: 1.2,
                fs: 1.3,
                fd: 1.3,
                g: 2.5,
                a: 2.5,
                escalacao: 10.0,
                peso_jogo: 10.0,
                ..Default::default()
            },
            Position::Tecnico => PositionWeights {
                peso_jogo: 1.0,
                ..Default::default()
            },
        }
    }

    /// Coefficient by its stored name; unknown names read as 0.
    pub fn get(&self, name: &str) -> f64 {
        match name {
            FATOR_MEDIA => self.media,
            FATOR_DS => self.ds,
            FATOR_FF => self.ff,
            FATOR_FS => self.fs,
            FATOR_FD => self.fd,
            FATOR_G => self.g,
            FATOR_A => self.a,
            FATOR_SG => self.sg,
            FATOR_ESCALACAO => self.escalacao,
            FATOR_PESO_JOGO => self.peso_jogo,
            FATOR_GOL_ADVERSARIO => self.gol_adversario,
            _ => 0.0,
        }
    }

    fn set(&mut self, name: &str, value: f64) -> bool {
        let slot = match name {
            FATOR_MEDIA => &mut self.media,
            FATOR_DS => &mut self.ds,
            FATOR_FF => &mut self.ff,
            FATOR_FS => &mut self.fs,
            FATOR_FD => &mut self.fd,
            FATOR_G => &mut self.g,
            FATOR_A => &mut self.a,
            FATOR_SG => &mut self.sg,
            FATOR_ESCALACAO => &mut self.escalacao,
            FATOR_PESO_JOGO => &mut self.peso_jogo,
            FATOR_GOL_ADVERSARIO => &mut self.gol_adversario,
            _ => return false,
        };
        *slot = value;
        true
    }

    /// Overlay stored values on the position defaults. Non-finite values and
    /// unknown names are ignored.
    pub fn from_overrides(position: Position, overrides: &BTreeMap<String, f64>) -> Self {
        let mut weights = Self::defaults(position);
        for (name, value) in overrides {
            if !value.is_finite() {
                warn!("ignoring non-finite {name} for {position}");
                continue;
            }
            if !weights.set(name, *value) {
                debug!("ignoring unknown coefficient {name} for {position}");
            }
        }
        weights
    }
}

// ---------------------------------------------------------------------------
// WeightStore
// ---------------------------------------------------------------------------

/// Read-only view over coefficient maps and club weight profiles.
pub struct WeightStore<'a> {
    db: &'a Database,
}

impl<'a> WeightStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Full coefficient table for a (user, team, position).
    pub fn coefficients(&self, user_id: i64, team_id: i64, position: Position) -> PositionWeights {
        match self.load_overrides(user_id, team_id, position) {
            Ok(Some(map)) => PositionWeights::from_overrides(position, &map),
            Ok(None) => PositionWeights::defaults(position),
            Err(e) => {
                warn!("falling back to default {position} weights: {e:#}");
                PositionWeights::defaults(position)
            }
        }
    }

    /// Single coefficient lookup with the documented default on miss.
    pub fn get_coefficient(&self, user_id: i64, team_id: i64, position: Position, name: &str) -> f64 {
        self.coefficients(user_id, team_id, position).get(name)
    }

    fn load_overrides(
        &self,
        user_id: i64,
        team_id: i64,
        position: Position,
    ) -> Result<Option<BTreeMap<String, f64>>> {
        let json: Option<String> = self
            .db
            .conn()
            .query_row(
                "SELECT weights FROM position_weights
                 WHERE user_id = ?1 AND team_id = ?2 AND position_id = ?3",
                params![user_id, team_id, position.id()],
                |row| row.get(0),
            )
            .optional()
            .context("failed to query position weights")?;
        json.map(|text| {
            serde_json::from_str(&text).context("stored position weights are not a JSON number map")
        })
        .transpose()
    }

    pub fn get_club_game_weight(&self, profile_id: i64, club_id: i64, round: u32) -> f64 {
        self.profile_value("club_game_weight_profiles", "peso_jogo", profile_id, club_id, round)
    }

    pub fn get_club_sg_weight(&self, profile_id: i64, club_id: i64, round: u32) -> f64 {
        self.profile_value("club_sg_weight_profiles", "peso_sg", profile_id, club_id, round)
    }

    /// Every club's `peso_jogo` in a profile for one round.
    pub fn club_game_weights(&self, profile_id: i64, round: u32) -> HashMap<i64, f64> {
        self.profile_round("club_game_weight_profiles", "peso_jogo", profile_id, round)
            .into_iter()
            .collect()
    }

    /// Every club's `peso_sg` in a profile for one round.
    pub fn club_sg_weights(&self, profile_id: i64, round: u32) -> HashMap<i64, f64> {
        self.profile_round("club_sg_weight_profiles", "peso_sg", profile_id, round)
            .into_iter()
            .collect()
    }

    /// Clubs ordered by `peso_sg` descending, ties by club id.
    pub fn club_sg_ranking(&self, profile_id: i64, round: u32) -> Vec<(i64, f64)> {
        let mut ranking = self.profile_round("club_sg_weight_profiles", "peso_sg", profile_id, round);
        ranking.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        ranking
    }

    fn profile_value(&self, table: &str, column: &str, profile_id: i64, club_id: i64, round: u32) -> f64 {
        let sql = format!(
            "SELECT {column} FROM {table} WHERE profile_id = ?1 AND club_id = ?2 AND round_id = ?3"
        );
        let value: rusqlite::Result<Option<f64>> = self
            .db
            .conn()
            .query_row(&sql, params![profile_id, club_id, round], |row| row.get(0))
            .optional();
        match value {
            Ok(v) => v.map(non_negative).unwrap_or(0.0),
            Err(e) => {
                warn!("failed to read {column} for club {club_id} (profile {profile_id}, round {round}): {e}");
                0.0
            }
        }
    }

    fn profile_round(&self, table: &str, column: &str, profile_id: i64, round: u32) -> Vec<(i64, f64)> {
        let sql = format!("SELECT club_id, {column} FROM {table} WHERE profile_id = ?1 AND round_id = ?2");
        let conn = self.db.conn();
        let rows = conn.prepare(&sql).and_then(|mut stmt| {
            let rows = stmt
                .query_map(params![profile_id, round], |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?))
                })?
                .collect::<Result<Vec<_>, _>>();
            rows
        });
        match rows {
            Ok(rows) => rows.into_iter().map(|(club, w)| (club, non_negative(w))).collect(),
            Err(e) => {
                warn!("failed to read {column} profile {profile_id} for round {round}: {e}");
                Vec::new()
            }
        }
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}
