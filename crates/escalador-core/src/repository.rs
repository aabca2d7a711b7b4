// Read layer over athletes, clubs, fixtures, scouts, popularity and
// provável marks.

use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter};

use crate::db::Database;
use crate::model::{Athlete, PopularityRow, Position, PROVAVEL_MARK, STATUS_PROVAVEL};

/// Size of the popularity table slice that defines the distribution.
pub const POPULARITY_TOP: usize = 20;

/// Where "this athlete will play" comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Provável mark equal to "provavel" for the round.
    ProvavelTable,
    /// Status id 7 on the athlete row.
    StatusId,
}

impl Liveness {
    pub fn from_flag(usar_provaveis_cartola: bool) -> Self {
        if usar_provaveis_cartola {
            Liveness::ProvavelTable
        } else {
            Liveness::StatusId
        }
    }

    /// Coaches are never listed in the provável table.
    pub fn for_position(self, position: Position) -> Self {
        if position == Position::Tecnico {
            Liveness::StatusId
        } else {
            self
        }
    }
}

/// Minimum games an athlete needs to be ranked in `round`.
pub fn min_jogos(round: u32, min_jogos_pref: i64, rodada_min_jogos: u32) -> i64 {
    if round >= rodada_min_jogos {
        min_jogos_pref
    } else {
        1
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CandidateAthlete {
    pub athlete: Athlete,
    pub club_name: String,
}

/// The other side of a club's fixture in a round.
#[derive(Debug, Clone, PartialEq)]
pub struct Opponent {
    pub club_id: i64,
    pub name: String,
}

/// Arithmetic means of each scout kind; zero where no rows exist.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScoutAverages {
    pub ds: f64,
    pub ff: f64,
    pub fs: f64,
    pub fd: f64,
    pub g: f64,
    pub a: f64,
}

impl ScoutAverages {
    fn from_row(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Self> {
        let col = |i: usize| -> rusqlite::Result<f64> {
            Ok(row.get::<_, Option<f64>>(offset + i)?.unwrap_or(0.0))
        };
        Ok(ScoutAverages {
            ds: col(0)?,
            ff: col(1)?,
            fs: col(2)?,
            fd: col(3)?,
            g: col(4)?,
            a: col(5)?,
        })
    }
}

const AVG_COLUMNS: &str = "AVG(s.ds), AVG(s.ff), AVG(s.fs), AVG(s.fd), AVG(s.g), AVG(s.a)";

const ATHLETE_COLUMNS: &str =
    "a.athlete_id, a.nickname, a.full_name, a.club_id, a.position_id, a.price, a.season_avg, a.games, a.status_id";

fn row_to_athlete(row: &rusqlite::Row<'_>) -> rusqlite::Result<Athlete> {
    Ok(Athlete {
        athlete_id: row.get(0)?,
        nickname: row.get(1)?,
        full_name: row.get(2)?,
        club_id: row.get(3)?,
        position_id: row.get(4)?,
        price: row.get(5)?,
        season_avg: row.get(6)?,
        games: row.get(7)?,
        status_id: row.get(8)?,
    })
}

/// SQL predicate (on alias `a`) for the liveness source. Only the provável
/// table form reads the round, from `?{round_param}`.
fn liveness_clause(liveness: Liveness, round_param: usize) -> String {
    match liveness {
        Liveness::ProvavelTable => format!(
            "EXISTS (SELECT 1 FROM provaveis p WHERE p.athlete_id = a.athlete_id \
             AND p.round_id = ?{round_param} AND p.status = '{PROVAVEL_MARK}')"
        ),
        Liveness::StatusId => format!("a.status_id = {STATUS_PROVAVEL}"),
    }
}

/// Bind values for a query whose last placeholder is the liveness round.
fn bind_round(mut values: Vec<Value>, liveness: Liveness, round: u32) -> Vec<Value> {
    if liveness == Liveness::ProvavelTable {
        values.push(Value::Integer(i64::from(round)));
    }
    values
}

// ---------------------------------------------------------------------------
// AthleteRepository
// ---------------------------------------------------------------------------

pub struct AthleteRepository<'a> {
    db: &'a Database,
}

impl<'a> AthleteRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Live athletes of a position with at least `min_jogos` games, in fetch
    /// order: season average desc, then price asc, then id.
    pub fn candidates(
        &self,
        position: Position,
        round: u32,
        min_jogos: i64,
        liveness: Liveness,
    ) -> Result<Vec<CandidateAthlete>> {
        let liveness = liveness.for_position(position);
        let sql = format!(
            "SELECT {ATHLETE_COLUMNS}, COALESCE(c.name, '')
             FROM athletes a
             LEFT JOIN clubs c ON c.id = a.club_id
             WHERE a.position_id = ?1 AND a.games >= ?2 AND {}
             ORDER BY a.season_avg DESC, a.price ASC, a.athlete_id ASC",
            liveness_clause(liveness, 3)
        );
        let conn = self.db.conn();
        let mut stmt = conn.prepare(&sql).context("failed to prepare candidates query")?;
        let rows = stmt
            .query_map(
                params_from_iter(bind_round(
                    vec![Value::Integer(position.id()), Value::Integer(min_jogos)],
                    liveness,
                    round,
                )),
                |row| {
                    Ok(CandidateAthlete {
                        athlete: row_to_athlete(row)?,
                        club_name: row.get(9)?,
                    })
                },
            )
            .context("failed to query candidates")?
            .collect::<Result<Vec<_>, _>>()
            .context("failed to read candidate row")?;
        Ok(rows)
    }

    /// Every athlete of a position regardless of liveness, keyed by id.
    pub fn athletes_of_position(&self, position: Position) -> Result<HashMap<i64, Athlete>> {
        let sql = format!("SELECT {ATHLETE_COLUMNS} FROM athletes a WHERE a.position_id = ?1");
        let conn = self.db.conn();
        let mut stmt = conn.prepare(&sql).context("failed to prepare athletes query")?;
        let rows = stmt
            .query_map(params![position.id()], row_to_athlete)
            .context("failed to query athletes")?
            .collect::<Result<Vec<_>, _>>()
            .context("failed to read athlete row")?;
        Ok(rows.into_iter().map(|a| (a.athlete_id, a)).collect())
    }

    /// Every goalkeeper with its status, cheapest first.
    pub fn goalkeepers(&self) -> Result<Vec<Athlete>> {
        let mut gks: Vec<Athlete> = self.athletes_of_position(Position::Goleiro)?.into_values().collect();
        gks.sort_by(|a, b| {
            a.price
                .partial_cmp(&b.price)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.athlete_id.cmp(&b.athlete_id))
        });
        Ok(gks)
    }

    /// Ids of the live athletes of a position in `round`.
    pub fn live_athlete_ids(&self, position: Position, round: u32, liveness: Liveness) -> Result<HashSet<i64>> {
        let liveness = liveness.for_position(position);
        let sql = format!(
            "SELECT a.athlete_id FROM athletes a WHERE a.position_id = ?1 AND {}",
            liveness_clause(liveness, 2)
        );
        let conn = self.db.conn();
        let mut stmt = conn.prepare(&sql).context("failed to prepare liveness query")?;
        let ids = stmt
            .query_map(
                params_from_iter(bind_round(vec![Value::Integer(position.id())], liveness, round)),
                |row| row.get::<_, i64>(0),
            )
            .context("failed to query live athletes")?
            .collect::<Result<HashSet<_>, _>>()
            .context("failed to read live athlete id")?;
        Ok(ids)
    }

    /// Live athletes of one club and position, cheapest first.
    pub fn club_candidates(
        &self,
        club_id: i64,
        position: Position,
        round: u32,
        liveness: Liveness,
    ) -> Result<Vec<Athlete>> {
        let liveness = liveness.for_position(position);
        let sql = format!(
            "SELECT {ATHLETE_COLUMNS} FROM athletes a
             WHERE a.position_id = ?1 AND a.club_id = ?2 AND {}
             ORDER BY a.price ASC, a.athlete_id ASC",
            liveness_clause(liveness, 3)
        );
        let conn = self.db.conn();
        let mut stmt = conn.prepare(&sql).context("failed to prepare club candidates query")?;
        let rows = stmt
            .query_map(
                params_from_iter(bind_round(
                    vec![Value::Integer(position.id()), Value::Integer(club_id)],
                    liveness,
                    round,
                )),
                row_to_athlete,
            )
            .context("failed to query club candidates")?
            .collect::<Result<Vec<_>, _>>()
            .context("failed to read club candidate row")?;
        Ok(rows)
    }

    // -----------------------------------------------------------------------
    // Scout averages
    // -----------------------------------------------------------------------

    /// Per-athlete scout means over rounds `<= round - 1` where the athlete
    /// entered the pitch. Athletes without rows are absent from the map.
    pub fn self_scout_averages(&self, round: u32) -> Result<HashMap<i64, ScoutAverages>> {
        let sql = format!(
            "SELECT s.athlete_id, {AVG_COLUMNS} FROM scouts s
             WHERE s.entered = 1 AND s.round_id <= ?1
             GROUP BY s.athlete_id"
        );
        self.grouped_averages(&sql, params![i64::from(round) - 1])
    }

    /// Scouts conceded by each club to athletes of `position`: for every
    /// club that has been an opponent in rounds `<= round - 1`, the mean of
    /// each scout kind across the position's athletes who faced it.
    pub fn opponent_allowances(&self, position: Position, round: u32) -> Result<HashMap<i64, ScoutAverages>> {
        let sql = format!(
            "SELECT CASE WHEN m.home_club_id = s.club_id THEN m.away_club_id ELSE m.home_club_id END AS opponent,
                    {AVG_COLUMNS}
             FROM scouts s
             JOIN matches m ON m.round_id = s.round_id
                           AND (m.home_club_id = s.club_id OR m.away_club_id = s.club_id)
             WHERE s.position_id = ?1 AND s.entered = 1 AND s.round_id <= ?2
             GROUP BY opponent"
        );
        self.grouped_averages(&sql, params![position.id(), i64::from(round) - 1])
    }

    /// Per-club scout means across all of the club's athletes over rounds
    /// `<= round - 1`. The goalkeeper reads the opponent's FF/FD from here.
    pub fn club_scout_averages(&self, round: u32) -> Result<HashMap<i64, ScoutAverages>> {
        let sql = format!(
            "SELECT s.club_id, {AVG_COLUMNS} FROM scouts s
             WHERE s.entered = 1 AND s.round_id <= ?1
             GROUP BY s.club_id"
        );
        self.grouped_averages(&sql, params![i64::from(round) - 1])
    }

    fn grouped_averages(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<HashMap<i64, ScoutAverages>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(sql).context("failed to prepare scout aggregate")?;
        let rows = stmt
            .query_map(params, |row| Ok((row.get::<_, i64>(0)?, ScoutAverages::from_row(row, 1)?)))
            .context("failed to run scout aggregate")?
            .collect::<Result<HashMap<_, _>, _>>()
            .context("failed to read scout aggregate row")?;
        Ok(rows)
    }

    /// Goals scored per game by `club_id` in valid, finished matches before
    /// `round`. Zero when the club has none.
    pub fn opponent_goals_average(&self, club_id: i64, round: u32) -> Result<f64> {
        let (goals, games): (Option<i64>, i64) = self
            .db
            .conn()
            .query_row(
                "SELECT SUM(CASE WHEN m.home_club_id = ?1 THEN m.home_score ELSE m.away_score END),
                        COUNT(*)
                 FROM matches m
                 WHERE (m.home_club_id = ?1 OR m.away_club_id = ?1)
                   AND m.round_id < ?2 AND m.valid = 1
                   AND m.home_score IS NOT NULL AND m.away_score IS NOT NULL",
                params![club_id, round],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .context("failed to query goals average")?;
        if games == 0 {
            return Ok(0.0);
        }
        Ok(goals.unwrap_or(0) as f64 / games as f64)
    }

    // -----------------------------------------------------------------------
    // Fixtures and popularity
    // -----------------------------------------------------------------------

    /// Opponent of every club with a valid match in `round`.
    pub fn round_opponents(&self, round: u32) -> Result<HashMap<i64, Opponent>> {
        let conn = self.db.conn();
        let mut stmt = conn
            .prepare(
                "SELECT m.home_club_id, COALESCE(h.name, ''), m.away_club_id, COALESCE(w.name, '')
                 FROM matches m
                 LEFT JOIN clubs h ON h.id = m.home_club_id
                 LEFT JOIN clubs w ON w.id = m.away_club_id
                 WHERE m.round_id = ?1 AND m.valid = 1
                 ORDER BY m.home_club_id",
            )
            .context("failed to prepare round fixtures query")?;
        let fixtures = stmt
            .query_map(params![round], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .context("failed to query round fixtures")?
            .collect::<Result<Vec<_>, _>>()
            .context("failed to read fixture row")?;

        let mut opponents = HashMap::new();
        for (home, home_name, away, away_name) in fixtures {
            opponents
                .entry(home)
                .or_insert(Opponent { club_id: away, name: away_name });
            opponents
                .entry(away)
                .or_insert(Opponent { club_id: home, name: home_name });
        }
        Ok(opponents)
    }

    /// The `limit` most-picked athletes of the round.
    pub fn top_popularity(&self, round: u32, limit: usize) -> Result<Vec<PopularityRow>> {
        let conn = self.db.conn();
        let mut stmt = conn
            .prepare(
                "SELECT athlete_id, round_id, escalacoes FROM popularity
                 WHERE round_id = ?1
                 ORDER BY escalacoes DESC, athlete_id ASC
                 LIMIT ?2",
            )
            .context("failed to prepare popularity query")?;
        let rows = stmt
            .query_map(params![round, limit as i64], |row| {
                Ok(PopularityRow {
                    athlete_id: row.get(0)?,
                    round_id: row.get(1)?,
                    escalacoes: row.get(2)?,
                })
            })
            .context("failed to query popularity")?
            .collect::<Result<Vec<_>, _>>()
            .context("failed to read popularity row")?;
        Ok(rows)
    }
}
