// SQLite datastore: schema, market-data writes, teams and per-team settings.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

use crate::model::{
    Athlete, Club, EscalacaoSettings, Match, PopularityRow, Position, ProvavelMark, ScoutRow,
    Strategy, Team, WeightConfiguration,
};

/// SQLite-backed persistence for market data, weight profiles, teams,
/// settings and rankings.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS clubs (
                id           INTEGER PRIMARY KEY,
                name         TEXT NOT NULL,
                abbreviation TEXT NOT NULL DEFAULT ''
            );

            CREATE TABLE IF NOT EXISTS athletes (
                athlete_id  INTEGER PRIMARY KEY,
                nickname    TEXT NOT NULL,
                full_name   TEXT NOT NULL DEFAULT '',
                club_id     INTEGER NOT NULL,
                position_id INTEGER NOT NULL,
                price       REAL NOT NULL DEFAULT 0,
                season_avg  REAL NOT NULL DEFAULT 0,
                games       INTEGER NOT NULL DEFAULT 0,
                status_id   INTEGER NOT NULL DEFAULT 0,
                peso_jogo   REAL NOT NULL DEFAULT 0,
                peso_sg     REAL NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_athletes_position ON athletes(position_id);
            CREATE INDEX IF NOT EXISTS idx_athletes_club ON athletes(club_id, position_id);

            CREATE TABLE IF NOT EXISTS matches (
                round_id     INTEGER NOT NULL,
                home_club_id INTEGER NOT NULL,
                away_club_id INTEGER NOT NULL,
                valid        INTEGER NOT NULL DEFAULT 1,
                home_score   INTEGER,
                away_score   INTEGER,
                PRIMARY KEY (round_id, home_club_id, away_club_id)
            );

            CREATE TABLE IF NOT EXISTS scouts (
                athlete_id  INTEGER NOT NULL,
                round_id    INTEGER NOT NULL,
                position_id INTEGER NOT NULL,
                club_id     INTEGER NOT NULL,
                entered     INTEGER NOT NULL DEFAULT 0,
                ds          INTEGER NOT NULL DEFAULT 0,
                ff          INTEGER NOT NULL DEFAULT 0,
                fs          INTEGER NOT NULL DEFAULT 0,
                fd          INTEGER NOT NULL DEFAULT 0,
                g           INTEGER NOT NULL DEFAULT 0,
                a           INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (athlete_id, round_id)
            );
            CREATE INDEX IF NOT EXISTS idx_scouts_round ON scouts(round_id, position_id);

            CREATE TABLE IF NOT EXISTS provaveis (
                athlete_id INTEGER NOT NULL,
                round_id   INTEGER NOT NULL,
                status     TEXT NOT NULL,
                PRIMARY KEY (athlete_id, round_id)
            );

            CREATE TABLE IF NOT EXISTS popularity (
                athlete_id INTEGER NOT NULL,
                round_id   INTEGER NOT NULL,
                escalacoes INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (athlete_id, round_id)
            );

            CREATE TABLE IF NOT EXISTS club_game_weight_profiles (
                profile_id INTEGER NOT NULL,
                club_id    INTEGER NOT NULL,
                round_id   INTEGER NOT NULL,
                peso_jogo  REAL NOT NULL DEFAULT 0,
                PRIMARY KEY (profile_id, club_id, round_id)
            );

            CREATE TABLE IF NOT EXISTS club_sg_weight_profiles (
                profile_id INTEGER NOT NULL,
                club_id    INTEGER NOT NULL,
                round_id   INTEGER NOT NULL,
                peso_sg    REAL NOT NULL DEFAULT 0,
                PRIMARY KEY (profile_id, club_id, round_id)
            );

            CREATE TABLE IF NOT EXISTS teams (
                team_id       INTEGER PRIMARY KEY,
                user_id       INTEGER NOT NULL,
                name          TEXT NOT NULL DEFAULT '',
                access_token  TEXT,
                refresh_token TEXT,
                id_token      TEXT,
                updated_at    TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE IF NOT EXISTS position_weights (
                user_id     INTEGER NOT NULL,
                team_id     INTEGER NOT NULL,
                position_id INTEGER NOT NULL,
                weights     TEXT NOT NULL,
                PRIMARY KEY (user_id, team_id, position_id)
            );

            CREATE TABLE IF NOT EXISTS weight_configurations (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id         INTEGER NOT NULL,
                team_id         INTEGER NOT NULL,
                game_profile_id INTEGER NOT NULL,
                sg_profile_id   INTEGER NOT NULL,
                UNIQUE(user_id, team_id)
            );

            CREATE TABLE IF NOT EXISTS escalacao_settings (
                user_id          INTEGER NOT NULL,
                team_id          INTEGER NOT NULL,
                formation        TEXT NOT NULL DEFAULT '4-3-3',
                captain_position TEXT NOT NULL DEFAULT 'atacantes',
                strategy         INTEGER NOT NULL DEFAULT 1,
                goalkeeper_hack  INTEGER NOT NULL DEFAULT 0,
                updated_at       TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                PRIMARY KEY (user_id, team_id)
            );

            CREATE TABLE IF NOT EXISTS rankings (
                user_id     INTEGER NOT NULL,
                team_id     INTEGER NOT NULL,
                config_id   INTEGER NOT NULL,
                position_id INTEGER NOT NULL,
                round_id    INTEGER NOT NULL,
                candidates  TEXT NOT NULL,
                updated_at  TEXT NOT NULL,
                PRIMARY KEY (user_id, team_id, config_id, position_id, round_id)
            );
            ",
        )
        .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock). This should never happen in normal operation.
    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    // -----------------------------------------------------------------------
    // Market data
    // -----------------------------------------------------------------------

    pub fn upsert_clubs(&self, clubs: &[Club]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin club import")?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO clubs (id, name, abbreviation) VALUES (?1, ?2, ?3)
                     ON CONFLICT(id) DO UPDATE SET name = excluded.name,
                                                   abbreviation = excluded.abbreviation",
                )
                .context("failed to prepare club upsert")?;
            for club in clubs {
                stmt.execute(params![club.id, club.name, club.abbreviation])
                    .with_context(|| format!("failed to upsert club {}", club.id))?;
            }
        }
        tx.commit().context("failed to commit club import")?;
        Ok(clubs.len())
    }

    /// Insert or refresh athletes. Legacy `peso_jogo`/`peso_sg` columns are
    /// left untouched on update.
    pub fn upsert_athletes(&self, athletes: &[Athlete]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin athlete import")?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO athletes
                        (athlete_id, nickname, full_name, club_id, position_id, price, season_avg, games, status_id)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                     ON CONFLICT(athlete_id) DO UPDATE SET
                        nickname = excluded.nickname,
                        full_name = excluded.full_name,
                        club_id = excluded.club_id,
                        position_id = excluded.position_id,
                        price = excluded.price,
                        season_avg = excluded.season_avg,
                        games = excluded.games,
                        status_id = excluded.status_id",
                )
                .context("failed to prepare athlete upsert")?;
            for a in athletes {
                stmt.execute(params![
                    a.athlete_id,
                    a.nickname,
                    a.full_name,
                    a.club_id,
                    a.position_id,
                    a.price,
                    a.season_avg,
                    a.games,
                    a.status_id,
                ])
                .with_context(|| format!("failed to upsert athlete {}", a.athlete_id))?;
            }
        }
        tx.commit().context("failed to commit athlete import")?;
        Ok(athletes.len())
    }

    pub fn upsert_matches(&self, matches: &[Match]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin match import")?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR REPLACE INTO matches
                        (round_id, home_club_id, away_club_id, valid, home_score, away_score)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )
                .context("failed to prepare match upsert")?;
            for m in matches {
                stmt.execute(params![
                    m.round_id,
                    m.home_club_id,
                    m.away_club_id,
                    m.valid,
                    m.home_score,
                    m.away_score,
                ])
                .with_context(|| {
                    format!(
                        "failed to upsert match {} x {} (round {})",
                        m.home_club_id, m.away_club_id, m.round_id
                    )
                })?;
            }
        }
        tx.commit().context("failed to commit match import")?;
        Ok(matches.len())
    }

    pub fn upsert_scouts(&self, rows: &[ScoutRow]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin scout import")?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR REPLACE INTO scouts
                        (athlete_id, round_id, position_id, club_id, entered, ds, ff, fs, fd, g, a)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                )
                .context("failed to prepare scout upsert")?;
            for s in rows {
                stmt.execute(params![
                    s.athlete_id,
                    s.round_id,
                    s.position_id,
                    s.club_id,
                    s.entered,
                    s.ds,
                    s.ff,
                    s.fs,
                    s.fd,
                    s.g,
                    s.a,
                ])
                .with_context(|| {
                    format!("failed to upsert scouts of {} (round {})", s.athlete_id, s.round_id)
                })?;
            }
        }
        tx.commit().context("failed to commit scout import")?;
        Ok(rows.len())
    }

    pub fn upsert_provaveis(&self, marks: &[ProvavelMark]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin provavel import")?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR REPLACE INTO provaveis (athlete_id, round_id, status)
                     VALUES (?1, ?2, ?3)",
                )
                .context("failed to prepare provavel upsert")?;
            for m in marks {
                stmt.execute(params![m.athlete_id, m.round_id, m.status])
                    .with_context(|| format!("failed to upsert provavel mark {}", m.athlete_id))?;
            }
        }
        tx.commit().context("failed to commit provavel import")?;
        Ok(marks.len())
    }

    /// Replace the popularity table of each round present in `rows`.
    pub fn replace_popularity(&self, rows: &[PopularityRow]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin popularity import")?;
        let mut rounds: Vec<u32> = rows.iter().map(|r| r.round_id).collect();
        rounds.sort_unstable();
        rounds.dedup();
        for round in rounds {
            tx.execute("DELETE FROM popularity WHERE round_id = ?1", params![round])
                .context("failed to clear popularity round")?;
        }
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR REPLACE INTO popularity (athlete_id, round_id, escalacoes)
                     VALUES (?1, ?2, ?3)",
                )
                .context("failed to prepare popularity insert")?;
            for r in rows {
                stmt.execute(params![r.athlete_id, r.round_id, r.escalacoes])
                    .with_context(|| format!("failed to insert popularity of {}", r.athlete_id))?;
            }
        }
        tx.commit().context("failed to commit popularity import")?;
        Ok(rows.len())
    }

    pub fn set_club_game_weight(&self, profile_id: i64, club_id: i64, round: u32, peso_jogo: f64) -> Result<()> {
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO club_game_weight_profiles (profile_id, club_id, round_id, peso_jogo)
                 VALUES (?1, ?2, ?3, ?4)",
                params![profile_id, club_id, round, peso_jogo],
            )
            .context("failed to store club game weight")?;
        Ok(())
    }

    pub fn set_club_sg_weight(&self, profile_id: i64, club_id: i64, round: u32, peso_sg: f64) -> Result<()> {
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO club_sg_weight_profiles (profile_id, club_id, round_id, peso_sg)
                 VALUES (?1, ?2, ?3, ?4)",
                params![profile_id, club_id, round, peso_sg],
            )
            .context("failed to store club SG weight")?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Per (user, team) weights and settings
    // -----------------------------------------------------------------------

    /// Store a coefficient map for one position of a (user, team).
    pub fn set_position_weights(
        &self,
        user_id: i64,
        team_id: i64,
        position: Position,
        weights: &BTreeMap<String, f64>,
    ) -> Result<()> {
        let json = serde_json::to_string(weights).context("failed to serialize position weights")?;
        self.conn()
            .execute(
                "INSERT INTO position_weights (user_id, team_id, position_id, weights)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id, team_id, position_id) DO UPDATE SET weights = excluded.weights",
                params![user_id, team_id, position.id(), json],
            )
            .context("failed to store position weights")?;
        Ok(())
    }

    /// Create or update the weight configuration; returns its id.
    pub fn upsert_weight_configuration(
        &self,
        user_id: i64,
        team_id: i64,
        game_profile_id: i64,
        sg_profile_id: i64,
    ) -> Result<i64> {
        let conn = self.conn();
        let id: i64 = conn
            .query_row(
                "INSERT INTO weight_configurations (user_id, team_id, game_profile_id, sg_profile_id)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id, team_id) DO UPDATE SET
                    game_profile_id = excluded.game_profile_id,
                    sg_profile_id = excluded.sg_profile_id
                 RETURNING id",
                params![user_id, team_id, game_profile_id, sg_profile_id],
                |row| row.get(0),
            )
            .context("failed to upsert weight configuration")?;
        Ok(id)
    }

    pub fn weight_configuration(&self, user_id: i64, team_id: i64) -> Result<Option<WeightConfiguration>> {
        self.conn()
            .query_row(
                "SELECT id, game_profile_id, sg_profile_id FROM weight_configurations
                 WHERE user_id = ?1 AND team_id = ?2",
                params![user_id, team_id],
                |row| {
                    Ok(WeightConfiguration {
                        id: row.get(0)?,
                        game_profile_id: row.get(1)?,
                        sg_profile_id: row.get(2)?,
                    })
                },
            )
            .optional()
            .context("failed to load weight configuration")
    }

    pub fn upsert_escalacao_settings(
        &self,
        user_id: i64,
        team_id: i64,
        settings: &EscalacaoSettings,
    ) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO escalacao_settings
                    (user_id, team_id, formation, captain_position, strategy, goalkeeper_hack)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(user_id, team_id) DO UPDATE SET
                    formation = excluded.formation,
                    captain_position = excluded.captain_position,
                    strategy = excluded.strategy,
                    goalkeeper_hack = excluded.goalkeeper_hack,
                    updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![
                    user_id,
                    team_id,
                    settings.formation,
                    settings.captain_position.plural_key(),
                    settings.strategy.id(),
                    settings.goalkeeper_hack,
                ],
            )
            .context("failed to upsert escalacao settings")?;
        Ok(())
    }

    /// Stored settings, or defaults when the (user, team) has none. Unknown
    /// labels fall back to the default captain position and strategy.
    pub fn escalacao_settings(&self, user_id: i64, team_id: i64) -> Result<EscalacaoSettings> {
        let row: Option<(String, String, i64, bool)> = self
            .conn()
            .query_row(
                "SELECT formation, captain_position, strategy, goalkeeper_hack
                 FROM escalacao_settings WHERE user_id = ?1 AND team_id = ?2",
                params![user_id, team_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()
            .context("failed to load escalacao settings")?;

        let defaults = EscalacaoSettings::default();
        let Some((formation, captain, strategy, goalkeeper_hack)) = row else {
            return Ok(defaults);
        };
        Ok(EscalacaoSettings {
            captain_position: Position::from_str_pos(&captain)
                .filter(|p| p.can_captain())
                .unwrap_or(defaults.captain_position),
            strategy: Strategy::from_id(strategy).unwrap_or(defaults.strategy),
            goalkeeper_hack,
            formation,
        })
    }

    // -----------------------------------------------------------------------
    // Teams
    // -----------------------------------------------------------------------

    pub fn upsert_team(&self, team: &Team) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO teams (team_id, user_id, name, access_token, refresh_token, id_token)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(team_id) DO UPDATE SET
                    user_id = excluded.user_id,
                    name = excluded.name,
                    access_token = excluded.access_token,
                    refresh_token = excluded.refresh_token,
                    id_token = excluded.id_token,
                    updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![
                    team.team_id,
                    team.user_id,
                    team.name,
                    team.access_token,
                    team.refresh_token,
                    team.id_token,
                ],
            )
            .context("failed to upsert team")?;
        Ok(())
    }

    pub fn team(&self, team_id: i64) -> Result<Option<Team>> {
        self.conn()
            .query_row(
                "SELECT team_id, user_id, name, access_token, refresh_token, id_token
                 FROM teams WHERE team_id = ?1",
                params![team_id],
                row_to_team,
            )
            .optional()
            .context("failed to load team")
    }

    /// All stored teams, ordered by id.
    pub fn teams(&self) -> Result<Vec<Team>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT team_id, user_id, name, access_token, refresh_token, id_token
                 FROM teams ORDER BY team_id",
            )
            .context("failed to prepare teams query")?;
        let teams = stmt
            .query_map([], row_to_team)
            .context("failed to query teams")?
            .collect::<Result<Vec<_>, _>>()
            .context("failed to read team row")?;
        Ok(teams)
    }

    /// Replace a team's tokens in a single statement so concurrent readers
    /// never observe a half-updated set. A `None` refresh/id token keeps the
    /// stored one.
    pub fn update_team_tokens(
        &self,
        team_id: i64,
        access_token: &str,
        refresh_token: Option<&str>,
        id_token: Option<&str>,
    ) -> Result<()> {
        let updated = self
            .conn()
            .execute(
                "UPDATE teams SET
                    access_token = ?2,
                    refresh_token = COALESCE(?3, refresh_token),
                    id_token = COALESCE(?4, id_token),
                    updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE team_id = ?1",
                params![team_id, access_token, refresh_token, id_token],
            )
            .context("failed to update team tokens")?;
        if updated == 0 {
            anyhow::bail!("team {team_id} not found while updating tokens");
        }
        Ok(())
    }

    /// Delete a team together with its rankings, weights and settings.
    pub fn delete_team(&self, user_id: i64, team_id: i64) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin team deletion")?;
        for table in [
            "rankings",
            "position_weights",
            "weight_configurations",
            "escalacao_settings",
        ] {
            tx.execute(
                &format!("DELETE FROM {table} WHERE user_id = ?1 AND team_id = ?2"),
                params![user_id, team_id],
            )
            .with_context(|| format!("failed to delete {table} of team {team_id}"))?;
        }
        let deleted = tx
            .execute(
                "DELETE FROM teams WHERE team_id = ?1 AND user_id = ?2",
                params![team_id, user_id],
            )
            .context("failed to delete team")?;
        tx.commit().context("failed to commit team deletion")?;
        Ok(deleted > 0)
    }
}

fn row_to_team(row: &rusqlite::Row<'_>) -> rusqlite::Result<Team> {
    Ok(Team {
        team_id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        access_token: row.get(3)?,
        refresh_token: row.get(4)?,
        id_token: row.get(5)?,
    })
}
