// CSV seeding of market data and club weight profiles.
//
// A seed directory may hold any of: clubs.csv, athletes.csv, matches.csv,
// scouts.csv, provaveis.csv, popularity.csv, club_game_weights.csv and
// club_sg_weights.csv. Missing files are skipped; malformed rows are logged
// and skipped.

use std::io::Read;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::db::Database;
use crate::model::{Athlete, Club, Match, PopularityRow, Position, ProvavelMark, ScoutRow};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse CSV {path}: {source}")]
    Csv { path: String, source: csv::Error },

    #[error("failed to store {what}: {reason:#}")]
    Storage {
        what: &'static str,
        reason: anyhow::Error,
    },
}

/// Rows written per file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub clubs: usize,
    pub athletes: usize,
    pub matches: usize,
    pub scouts: usize,
    pub provaveis: usize,
    pub popularity: usize,
    pub game_weights: usize,
    pub sg_weights: usize,
}

impl ImportSummary {
    pub fn total(&self) -> usize {
        self.clubs
            + self.athletes
            + self.matches
            + self.scouts
            + self.provaveis
            + self.popularity
            + self.game_weights
            + self.sg_weights
    }
}

// ---------------------------------------------------------------------------
// Raw CSV rows
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawClub {
    id: i64,
    name: String,
    #[serde(default)]
    abbreviation: String,
}

#[derive(Debug, Deserialize)]
struct RawAthlete {
    athlete_id: i64,
    nickname: String,
    #[serde(default)]
    full_name: String,
    club_id: i64,
    position_id: i64,
    price: f64,
    season_avg: f64,
    games: i64,
    status_id: i64,
}

#[derive(Debug, Deserialize)]
struct RawMatch {
    round_id: u32,
    home_club_id: i64,
    away_club_id: i64,
    valid: u8,
    home_score: Option<i64>,
    away_score: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawScout {
    athlete_id: i64,
    round_id: u32,
    position_id: i64,
    club_id: i64,
    entered: u8,
    #[serde(default)]
    ds: u32,
    #[serde(default)]
    ff: u32,
    #[serde(default)]
    fs: u32,
    #[serde(default)]
    fd: u32,
    #[serde(default)]
    g: u32,
    #[serde(default)]
    a: u32,
}

#[derive(Debug, Deserialize)]
struct RawProvavel {
    athlete_id: i64,
    round_id: u32,
    status: String,
}

#[derive(Debug, Deserialize)]
struct RawPopularity {
    athlete_id: i64,
    round_id: u32,
    escalacoes: i64,
}

#[derive(Debug, Deserialize)]
struct RawClubWeight {
    profile_id: i64,
    club_id: i64,
    round_id: u32,
    weight: f64,
}

// ---------------------------------------------------------------------------
// Reader-based parsing
// ---------------------------------------------------------------------------

fn read_rows<T: DeserializeOwned, R: Read>(rdr: R, kind: &str) -> Result<Vec<T>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(rdr);
    let mut rows = Vec::new();
    for result in reader.deserialize::<T>() {
        match result {
            Ok(row) => rows.push(row),
            Err(e) => warn!("skipping malformed {kind} row: {e}"),
        }
    }
    Ok(rows)
}

fn parse_clubs<R: Read>(rdr: R) -> Result<Vec<Club>, csv::Error> {
    Ok(read_rows::<RawClub, _>(rdr, "club")?
        .into_iter()
        .map(|raw| Club {
            id: raw.id,
            name: raw.name,
            abbreviation: raw.abbreviation,
        })
        .collect())
}

fn parse_athletes<R: Read>(rdr: R) -> Result<Vec<Athlete>, csv::Error> {
    let mut athletes = Vec::new();
    for raw in read_rows::<RawAthlete, _>(rdr, "athlete")? {
        if !raw.price.is_finite() || !raw.season_avg.is_finite() {
            warn!("skipping athlete {}: non-finite price or average", raw.athlete_id);
            continue;
        }
        if Position::from_id(raw.position_id).is_none() {
            warn!("skipping athlete {}: unknown position {}", raw.athlete_id, raw.position_id);
            continue;
        }
        athletes.push(Athlete {
            athlete_id: raw.athlete_id,
            nickname: raw.nickname,
            full_name: raw.full_name,
            club_id: raw.club_id,
            position_id: raw.position_id,
            price: raw.price,
            season_avg: raw.season_avg,
            games: raw.games,
            status_id: raw.status_id,
        });
    }
    Ok(athletes)
}

fn parse_matches<R: Read>(rdr: R) -> Result<Vec<Match>, csv::Error> {
    Ok(read_rows::<RawMatch, _>(rdr, "match")?
        .into_iter()
        .map(|raw| Match {
            round_id: raw.round_id,
            home_club_id: raw.home_club_id,
            away_club_id: raw.away_club_id,
            valid: raw.valid != 0,
            home_score: raw.home_score,
            away_score: raw.away_score,
        })
        .collect())
}

fn parse_scouts<R: Read>(rdr: R) -> Result<Vec<ScoutRow>, csv::Error> {
    Ok(read_rows::<RawScout, _>(rdr, "scout")?
        .into_iter()
        .map(|raw| ScoutRow {
            athlete_id: raw.athlete_id,
            round_id: raw.round_id,
            position_id: raw.position_id,
            club_id: raw.club_id,
            entered: raw.entered != 0,
            ds: raw.ds,
            ff: raw.ff,
            fs: raw.fs,
            fd: raw.fd,
            g: raw.g,
            a: raw.a,
        })
        .collect())
}

fn parse_provaveis<R: Read>(rdr: R) -> Result<Vec<ProvavelMark>, csv::Error> {
    Ok(read_rows::<RawProvavel, _>(rdr, "provavel")?
        .into_iter()
        .map(|raw| ProvavelMark {
            athlete_id: raw.athlete_id,
            round_id: raw.round_id,
            status: raw.status.to_lowercase(),
        })
        .collect())
}

fn parse_popularity<R: Read>(rdr: R) -> Result<Vec<PopularityRow>, csv::Error> {
    Ok(read_rows::<RawPopularity, _>(rdr, "popularity")?
        .into_iter()
        .map(|raw| PopularityRow {
            athlete_id: raw.athlete_id,
            round_id: raw.round_id,
            escalacoes: raw.escalacoes,
        })
        .collect())
}

fn parse_club_weights<R: Read>(rdr: R) -> Result<Vec<RawClubWeight>, csv::Error> {
    let rows = read_rows::<RawClubWeight, _>(rdr, "club weight")?;
    Ok(rows
        .into_iter()
        .filter(|raw| {
            let ok = raw.weight.is_finite();
            if !ok {
                warn!("skipping club {} weight: non-finite value", raw.club_id);
            }
            ok
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Directory import
// ---------------------------------------------------------------------------

/// Open `dir/name` and parse it, or `None` when the file does not exist.
fn parse_file<T>(
    dir: &Path,
    name: &str,
    parse: impl FnOnce(std::fs::File) -> Result<Vec<T>, csv::Error>,
) -> Result<Option<Vec<T>>, ImportError> {
    let path = dir.join(name);
    if !path.exists() {
        debug!("no {} in seed directory", name);
        return Ok(None);
    }
    let file = std::fs::File::open(&path).map_err(|e| ImportError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    parse(file).map(Some).map_err(|e| ImportError::Csv {
        path: path.display().to_string(),
        source: e,
    })
}

fn storage(what: &'static str) -> impl FnOnce(anyhow::Error) -> ImportError {
    move |reason| ImportError::Storage { what, reason }
}

/// Load every seed file present in `dir` into the database.
pub fn import_dir(db: &Database, dir: &Path) -> Result<ImportSummary, ImportError> {
    let mut summary = ImportSummary::default();

    if let Some(clubs) = parse_file(dir, "clubs.csv", parse_clubs)? {
        summary.clubs = db.upsert_clubs(&clubs).map_err(storage("clubs"))?;
    }
    if let Some(athletes) = parse_file(dir, "athletes.csv", parse_athletes)? {
        summary.athletes = db.upsert_athletes(&athletes).map_err(storage("athletes"))?;
    }
    if let Some(matches) = parse_file(dir, "matches.csv", parse_matches)? {
        summary.matches = db.upsert_matches(&matches).map_err(storage("matches"))?;
    }
    if let Some(scouts) = parse_file(dir, "scouts.csv", parse_scouts)? {
        summary.scouts = db.upsert_scouts(&scouts).map_err(storage("scouts"))?;
    }
    if let Some(marks) = parse_file(dir, "provaveis.csv", parse_provaveis)? {
        summary.provaveis = db.upsert_provaveis(&marks).map_err(storage("provável marks"))?;
    }
    if let Some(rows) = parse_file(dir, "popularity.csv", parse_popularity)? {
        summary.popularity = db.replace_popularity(&rows).map_err(storage("popularity"))?;
    }
    if let Some(rows) = parse_file(dir, "club_game_weights.csv", parse_club_weights)? {
        for row in &rows {
            db.set_club_game_weight(row.profile_id, row.club_id, row.round_id, row.weight)
                .map_err(storage("club game weights"))?;
        }
        summary.game_weights = rows.len();
    }
    if let Some(rows) = parse_file(dir, "club_sg_weights.csv", parse_club_weights)? {
        for row in &rows {
            db.set_club_sg_weight(row.profile_id, row.club_id, row.round_id, row.weight)
                .map_err(storage("club SG weights"))?;
        }
        summary.sg_weights = rows.len();
    }

    info!("imported {} rows from {}", summary.total(), dir.display());
    Ok(summary)
}
