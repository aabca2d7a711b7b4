// Market sync: pull athletes, clubs, fixtures, scouts and popularity from
// the Cartola API into the datastore.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::{info, warn};

use escalador_core::db::Database;
use escalador_core::error::{EscalacaoError, Result};
use escalador_core::model::{Athlete, Club, Match, PopularityRow, Position, ScoutRow};

use crate::cartola::{body_preview, CartolaClient, Transport};
use crate::submitter::Submitter;

// ---------------------------------------------------------------------------
// Upstream response shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawMarket {
    #[serde(default)]
    atletas: Vec<RawMarketAthlete>,
    #[serde(default)]
    clubes: HashMap<String, RawClub>,
}

#[derive(Debug, Deserialize)]
struct RawMarketAthlete {
    atleta_id: i64,
    #[serde(default)]
    apelido: String,
    #[serde(default)]
    nome: String,
    clube_id: i64,
    posicao_id: i64,
    status_id: i64,
    #[serde(default)]
    preco_num: f64,
    #[serde(default)]
    media_num: f64,
    #[serde(default)]
    jogos_num: i64,
}

#[derive(Debug, Deserialize)]
struct RawClub {
    id: i64,
    #[serde(default)]
    nome: String,
    #[serde(default)]
    abreviacao: String,
}

#[derive(Debug, Deserialize)]
struct RawFixtures {
    #[serde(default)]
    partidas: Vec<RawFixture>,
}

#[derive(Debug, Deserialize)]
struct RawFixture {
    clube_casa_id: i64,
    clube_visitante_id: i64,
    #[serde(default)]
    valida: bool,
    #[serde(default)]
    placar_oficial_mandante: Option<i64>,
    #[serde(default)]
    placar_oficial_visitante: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawScored {
    #[serde(default)]
    atletas: Option<HashMap<String, RawScoredAthlete>>,
}

#[derive(Debug, Deserialize)]
struct RawScoredAthlete {
    // Sent as null for athletes who recorded nothing.
    #[serde(default)]
    scout: Option<HashMap<String, u32>>,
    posicao_id: i64,
    clube_id: i64,
    #[serde(default)]
    entrou_em_campo: bool,
}

#[derive(Debug, Deserialize)]
struct RawHighlight {
    #[serde(rename = "Atleta")]
    atleta: RawHighlightAthlete,
    escalacoes: i64,
}

#[derive(Debug, Deserialize)]
struct RawHighlightAthlete {
    atleta_id: i64,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

fn market_rows(raw: RawMarket) -> (Vec<Club>, Vec<Athlete>) {
    let mut clubs: Vec<Club> = raw
        .clubes
        .into_values()
        .map(|c| Club {
            id: c.id,
            name: c.nome,
            abbreviation: c.abreviacao,
        })
        .collect();
    clubs.sort_by_key(|c| c.id);

    let athletes = raw
        .atletas
        .into_iter()
        .filter(|a| {
            let known = Position::from_id(a.posicao_id).is_some();
            if !known {
                warn!("skipping athlete {} with position {}", a.atleta_id, a.posicao_id);
            }
            known
        })
        .map(|a| Athlete {
            athlete_id: a.atleta_id,
            nickname: a.apelido,
            full_name: a.nome,
            club_id: a.clube_id,
            position_id: a.posicao_id,
            price: a.preco_num,
            season_avg: a.media_num,
            games: a.jogos_num,
            status_id: a.status_id,
        })
        .collect();
    (clubs, athletes)
}

fn fixture_rows(raw: RawFixtures, round: u32) -> Vec<Match> {
    raw.partidas
        .into_iter()
        .map(|p| Match {
            round_id: round,
            home_club_id: p.clube_casa_id,
            away_club_id: p.clube_visitante_id,
            valid: p.valida,
            home_score: p.placar_oficial_mandante,
            away_score: p.placar_oficial_visitante,
        })
        .collect()
}

fn scout_rows(raw: RawScored, round: u32) -> Vec<ScoutRow> {
    let mut rows: Vec<ScoutRow> = raw
        .atletas
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(id, a)| {
            let athlete_id = match id.parse::<i64>() {
                Ok(id) => id,
                Err(_) => {
                    warn!("skipping scored athlete with id {id:?}");
                    return None;
                }
            };
            let scout = a.scout.unwrap_or_default();
            let count = |code: &str| scout.get(code).copied().unwrap_or(0);
            Some(ScoutRow {
                athlete_id,
                round_id: round,
                position_id: a.posicao_id,
                club_id: a.clube_id,
                entered: a.entrou_em_campo,
                ds: count("DS"),
                ff: count("FF"),
                fs: count("FS"),
                fd: count("FD"),
                g: count("G"),
                a: count("A"),
            })
        })
        .collect();
    rows.sort_by_key(|r| r.athlete_id);
    rows
}

fn popularity_rows(raw: Vec<RawHighlight>, round: u32) -> Vec<PopularityRow> {
    raw.into_iter()
        .map(|h| PopularityRow {
            athlete_id: h.atleta.atleta_id,
            round_id: round,
            escalacoes: h.escalacoes,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Sync operations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub clubs: usize,
    pub athletes: usize,
    pub matches: usize,
    pub scouts: usize,
    pub popularity: usize,
}

/// Athletes and clubs of the open market.
pub async fn sync_market<T: Transport>(db: &Database, client: &CartolaClient<T>) -> Result<(usize, usize)> {
    let raw: RawMarket = client.get_public("/atletas/mercado").await?;
    let (clubs, athletes) = market_rows(raw);
    let clubs = db.upsert_clubs(&clubs)?;
    let athletes = db.upsert_athletes(&athletes)?;
    info!("market sync: {clubs} clubs, {athletes} athletes");
    Ok((clubs, athletes))
}

pub async fn sync_matches<T: Transport>(db: &Database, client: &CartolaClient<T>, round: u32) -> Result<usize> {
    let raw: RawFixtures = client.get_public(&format!("/partidas/{round}")).await?;
    let stored = db.upsert_matches(&fixture_rows(raw, round))?;
    info!("fixture sync: {stored} matches for round {round}");
    Ok(stored)
}

/// Scouts of a finished (or running) round.
pub async fn sync_scouts<T: Transport>(db: &Database, client: &CartolaClient<T>, round: u32) -> Result<usize> {
    let raw: RawScored = client.get_public(&format!("/atletas/pontuados/{round}")).await?;
    let stored = db.upsert_scouts(&scout_rows(raw, round))?;
    info!("scout sync: {stored} rows for round {round}");
    Ok(stored)
}

/// Most-picked athletes of the round. The endpoint needs a logged-in team.
pub async fn sync_popularity<T: Transport>(
    db: &Database,
    client: &CartolaClient<T>,
    team_id: i64,
    round: u32,
) -> Result<usize> {
    let submitter = Submitter::new(db, client);
    let response = submitter
        .authorized(team_id, |token| Ok(client.authed_get("/auth/mercado/destaques", token)))
        .await?;
    if !response.is_success() {
        return Err(EscalacaoError::UpstreamRejected {
            status: response.status,
            message: body_preview(&response.body),
        });
    }
    let raw: Vec<RawHighlight> = response.json()?;
    let stored = db.replace_popularity(&popularity_rows(raw, round))?;
    info!("popularity sync: {stored} athletes for round {round}");
    Ok(stored)
}

/// Full refresh for `round`: market, its fixtures, the previous round's
/// scouts and, when a team is given, the popularity table.
pub async fn sync_round<T: Transport>(
    db: &Database,
    client: &CartolaClient<T>,
    round: u32,
    popularity_team: Option<i64>,
) -> Result<SyncSummary> {
    let (clubs, athletes) = sync_market(db, client).await?;
    let matches = sync_matches(db, client, round).await?;
    let scouts = if round > 1 {
        sync_scouts(db, client, round - 1).await?
    } else {
        0
    };
    let popularity = match popularity_team {
        Some(team_id) => sync_popularity(db, client, team_id, round).await?,
        None => 0,
    };
    Ok(SyncSummary {
        clubs,
        athletes,
        matches,
        scouts,
        popularity,
    })
}
