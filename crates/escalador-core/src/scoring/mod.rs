// Position scorers: per-candidate inputs, position formulas, ranking.

pub mod center_back;
pub mod coach;
pub mod forward;
pub mod goalkeeper;
pub mod midfielder;
pub mod side_back;

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info};

use crate::config::ScoringConfig;
use crate::db::Database;
use crate::error::Result;
use crate::model::{CandidateScore, Position, WeightConfiguration};
use crate::ranking::{RankingKey, RankingStore};
use crate::repository::{
    min_jogos, AthleteRepository, CandidateAthlete, Liveness, Opponent, ScoutAverages, POPULARITY_TOP,
};
use crate::weights::{PositionWeights, WeightStore};

// ---------------------------------------------------------------------------
// Request and per-candidate inputs
// ---------------------------------------------------------------------------

/// Parameters of one scoring run for a (user, team).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringRequest {
    pub user_id: i64,
    pub team_id: i64,
    pub round: u32,
    pub top_n: usize,
    pub min_jogos_pref: i64,
    pub rodada_min_jogos: u32,
    pub liveness: Liveness,
}

impl ScoringRequest {
    pub fn new(user_id: i64, team_id: i64, round: u32, scoring: &ScoringConfig) -> Self {
        ScoringRequest {
            user_id,
            team_id,
            round,
            top_n: scoring.top_n,
            min_jogos_pref: scoring.min_jogos_pref,
            rodada_min_jogos: scoring.rodada_min_jogos,
            liveness: Liveness::from_flag(scoring.usar_provaveis_cartola),
        }
    }

    /// Games threshold for `position`. Coaches only need one.
    pub fn min_jogos_for(&self, position: Position) -> i64 {
        if position == Position::Tecnico {
            1
        } else {
            min_jogos(self.round, self.min_jogos_pref, self.rodada_min_jogos)
        }
    }
}

/// Raw values a position formula reads for one candidate. Opponent terms
/// and `peso_jogo` are zero when the club has no valid match in the round.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CandidateInputs {
    pub media: f64,
    pub own: ScoutAverages,
    pub peso_jogo: f64,
    pub peso_sg: f64,
    pub popularity_percent: f64,
    /// Scouts the opponent concedes to this position.
    pub opponent_allowance: ScoutAverages,
    /// The opponent's own scout means (goalkeeper "shots faced").
    pub opponent_club: ScoutAverages,
    pub opponent_goals: f64,
}

/// Result of one formula application.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    pub base: f64,
    pub final_score: f64,
    pub popularity_weight: f64,
}

/// Apply the formula for `position`.
pub fn score_candidate(position: Position, inputs: &CandidateInputs, w: &PositionWeights) -> ScoreBreakdown {
    match position {
        Position::Goleiro => goalkeeper::score(inputs, w),
        Position::Lateral => side_back::score(inputs, w),
        Position::Zagueiro => center_back::score(inputs, w),
        Position::Meia => midfielder::score(inputs, w),
        Position::Atacante => forward::score(inputs, w),
        Position::Tecnico => coach::score(inputs, w),
    }
}

// ---------------------------------------------------------------------------
// Formula building blocks
// ---------------------------------------------------------------------------

/// `peso_jogo * FATOR_PESO_JOGO`.
pub(crate) fn jogo_term(inputs: &CandidateInputs, w: &PositionWeights) -> f64 {
    inputs.peso_jogo * w.peso_jogo
}

/// `1 + percent * FATOR_ESCALACAO`.
pub(crate) fn popularity_weight(inputs: &CandidateInputs, w: &PositionWeights) -> f64 {
    1.0 + inputs.popularity_percent * w.escalacao
}

/// Shared outfield base: average, game weight, the tackle interaction term
/// and the athlete's own attacking scouts.
pub(crate) fn outfield_base(inputs: &CandidateInputs, w: &PositionWeights) -> f64 {
    let own = &inputs.own;
    inputs.media * w.media
        + jogo_term(inputs, w)
        + own.ds * inputs.opponent_allowance.ds * w.ds
        + own.ff * w.ff
        + own.fs * w.fs
        + own.fd * w.fd
        + own.g * w.g
        + own.a * w.a
}

/// Clamp to a finite non-negative value.
pub(crate) fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

// ---------------------------------------------------------------------------
// Popularity
// ---------------------------------------------------------------------------

/// Share of each top-20 athlete in the round's popularity distribution.
#[derive(Debug, Clone, Default)]
pub struct Popularity {
    escalacoes: HashMap<i64, i64>,
    total: i64,
}

impl Popularity {
    pub fn new(rows: impl IntoIterator<Item = (i64, i64)>) -> Self {
        let escalacoes: HashMap<i64, i64> = rows.into_iter().collect();
        let total = escalacoes.values().sum();
        Popularity { escalacoes, total }
    }

    /// 0 when the athlete is absent or the distribution is empty.
    pub fn percent(&self, athlete_id: i64) -> f64 {
        if self.total <= 0 {
            return 0.0;
        }
        self.escalacoes
            .get(&athlete_id)
            .map(|&n| n as f64 / self.total as f64)
            .unwrap_or(0.0)
    }
}

// ---------------------------------------------------------------------------
// Ranking
// ---------------------------------------------------------------------------

/// Per-round data shared by every candidate of one position.
struct RoundData {
    game_weights: HashMap<i64, f64>,
    sg_weights: HashMap<i64, f64>,
    popularity: Popularity,
    opponents: HashMap<i64, Opponent>,
    own: HashMap<i64, ScoutAverages>,
    allowances: HashMap<i64, ScoutAverages>,
    club_averages: HashMap<i64, ScoutAverages>,
    goals: HashMap<i64, f64>,
}

fn uses_own_scouts(position: Position) -> bool {
    matches!(
        position,
        Position::Lateral | Position::Zagueiro | Position::Meia | Position::Atacante
    )
}

fn load_round_data(
    repo: &AthleteRepository<'_>,
    weights: &WeightStore<'_>,
    config: &WeightConfiguration,
    position: Position,
    round: u32,
    candidates: &[CandidateAthlete],
) -> anyhow::Result<RoundData> {
    let popularity = Popularity::new(
        repo.top_popularity(round, POPULARITY_TOP)?
            .into_iter()
            .map(|row| (row.athlete_id, row.escalacoes)),
    );
    let opponents = repo.round_opponents(round)?;

    let (own, allowances) = if uses_own_scouts(position) {
        (repo.self_scout_averages(round)?, repo.opponent_allowances(position, round)?)
    } else {
        (HashMap::new(), HashMap::new())
    };

    let mut club_averages = HashMap::new();
    let mut goals = HashMap::new();
    if position == Position::Goleiro {
        club_averages = repo.club_scout_averages(round)?;
        for c in candidates {
            if let Some(opp) = opponents.get(&c.athlete.club_id) {
                if !goals.contains_key(&opp.club_id) {
                    goals.insert(opp.club_id, repo.opponent_goals_average(opp.club_id, round)?);
                }
            }
        }
    }

    Ok(RoundData {
        game_weights: weights.club_game_weights(config.game_profile_id, round),
        sg_weights: weights.club_sg_weights(config.sg_profile_id, round),
        popularity,
        opponents,
        own,
        allowances,
        club_averages,
        goals,
    })
}

fn candidate_inputs<'a>(data: &'a RoundData, candidate: &CandidateAthlete) -> (CandidateInputs, Option<&'a Opponent>) {
    let athlete = &candidate.athlete;
    let club = athlete.club_id;
    let opponent = data.opponents.get(&club);

    let mut inputs = CandidateInputs {
        media: athlete.season_avg,
        own: data.own.get(&athlete.athlete_id).copied().unwrap_or_default(),
        peso_jogo: 0.0,
        peso_sg: data.sg_weights.get(&club).copied().unwrap_or(0.0),
        popularity_percent: data.popularity.percent(athlete.athlete_id),
        ..Default::default()
    };
    if let Some(opp) = opponent {
        inputs.peso_jogo = data.game_weights.get(&club).copied().unwrap_or(0.0);
        inputs.opponent_allowance = data.allowances.get(&opp.club_id).copied().unwrap_or_default();
        inputs.opponent_club = data.club_averages.get(&opp.club_id).copied().unwrap_or_default();
        inputs.opponent_goals = data.goals.get(&opp.club_id).copied().unwrap_or(0.0);
    }
    (inputs, opponent)
}

/// Named inputs kept alongside each ranked candidate.
fn describe_inputs(position: Position, inputs: &CandidateInputs, breakdown: &ScoreBreakdown) -> BTreeMap<String, f64> {
    let mut map = BTreeMap::new();
    map.insert("media".to_string(), inputs.media);
    map.insert("peso_jogo".to_string(), inputs.peso_jogo);
    map.insert("peso_sg".to_string(), inputs.peso_sg);
    map.insert("base".to_string(), breakdown.base);
    match position {
        Position::Goleiro => {
            map.insert("adv_ff".to_string(), inputs.opponent_club.ff);
            map.insert("adv_fd".to_string(), inputs.opponent_club.fd);
            map.insert("adv_gols".to_string(), inputs.opponent_goals);
        }
        Position::Tecnico => {}
        _ => {
            map.insert("percent_escalacao".to_string(), inputs.popularity_percent);
            map.insert("ds".to_string(), inputs.own.ds);
            map.insert("adv_ds".to_string(), inputs.opponent_allowance.ds);
            if position != Position::Zagueiro {
                map.insert("ff".to_string(), inputs.own.ff);
                map.insert("fs".to_string(), inputs.own.fs);
                map.insert("fd".to_string(), inputs.own.fd);
                map.insert("g".to_string(), inputs.own.g);
                map.insert("a".to_string(), inputs.own.a);
            }
        }
    }
    map
}

/// Weight configuration in force for a (user, team).
pub fn weight_configuration(db: &Database, user_id: i64, team_id: i64) -> Result<WeightConfiguration> {
    Ok(db
        .weight_configuration(user_id, team_id)?
        .unwrap_or_else(WeightConfiguration::fallback))
}

/// Score every candidate of `position`, keep the top N and persist them.
///
/// Equal scores keep fetch order (season average desc, price asc, id asc).
pub fn rank_position(db: &Database, request: &ScoringRequest, position: Position) -> Result<Vec<CandidateScore>> {
    let repo = AthleteRepository::new(db);
    let weight_store = WeightStore::new(db);
    let config = weight_configuration(db, request.user_id, request.team_id)?;
    let weights = weight_store.coefficients(request.user_id, request.team_id, position);

    let candidates = repo.candidates(
        position,
        request.round,
        request.min_jogos_for(position),
        request.liveness,
    )?;
    let data = load_round_data(&repo, &weight_store, &config, position, request.round, &candidates)?;

    let mut ranked: Vec<CandidateScore> = candidates
        .iter()
        .map(|candidate| {
            let (inputs, opponent) = candidate_inputs(&data, candidate);
            let breakdown = score_candidate(position, &inputs, &weights);
            debug!(
                "{} {} ({}): base={:.3} final={:.3} pop={:.3}",
                position,
                candidate.athlete.nickname,
                candidate.athlete.athlete_id,
                breakdown.base,
                breakdown.final_score,
                breakdown.popularity_weight
            );
            CandidateScore {
                athlete_id: candidate.athlete.athlete_id,
                nickname: candidate.athlete.nickname.clone(),
                position_id: position.id(),
                club_id: candidate.athlete.club_id,
                club_name: candidate.club_name.clone(),
                opponent_name: opponent.map(|o| o.name.clone()),
                final_score: breakdown.final_score,
                popularity_weight: breakdown.popularity_weight,
                inputs: describe_inputs(position, &inputs, &breakdown),
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.final_score
            .partial_cmp(&a.final_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked.truncate(request.top_n);

    let key = RankingKey {
        user_id: request.user_id,
        team_id: request.team_id,
        config_id: config.id,
        position,
        round: request.round,
    };
    RankingStore::new(db).write_ranking(&key, &ranked)?;

    info!(
        "ranked {} {} of {} candidates for round {}",
        ranked.len(),
        position,
        candidates.len(),
        request.round
    );
    Ok(ranked)
}

/// Rank all six positions in canonical order.
pub fn rank_all(db: &Database, request: &ScoringRequest) -> Result<BTreeMap<Position, Vec<CandidateScore>>> {
    let mut rankings = BTreeMap::new();
    for position in Position::ALL {
        rankings.insert(position, rank_position(db, request, position)?);
    }
    Ok(rankings)
}
