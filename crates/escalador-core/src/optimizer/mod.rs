// Lineup optimizer: 4-3-3 selection under a budget, with de-escalation,
// closed defense, the goalkeeper hack and reserves.

pub mod defense;
pub mod hack;
pub mod payload;
mod selection;
pub mod universe;

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, info};

use crate::error::{EscalacaoError, Result};
use crate::model::{EscalacaoSettings, Position, Strategy};
use selection::{fill_pool, fill_standard, Attempt, AttemptFailure, BUDGET_EPSILON};
pub use universe::{GoalkeeperEntry, Pick, SelectionUniverse};

/// What to build and how much may be spent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizeRequest {
    pub patrimonio: f64,
    pub captain_position: Position,
    pub strategy: Strategy,
    pub goalkeeper_hack: bool,
}

impl OptimizeRequest {
    pub fn from_settings(settings: &EscalacaoSettings, patrimonio: f64) -> Self {
        OptimizeRequest {
            patrimonio,
            captain_position: settings.captain_position,
            strategy: settings.strategy,
            goalkeeper_hack: settings.goalkeeper_hack,
        }
    }
}

/// A complete, validated lineup.
#[derive(Debug, Clone, PartialEq)]
pub struct Lineup {
    /// Twelve starters in slot order (GK, LAT, ZAG, MEI, ATA, TEC).
    pub starters: Vec<Pick>,
    /// One bench athlete per position that has one. The captain position's
    /// entry is the luxury reserve.
    pub reserves: BTreeMap<Position, Pick>,
    pub luxury: Option<Pick>,
    pub captain_id: i64,
    pub captain_position: Position,
    pub cost: f64,
    /// Whether a closed-defense block was locked.
    pub closed_defense: bool,
}

impl Lineup {
    pub fn starters_at(&self, position: Position) -> impl Iterator<Item = &Pick> {
        self.starters.iter().filter(move |p| p.position == position)
    }

    pub fn starter_ids(&self) -> Vec<i64> {
        self.starters.iter().map(|p| p.athlete_id).collect()
    }
}

/// Build the lineup for `request` from a loaded universe.
///
/// Each attempt pools one more position in de-escalation order (coach
/// first, forwards last) until the formation fits, ending with an attempt
/// where every position is pooled.
pub fn optimize(universe: &SelectionUniverse, request: &OptimizeRequest) -> Result<Lineup> {
    let block = match request.strategy {
        Strategy::ClosedDefense => defense::lock_block(universe, request.patrimonio),
        Strategy::Standard => None,
    };

    let mut deescalation = Position::PRIORITY;
    deescalation.reverse();

    let mut last_failure = AttemptFailure::Budget;
    for pooled_count in 0..=deescalation.len() {
        let pooled = &deescalation[..pooled_count];
        match attempt(universe, request, block.as_ref(), pooled) {
            Ok(attempt) => {
                if pooled_count > 0 {
                    info!("lineup fits after pooling {:?}", pooled);
                }
                return finish(universe, request, attempt, block.is_some());
            }
            Err(failure) => {
                debug!("attempt with {} pooled positions failed: {:?}", pooled_count, failure);
                last_failure = failure;
            }
        }
    }

    Err(match last_failure {
        AttemptFailure::Short { position, needed, found } => {
            EscalacaoError::InsufficientCandidates { position, needed, found }
        }
        AttemptFailure::Budget => EscalacaoError::BudgetInfeasible {
            patrimonio: request.patrimonio,
        },
    })
}

fn attempt(
    universe: &SelectionUniverse,
    request: &OptimizeRequest,
    block: Option<&defense::DefenseBlock>,
    pooled: &[Position],
) -> std::result::Result<Attempt, AttemptFailure> {
    let mut state = Attempt::default();
    if let Some(block) = block {
        for pick in &block.picks {
            state.add_starter(pick.clone());
        }
    }

    for position in Position::PRIORITY {
        // Pooled positions are left to the pool unless locked defenders
        // already occupy part of them.
        if pooled.contains(&position) && state.count(position) == 0 {
            continue;
        }
        fill_standard(universe, &mut state, position, request.captain_position, request.patrimonio)?;
    }

    fill_pool(universe, &mut state, pooled, request.captain_position, request.patrimonio)?;
    Ok(state)
}

/// Goalkeeper pass, reserves, captain and validation.
fn finish(
    universe: &SelectionUniverse,
    request: &OptimizeRequest,
    mut state: Attempt,
    closed_defense: bool,
) -> Result<Lineup> {
    let captain_position = request.captain_position;
    let mut reserves: BTreeMap<Position, Pick> = BTreeMap::new();

    if captain_position != Position::Goleiro {
        if let Some(current) = state.starters.get(&Position::Goleiro).and_then(|gks| gks.first()).cloned() {
            let mut used = state.used.clone();
            used.remove(&current.athlete_id);
            let choice = if request.goalkeeper_hack {
                hack::apply(universe, &current, state.cost, request.patrimonio, &used)
            } else {
                hack::GoalkeeperChoice {
                    reserve: hack::cheaper_reserve(universe, &current, &used),
                    starter: current.clone(),
                }
            };
            if choice.starter.athlete_id != current.athlete_id {
                state.cost += choice.starter.price - current.price;
                state.used.remove(&current.athlete_id);
                state.used.insert(choice.starter.athlete_id);
                state.starters.insert(Position::Goleiro, vec![choice.starter]);
            }
            if let Some(reserve) = choice.reserve {
                reserves.insert(Position::Goleiro, reserve);
            }
        }
    }

    for position in [Position::Lateral, Position::Zagueiro, Position::Meia, Position::Atacante] {
        if position == captain_position {
            continue;
        }
        if let Some(reserve) = common_reserve(universe, &state, position) {
            reserves.insert(position, reserve);
        }
    }

    if state.luxury.is_none() && state.captain_pooled && captain_position.can_captain() {
        state.luxury = common_reserve(universe, &state, captain_position);
    }
    if let Some(luxury) = &state.luxury {
        reserves.insert(captain_position, luxury.clone());
    }

    let mut starters: Vec<Pick> = Vec::with_capacity(12);
    for position in Position::ALL {
        if let Some(picks) = state.starters.get(&position) {
            starters.extend(picks.iter().cloned());
        }
    }

    let (captain_id, captain_position) = pick_captain(&starters, captain_position)
        .ok_or_else(|| EscalacaoError::InvalidLineup("no starter can be captain".into()))?;

    let lineup = Lineup {
        cost: starters.iter().map(|p| p.price).sum(),
        starters,
        reserves,
        luxury: state.luxury,
        captain_id,
        captain_position,
        closed_defense,
    };
    validate(&lineup, request.patrimonio)?;
    info!(
        "lineup built: cost {:.2} of {:.2}, captain {}",
        lineup.cost, request.patrimonio, lineup.captain_id
    );
    Ok(lineup)
}

/// Highest-ranked unused candidate with a positive score, priced no higher
/// than the cheapest starter of the position.
fn common_reserve(universe: &SelectionUniverse, state: &Attempt, position: Position) -> Option<Pick> {
    let min_starter_price = state
        .starters
        .get(&position)?
        .iter()
        .map(|p| p.price)
        .fold(f64::INFINITY, f64::min);
    universe
        .ranked(position)
        .iter()
        .find(|c| !state.used.contains(&c.athlete_id) && c.score > 0.0 && c.price <= min_starter_price)
        .cloned()
}

/// Best scorer among the captain-position starters, else the best overall.
/// Returns the captain with the position it actually plays.
fn pick_captain(starters: &[Pick], captain_position: Position) -> Option<(i64, Position)> {
    best_scorer(starters.iter().filter(|p| p.position == captain_position))
        .or_else(|| best_scorer(starters.iter().filter(|p| p.position.can_captain())))
        .map(|p| (p.athlete_id, p.position))
}

/// First athlete with the highest score.
fn best_scorer<'a>(picks: impl Iterator<Item = &'a Pick>) -> Option<&'a Pick> {
    picks.fold(None::<&Pick>, |best, p| match best {
        Some(b) if b.score >= p.score => Some(b),
        _ => Some(p),
    })
}

fn validate(lineup: &Lineup, patrimonio: f64) -> Result<()> {
    for position in Position::ALL {
        let found = lineup.starters_at(position).count();
        if found != position.formation_count() {
            return Err(EscalacaoError::InsufficientCandidates {
                position,
                needed: position.formation_count(),
                found,
            });
        }
    }
    if lineup.cost > patrimonio + BUDGET_EPSILON {
        return Err(EscalacaoError::BudgetInfeasible { patrimonio });
    }
    let distinct: HashSet<i64> = lineup.starters.iter().map(|p| p.athlete_id).collect();
    if distinct.len() != lineup.starters.len() {
        return Err(EscalacaoError::InvalidLineup("duplicate athlete among starters".into()));
    }
    if !distinct.contains(&lineup.captain_id) {
        return Err(EscalacaoError::InvalidLineup(format!(
            "captain {} is not a starter",
            lineup.captain_id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pick(id: i64, position: Position, price: f64, score: f64) -> Pick {
        Pick {
            athlete_id: id,
            nickname: format!("P{id}"),
            position,
            club_id: id % 7,
            price,
            score,
        }
    }

    /// `per_position` candidates for every position, ids grouped by position
    /// (position id * 100 + rank), best first.
    fn flat_universe(per_position: usize, price: f64) -> SelectionUniverse {
        let mut ranked = BTreeMap::new();
        for position in Position::ALL {
            let picks = (0..per_position)
                .map(|i| {
                    pick(
                        position.id() * 100 + i as i64,
                        position,
                        price,
                        (per_position - i) as f64,
                    )
                })
                .collect();
            ranked.insert(position, picks);
        }
        SelectionUniverse::new(ranked, Vec::new(), Vec::new(), Vec::new())
    }

    fn standard(patrimonio: f64) -> OptimizeRequest {
        OptimizeRequest {
            patrimonio,
            captain_position: Position::Atacante,
            strategy: Strategy::Standard,
            goalkeeper_hack: false,
        }
    }

    #[test]
    fn exact_formation_within_budget() {
        let u = flat_universe(4, 5.0);
        let lineup = optimize(&u, &standard(100.0)).unwrap();
        assert_eq!(lineup.starters.len(), 12);
        assert!((lineup.cost - 60.0).abs() < 1e-9);
        let order: Vec<Position> = lineup.starters.iter().map(|p| p.position).collect();
        assert_eq!(order[0], Position::Goleiro);
        assert_eq!(order[11], Position::Tecnico);
        assert_eq!(lineup.captain_position, Position::Atacante);
        assert!(lineup.starters_at(Position::Atacante).any(|p| p.athlete_id == lineup.captain_id));
    }

    #[test]
    fn optimize_is_deterministic() {
        let u = flat_universe(6, 4.0);
        let a = optimize(&u, &standard(80.0)).unwrap();
        let b = optimize(&u, &standard(80.0)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn captain_is_best_forward() {
        let u = flat_universe(5, 3.0);
        let lineup = optimize(&u, &standard(200.0)).unwrap();
        assert_eq!(lineup.captain_id, 500);
    }

    #[test]
    fn too_few_athletes_is_insufficient_candidates() {
        let mut ranked = BTreeMap::new();
        for position in Position::ALL {
            let n = if position == Position::Meia { 2 } else { 5 };
            ranked.insert(
                position,
                (0..n).map(|i| pick(position.id() * 100 + i, position, 1.0, 1.0)).collect(),
            );
        }
        let u = SelectionUniverse::new(ranked, Vec::new(), Vec::new(), Vec::new());
        let err = optimize(&u, &standard(100.0)).unwrap_err();
        assert!(matches!(
            err,
            EscalacaoError::InsufficientCandidates { position: Position::Meia, needed: 3, found: 2 }
        ));
    }

    #[test]
    fn impossible_budget_is_budget_infeasible() {
        let u = flat_universe(6, 10.0);
        let err = optimize(&u, &standard(50.0)).unwrap_err();
        assert!(matches!(err, EscalacaoError::BudgetInfeasible { .. }));
    }

    #[test]
    fn reserves_are_cheaper_unused_and_positive() {
        let u = flat_universe(5, 5.0);
        let lineup = optimize(&u, &standard(200.0)).unwrap();
        let starters: HashSet<i64> = lineup.starter_ids().into_iter().collect();
        for (position, reserve) in &lineup.reserves {
            assert!(!starters.contains(&reserve.athlete_id), "{position} reserve is a starter");
            assert!(reserve.score > 0.0);
        }
        assert!(!lineup.reserves.contains_key(&Position::Tecnico));
        // luxury sits under the captain position
        assert_eq!(
            lineup.reserves.get(&Position::Atacante).map(|p| p.athlete_id),
            lineup.luxury.as_ref().map(|p| p.athlete_id)
        );
    }

    #[test]
    fn over_budget_athletes_never_start() {
        let mut ranked = BTreeMap::new();
        for position in Position::ALL {
            let mut picks = vec![pick(position.id() * 100, position, 500.0, 99.0)];
            picks.extend((1..6).map(|i| pick(position.id() * 100 + i, position, 2.0, 1.0)));
            ranked.insert(position, picks);
        }
        let u = SelectionUniverse::new(ranked, Vec::new(), Vec::new(), Vec::new());
        let lineup = optimize(&u, &standard(100.0)).unwrap();
        assert!(lineup.starters.iter().all(|p| p.price < 500.0));
    }

    fn built(starters: Vec<Pick>, captain_id: i64) -> Lineup {
        Lineup {
            cost: starters.iter().map(|p| p.price).sum(),
            starters,
            reserves: BTreeMap::new(),
            luxury: None,
            captain_id,
            captain_position: Position::Atacante,
            closed_defense: false,
        }
    }

    fn full_formation() -> Vec<Pick> {
        Position::ALL
            .iter()
            .flat_map(|&position| {
                (0..position.formation_count()).map(move |i| pick(position.id() * 100 + i as i64, position, 2.0, 1.0))
            })
            .collect()
    }

    #[test]
    fn duplicate_starter_is_an_invalid_lineup() {
        let mut starters = full_formation();
        starters[2].athlete_id = starters[1].athlete_id;
        let err = validate(&built(starters, 500), 100.0).unwrap_err();
        assert!(matches!(err, EscalacaoError::InvalidLineup(_)));
    }

    #[test]
    fn captain_outside_the_lineup_is_an_invalid_lineup() {
        let err = validate(&built(full_formation(), 999), 100.0).unwrap_err();
        assert!(matches!(err, EscalacaoError::InvalidLineup(ref m) if m.contains("999")));
        assert!(validate(&built(full_formation(), 500), 100.0).is_ok());
        assert!(matches!(
            validate(&built(full_formation(), 500), 10.0).unwrap_err(),
            EscalacaoError::BudgetInfeasible { .. }
        ));
    }

    #[test]
    fn captain_fallback_reports_the_position_it_plays() {
        let starters = vec![
            pick(1, Position::Goleiro, 1.0, 2.0),
            pick(2, Position::Meia, 1.0, 7.0),
            pick(3, Position::Tecnico, 1.0, 9.0),
        ];
        assert_eq!(pick_captain(&starters, Position::Atacante), Some((2, Position::Meia)));
        assert_eq!(pick_captain(&starters, Position::Goleiro), Some((1, Position::Goleiro)));
    }
}
