// Integration tests for the ranking and lineup pipeline.
//
// They seed an in-memory datastore, rank every position, load the selection
// universe back from the stored rankings and optimize a lineup, plus the
// reference budget, de-escalation, goalkeeper-hack and closed-defense cases
// on hand-built universes.

use std::collections::{BTreeMap, HashSet};

use escalador_core::config::ScoringConfig;
use escalador_core::db::Database;
use escalador_core::error::EscalacaoError;
use escalador_core::model::{
    Athlete, Club, Match, PopularityRow, Position, ScoutRow, Strategy, WeightConfiguration,
};
use escalador_core::optimizer::{optimize, GoalkeeperEntry, OptimizeRequest, Pick, SelectionUniverse};
use escalador_core::ranking::{RankingKey, RankingStore};
use escalador_core::repository::Liveness;
use escalador_core::scoring::{rank_all, rank_position, ScoringRequest};

// ===========================================================================
// Test helpers
// ===========================================================================

const ROUND: u32 = 5;

fn scoring_request(round: u32) -> ScoringRequest {
    let scoring = ScoringConfig {
        usar_provaveis_cartola: false,
        ..ScoringConfig::default()
    };
    ScoringRequest::new(1, 1, round, &scoring)
}

fn athlete(id: i64, club: i64, position: Position, price: f64, avg: f64) -> Athlete {
    Athlete {
        athlete_id: id,
        nickname: format!("Atleta {id}"),
        full_name: String::new(),
        club_id: club,
        position_id: position.id(),
        price,
        season_avg: avg,
        games: 4,
        status_id: 7,
    }
}

fn scout(athlete: i64, round: u32, position: Position, club: i64) -> ScoutRow {
    ScoutRow {
        athlete_id: athlete,
        round_id: round,
        position_id: position.id(),
        club_id: club,
        entered: true,
        ds: 1,
        ff: 1,
        fs: 1,
        fd: 0,
        g: 0,
        a: 0,
    }
}

fn fixture(round: u32, home: i64, away: i64, score: Option<(i64, i64)>) -> Match {
    Match {
        round_id: round,
        home_club_id: home,
        away_club_id: away,
        valid: true,
        home_score: score.map(|s| s.0),
        away_score: score.map(|s| s.1),
    }
}

/// Four clubs, two fixtures per round, four athletes per club and position
/// with prices between 3 and 9.
fn seeded_db() -> Database {
    let db = Database::open(":memory:").expect("in-memory database should open");
    db.upsert_clubs(
        &(1..=4)
            .map(|id| Club {
                id,
                name: format!("Clube {id}"),
                abbreviation: format!("C{id}"),
            })
            .collect::<Vec<_>>(),
    )
    .unwrap();
    db.upsert_matches(&[
        fixture(ROUND - 1, 1, 2, Some((2, 1))),
        fixture(ROUND - 1, 3, 4, Some((0, 0))),
        fixture(ROUND, 1, 3, None),
        fixture(ROUND, 2, 4, None),
    ])
    .unwrap();

    let mut athletes = Vec::new();
    let mut scouts = Vec::new();
    let mut id = 1;
    for club in 1..=4 {
        for position in Position::ALL {
            for k in 0..4 {
                let price = 3.0 + (id % 7) as f64;
                athletes.push(athlete(id, club, position, price, 2.0 + k as f64));
                scouts.push(scout(id, ROUND - 1, position, club));
                id += 1;
            }
        }
    }
    db.upsert_athletes(&athletes).unwrap();
    db.upsert_scouts(&scouts).unwrap();
    db.replace_popularity(&[PopularityRow {
        athlete_id: 4,
        round_id: ROUND,
        escalacoes: 1000,
    }])
    .unwrap();

    for club in 1..=4 {
        db.set_club_game_weight(WeightConfiguration::DEFAULT_GAME_PROFILE, club, ROUND, club as f64 * 0.5)
            .unwrap();
        db.set_club_sg_weight(WeightConfiguration::DEFAULT_SG_PROFILE, club, ROUND, 1.0 / club as f64)
            .unwrap();
    }
    db
}

fn pick(id: i64, club: i64, position: Position, price: f64, score: f64) -> Pick {
    Pick {
        athlete_id: id,
        nickname: format!("Atleta {id}"),
        position,
        club_id: club,
        price,
        score,
    }
}

fn request(patrimonio: f64) -> OptimizeRequest {
    OptimizeRequest {
        patrimonio,
        captain_position: Position::Atacante,
        strategy: Strategy::Standard,
        goalkeeper_hack: false,
    }
}

// ===========================================================================
// Ranking
// ===========================================================================

#[test]
fn rankings_are_sorted_non_negative_and_persisted() {
    let db = seeded_db();
    let req = scoring_request(ROUND);
    let rankings = rank_all(&db, &req).unwrap();
    assert_eq!(rankings.len(), 6);

    let store = RankingStore::new(&db);
    for (position, ranked) in &rankings {
        assert!(!ranked.is_empty(), "{position} ranking is empty");
        assert!(ranked.len() <= req.top_n);
        for pair in ranked.windows(2) {
            assert!(pair[0].final_score >= pair[1].final_score);
        }
        assert!(ranked.iter().all(|c| c.final_score >= 0.0));

        let key = RankingKey {
            user_id: 1,
            team_id: 1,
            config_id: WeightConfiguration::fallback().id,
            position: *position,
            round: ROUND,
        };
        let stored = store.read_ranking(&key).unwrap();
        assert_eq!(stored.len(), ranked.len());
        for (s, r) in stored.iter().zip(ranked) {
            assert_eq!(s.athlete_id, r.athlete_id);
            assert!((s.final_score - r.final_score).abs() < 1e-9);
        }
    }
}

#[test]
fn ranking_twice_is_identical() {
    let db = seeded_db();
    let req = scoring_request(ROUND);
    let first = rank_position(&db, &req, Position::Meia).unwrap();
    let second = rank_position(&db, &req, Position::Meia).unwrap();
    assert_eq!(first, second);
}

#[test]
fn goalkeeper_reference_score_through_the_datastore() {
    let db = Database::open(":memory:").unwrap();
    db.upsert_athletes(&[athlete(1, 10, Position::Goleiro, 8.0, 5.0)]).unwrap();
    db.upsert_matches(&[
        fixture(1, 20, 30, Some((1, 0))),
        fixture(1, 40, 20, Some((0, 2))),
        fixture(2, 10, 20, None),
    ])
    .unwrap();
    db.upsert_scouts(&[ScoutRow {
        athlete_id: 99,
        round_id: 1,
        position_id: Position::Atacante.id(),
        club_id: 20,
        entered: true,
        ds: 0,
        ff: 3,
        fs: 0,
        fd: 2,
        g: 0,
        a: 0,
    }])
    .unwrap();
    db.set_club_game_weight(1, 10, 2, 2.0).unwrap();
    db.set_club_sg_weight(2, 10, 2, 0.4).unwrap();

    let ranked = rank_position(&db, &scoring_request(2), Position::Goleiro).unwrap();
    assert_eq!(ranked.len(), 1);
    assert!((ranked[0].final_score - 52.25).abs() < 1e-9);
}

#[test]
fn forward_without_fixture_scores_on_average_alone() {
    let db = Database::open(":memory:").unwrap();
    db.upsert_athletes(&[athlete(1, 50, Position::Atacante, 8.0, 6.0)]).unwrap();
    db.set_club_game_weight(1, 50, 3, 9.0).unwrap();

    let ranked = rank_position(&db, &scoring_request(3), Position::Atacante).unwrap();
    assert!((ranked[0].final_score - 15f64.sqrt()).abs() < 1e-9);
    assert_eq!(ranked[0].opponent_name, None);
}

#[test]
fn coach_ranking_ignores_provavel_table() {
    let db = seeded_db();
    let scoring = ScoringConfig::default();
    let req = ScoringRequest::new(1, 1, ROUND, &scoring);
    assert_eq!(req.liveness, Liveness::ProvavelTable);

    // no provável marks at all: outfield positions are empty, coaches remain
    assert!(rank_position(&db, &req, Position::Meia).unwrap().is_empty());
    assert_eq!(rank_position(&db, &req, Position::Tecnico).unwrap().len(), 16);
}

#[test]
fn round_one_uses_no_history() {
    let db = seeded_db();
    let ranked = rank_position(&db, &scoring_request(1), Position::Lateral).unwrap();
    for c in &ranked {
        assert_eq!(c.inputs.get("ds"), Some(&0.0));
        assert_eq!(c.inputs.get("adv_ds"), Some(&0.0));
    }
}

// ===========================================================================
// End-to-end optimization
// ===========================================================================

#[test]
fn seeded_lineup_is_valid_and_idempotent() {
    let db = seeded_db();
    rank_all(&db, &scoring_request(ROUND)).unwrap();
    let universe = SelectionUniverse::load(&db, 1, 1, ROUND, Liveness::StatusId).unwrap();

    let lineup = optimize(&universe, &request(110.0)).unwrap();
    assert_eq!(lineup.starters.len(), 12);
    assert!(lineup.cost <= 110.0);
    let ids: HashSet<i64> = lineup.starter_ids().into_iter().collect();
    assert_eq!(ids.len(), 12);
    assert!(ids.contains(&lineup.captain_id));

    let payload = lineup.to_payload();
    assert_eq!(payload.esquema, 3);
    assert_eq!(payload.atletas.len(), 12);

    let again = optimize(&universe, &request(110.0)).unwrap();
    assert_eq!(lineup, again);
}

#[test]
fn seeded_closed_defense_draws_from_the_top_clean_sheet_club() {
    let db = seeded_db();
    rank_all(&db, &scoring_request(ROUND)).unwrap();
    let universe = SelectionUniverse::load(&db, 1, 1, ROUND, Liveness::StatusId).unwrap();

    // club 1 carries the highest clean-sheet weight; only its defenders are loaded
    assert_eq!(universe.top_sg_club(), Some(1));
    assert_eq!(universe.club_athletes(1, Position::Zagueiro).len(), 4);
    assert!(universe.club_athletes(2, Position::Zagueiro).is_empty());
    assert!(universe.club_athletes(1, Position::Meia).is_empty());
    assert_eq!(universe.goalkeepers().len(), 16);

    let req = OptimizeRequest {
        strategy: Strategy::ClosedDefense,
        ..request(200.0)
    };
    let lineup = optimize(&universe, &req).unwrap();
    assert!(lineup.closed_defense);
    let defenders: Vec<&Pick> = lineup.starters.iter().filter(|p| p.position.is_defensive()).collect();
    assert_eq!(defenders.len(), 5);
    assert!(defenders.iter().all(|p| p.club_id == 1));
}

#[test]
fn tight_budget_takes_the_twelve_best() {
    let mut ranked = BTreeMap::new();
    let mut id = 1;
    for position in Position::ALL {
        let mut picks: Vec<Pick> = (0..position.formation_count())
            .map(|_| {
                id += 1;
                pick(id, 1, position, 8.0, 10.0)
            })
            .collect();
        // cheaper but lower ranked
        id += 1;
        picks.push(pick(id, 1, position, 1.0, 1.0));
        ranked.insert(position, picks);
    }
    let universe = SelectionUniverse::new(ranked, Vec::new(), Vec::new(), Vec::new());
    let lineup = optimize(&universe, &request(100.0)).unwrap();
    assert!((lineup.cost - 96.0).abs() < 1e-9);
    assert!(lineup.starters.iter().all(|p| (p.price - 8.0).abs() < 1e-9));
}

fn expensive_forwards_universe() -> SelectionUniverse {
    forwards_universe(1.0)
}

/// Three 30.0 forwards on top, then 503..505 at 4.0. `tail_score` is the
/// score of 505, the only forward cheap enough to sit on the bench.
fn forwards_universe(tail_score: f64) -> SelectionUniverse {
    let mut ranked = BTreeMap::new();
    let mut forwards: Vec<Pick> = (0..3).map(|i| pick(500 + i, 1, Position::Atacante, 30.0, 10.0 - i as f64)).collect();
    forwards.push(pick(503, 1, Position::Atacante, 4.0, 3.0));
    forwards.push(pick(504, 1, Position::Atacante, 4.0, 2.0));
    forwards.push(pick(505, 1, Position::Atacante, 4.0, tail_score));
    ranked.insert(Position::Atacante, forwards);
    for position in Position::ALL {
        if position == Position::Atacante {
            continue;
        }
        let picks = (0..position.formation_count() as i64 + 1)
            .map(|i| pick(position.id() * 100 + i, 1, position, 5.0, 5.0 - i as f64))
            .collect();
        ranked.insert(position, picks);
    }
    SelectionUniverse::new(ranked, Vec::new(), Vec::new(), Vec::new())
}

#[test]
fn de_escalation_reaches_the_forwards() {
    let universe = expensive_forwards_universe();
    let lineup = optimize(&universe, &request(100.0)).unwrap();

    let forwards: Vec<i64> = lineup.starters_at(Position::Atacante).map(|p| p.athlete_id).collect();
    assert_eq!(forwards, vec![500, 503, 504]);
    assert!((lineup.cost - 83.0).abs() < 1e-9);
    assert_eq!(lineup.captain_id, 500);
    // captain position went through the pool: the luxury follows the reserve rule
    assert_eq!(lineup.luxury.as_ref().map(|p| p.athlete_id), Some(505));
}

#[test]
fn pooled_captain_position_takes_luxury_from_the_bench() {
    let lineup = optimize(&forwards_universe(1.0), &request(100.0)).unwrap();
    assert_eq!(lineup.captain_position, Position::Atacante);
    assert_eq!(lineup.reserves.get(&Position::Atacante).map(|p| p.athlete_id), Some(505));

    let payload = lineup.to_payload();
    assert_eq!(payload.reserva_luxo_id, Some(505));
    assert_eq!(payload.reservas.get("5"), Some(&505));
    assert!(!payload.atletas.contains(&505));
}

#[test]
fn pooled_captain_position_without_bench_candidate_has_no_luxury() {
    // 501 and 502 are unused but cost more than the cheapest starting forward
    let lineup = optimize(&forwards_universe(0.0), &request(100.0)).unwrap();
    let forwards: Vec<i64> = lineup.starters_at(Position::Atacante).map(|p| p.athlete_id).collect();
    assert_eq!(forwards, vec![500, 503, 504]);
    assert!(lineup.luxury.is_none());
    assert!(!lineup.reserves.contains_key(&Position::Atacante));
    assert_eq!(lineup.to_payload().reserva_luxo_id, None);
}

#[test]
fn de_escalation_without_fit_is_budget_infeasible() {
    let universe = expensive_forwards_universe();
    let err = optimize(&universe, &request(50.0)).unwrap_err();
    assert!(matches!(err, EscalacaoError::BudgetInfeasible { .. }));
}

#[test]
fn goalkeeper_hack_starts_the_null_keeper() {
    let mut ranked = BTreeMap::new();
    ranked.insert(Position::Goleiro, vec![pick(10, 1, Position::Goleiro, 12.0, 10.0)]);
    for position in [Position::Lateral, Position::Zagueiro, Position::Meia] {
        ranked.insert(
            position,
            (0..position.formation_count() as i64)
                .map(|i| pick(position.id() * 100 + i, 1, position, 5.0, 5.0))
                .collect(),
        );
    }
    ranked.insert(
        Position::Atacante,
        (0..4).map(|i| pick(500 + i, 1, Position::Atacante, 5.0, 5.0 - i as f64)).collect(),
    );
    ranked.insert(Position::Tecnico, vec![pick(600, 1, Position::Tecnico, 8.0, 1.0)]);

    let goalkeepers = vec![
        GoalkeeperEntry {
            pick: pick(10, 1, Position::Goleiro, 12.0, 10.0),
            status_id: 7,
            live: true,
        },
        GoalkeeperEntry {
            pick: pick(20, 2, Position::Goleiro, 15.0, 0.0),
            status_id: 6,
            live: false,
        },
    ];
    let universe = SelectionUniverse::new(ranked, Vec::new(), goalkeepers, Vec::new());

    let req = OptimizeRequest {
        goalkeeper_hack: true,
        ..request(100.0)
    };
    let lineup = optimize(&universe, &req).unwrap();
    let gk: Vec<i64> = lineup.starters_at(Position::Goleiro).map(|p| p.athlete_id).collect();
    assert_eq!(gk, vec![20]);
    assert_eq!(lineup.reserves.get(&Position::Goleiro).map(|p| p.athlete_id), Some(10));
    assert!((lineup.cost - 73.0).abs() < 1e-9);
    assert_eq!(lineup.to_payload().reservas.get("1"), Some(&10));
}

/// Club 10 has the best clean-sheet odds and a full affordable block
/// (1, 3, 4, 6, 7 at 33.0). Club 20 has better-ranked defenders at 5.0.
fn clean_sheet_universe(goalkeepers: Vec<GoalkeeperEntry>) -> SelectionUniverse {
    let mut ranked: BTreeMap<Position, Vec<Pick>> = BTreeMap::new();
    let defenders = vec![
        pick(1, 10, Position::Goleiro, 9.0, 5.0),
        pick(2, 10, Position::Zagueiro, 8.0, 1.0),
        pick(3, 10, Position::Zagueiro, 7.0, 4.0),
        pick(4, 10, Position::Zagueiro, 7.0, 3.0),
        pick(5, 10, Position::Lateral, 6.0, 1.0),
        pick(6, 10, Position::Lateral, 5.0, 3.0),
        pick(7, 10, Position::Lateral, 5.0, 2.0),
    ];
    // better-ranked defenders elsewhere that the block must override
    for position in [Position::Goleiro, Position::Zagueiro, Position::Lateral] {
        ranked
            .entry(position)
            .or_default()
            .extend((0..3).map(|i| pick(position.id() * 100 + i, 20, position, 5.0, 20.0 - i as f64)));
    }
    for d in defenders {
        ranked.entry(d.position).or_default().push(d);
    }
    for position in [Position::Meia, Position::Atacante, Position::Tecnico] {
        ranked.insert(
            position,
            (0..4)
                .map(|i| pick(position.id() * 100 + i, 30, position, 5.0, 9.0 - i as f64))
                .collect(),
        );
    }
    SelectionUniverse::new(ranked, Vec::new(), goalkeepers, vec![(10, 0.9), (20, 0.5)])
}

#[test]
fn closed_defense_locks_the_clean_sheet_block() {
    let universe = clean_sheet_universe(Vec::new());

    let req = OptimizeRequest {
        strategy: Strategy::ClosedDefense,
        ..request(100.0)
    };
    let lineup = optimize(&universe, &req).unwrap();
    assert!(lineup.closed_defense);

    let mut defense: Vec<i64> = lineup
        .starters
        .iter()
        .filter(|p| p.position.is_defensive())
        .map(|p| p.athlete_id)
        .collect();
    defense.sort();
    assert_eq!(defense, vec![1, 3, 4, 6, 7]);
    let block_cost: f64 = lineup
        .starters
        .iter()
        .filter(|p| p.position.is_defensive())
        .map(|p| p.price)
        .sum();
    assert!((block_cost - 33.0).abs() < 1e-9);
    assert_eq!(lineup.starters_at(Position::Meia).count(), 3);
    assert_eq!(lineup.starters_at(Position::Atacante).count(), 3);
}

#[test]
fn goalkeeper_hack_replaces_the_locked_goalkeeper() {
    let live = |id: i64, club: i64, price: f64, score: f64| GoalkeeperEntry {
        pick: pick(id, club, Position::Goleiro, price, score),
        status_id: 7,
        live: true,
    };
    let universe = clean_sheet_universe(vec![
        live(1, 10, 9.0, 5.0),
        live(100, 20, 5.0, 20.0),
        GoalkeeperEntry {
            pick: pick(900, 40, Position::Goleiro, 6.0, 0.0),
            status_id: 6,
            live: false,
        },
    ]);

    let req = OptimizeRequest {
        strategy: Strategy::ClosedDefense,
        goalkeeper_hack: true,
        ..request(100.0)
    };
    let lineup = optimize(&universe, &req).unwrap();
    assert!(lineup.closed_defense);

    // the rest of the block stays locked
    let mut defense: Vec<i64> = lineup
        .starters
        .iter()
        .filter(|p| p.position.is_defensive())
        .map(|p| p.athlete_id)
        .collect();
    defense.sort();
    assert_eq!(defense, vec![3, 4, 6, 7, 900]);

    // the best live goalkeeper goes to the bench, not the club's own keeper
    assert_eq!(lineup.reserves.get(&Position::Goleiro).map(|p| p.athlete_id), Some(100));
    // 68.0 with the locked keeper, minus 9.0, plus 6.0
    assert!((lineup.cost - 65.0).abs() < 1e-9);
}
