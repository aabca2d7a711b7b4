// In-memory view of everything one optimization reads.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::db::Database;
use crate::error::Result;
use crate::model::{Athlete, CandidateScore, Position};
use crate::ranking::{RankingKey, RankingStore};
use crate::repository::{AthleteRepository, Liveness};
use crate::scoring::weight_configuration;
use crate::weights::WeightStore;

/// An athlete as the optimizer sees it: current price plus ranking score.
#[derive(Debug, Clone, PartialEq)]
pub struct Pick {
    pub athlete_id: i64,
    pub nickname: String,
    pub position: Position,
    pub club_id: i64,
    pub price: f64,
    pub score: f64,
}

impl Pick {
    fn from_athlete(athlete: &Athlete, position: Position, score: f64) -> Self {
        Pick {
            athlete_id: athlete.athlete_id,
            nickname: athlete.nickname.clone(),
            position,
            club_id: athlete.club_id,
            price: athlete.price,
            score,
        }
    }
}

/// A goalkeeper with the status the hack needs.
#[derive(Debug, Clone, PartialEq)]
pub struct GoalkeeperEntry {
    pub pick: Pick,
    pub status_id: i64,
    pub live: bool,
}

/// Ranked live candidates per position, live defenders of the top
/// clean-sheet club, every goalkeeper and the clean-sheet club ranking.
#[derive(Debug, Clone, Default)]
pub struct SelectionUniverse {
    ranked: BTreeMap<Position, Vec<Pick>>,
    club_athletes: HashMap<(i64, Position), Vec<Pick>>,
    goalkeepers: Vec<GoalkeeperEntry>,
    sg_ranking: Vec<(i64, f64)>,
}

impl SelectionUniverse {
    /// Build from parts. `club_athletes` lists are sorted cheapest first and
    /// `goalkeepers` by price here.
    pub fn new(
        ranked: BTreeMap<Position, Vec<Pick>>,
        club_athletes: Vec<Pick>,
        mut goalkeepers: Vec<GoalkeeperEntry>,
        sg_ranking: Vec<(i64, f64)>,
    ) -> Self {
        let mut by_club: HashMap<(i64, Position), Vec<Pick>> = HashMap::new();
        for pick in club_athletes {
            by_club.entry((pick.club_id, pick.position)).or_default().push(pick);
        }
        for list in by_club.values_mut() {
            list.sort_by(|a, b| {
                a.price
                    .partial_cmp(&b.price)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.athlete_id.cmp(&b.athlete_id))
            });
        }
        goalkeepers.sort_by(|a, b| {
            a.pick
                .price
                .partial_cmp(&b.pick.price)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.pick.athlete_id.cmp(&b.pick.athlete_id))
        });
        SelectionUniverse {
            ranked,
            club_athletes: by_club,
            goalkeepers,
            sg_ranking,
        }
    }

    /// Load the stored rankings of a (user, team) for `round` and join them
    /// with current prices and liveness.
    pub fn load(db: &Database, user_id: i64, team_id: i64, round: u32, liveness: Liveness) -> Result<Self> {
        let repo = AthleteRepository::new(db);
        let rankings = RankingStore::new(db);
        let config = weight_configuration(db, user_id, team_id)?;

        let sg_ranking = WeightStore::new(db).club_sg_ranking(config.sg_profile_id, round);

        let mut ranked = BTreeMap::new();
        let mut goalkeeper_scores = HashMap::new();
        let mut live_goalkeepers = HashSet::new();

        for position in Position::ALL {
            let key = RankingKey {
                user_id,
                team_id,
                config_id: config.id,
                position,
                round,
            };
            let stored = rankings.read_ranking(&key)?;
            let athletes = repo.athletes_of_position(position)?;
            let live = repo.live_athlete_ids(position, round, liveness)?;

            ranked.insert(position, join_ranking(&stored, &athletes, |id| live.contains(&id)));

            if position == Position::Goleiro {
                goalkeeper_scores = stored.iter().map(|c| (c.athlete_id, c.final_score)).collect();
                live_goalkeepers = live;
            }
        }

        // Closed defense only ever draws from the top clean-sheet club.
        let mut club_athletes = Vec::new();
        if let Some(&(club_id, _)) = sg_ranking.first() {
            for position in Position::ALL.into_iter().filter(Position::is_defensive) {
                club_athletes.extend(
                    repo.club_candidates(club_id, position, round, liveness)?
                        .iter()
                        .map(|a| Pick::from_athlete(a, position, 0.0)),
                );
            }
        }

        let goalkeepers = repo
            .goalkeepers()?
            .iter()
            .map(|a| GoalkeeperEntry {
                pick: Pick::from_athlete(
                    a,
                    Position::Goleiro,
                    goalkeeper_scores.get(&a.athlete_id).copied().unwrap_or(0.0),
                ),
                status_id: a.status_id,
                live: live_goalkeepers.contains(&a.athlete_id),
            })
            .collect();

        Ok(SelectionUniverse::new(ranked, club_athletes, goalkeepers, sg_ranking))
    }

    /// Ranked live candidates of a position, best first.
    pub fn ranked(&self, position: Position) -> &[Pick] {
        self.ranked.get(&position).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Live athletes of a club and position, cheapest first.
    pub fn club_athletes(&self, club_id: i64, position: Position) -> &[Pick] {
        self.club_athletes
            .get(&(club_id, position))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every goalkeeper, cheapest first.
    pub fn goalkeepers(&self) -> &[GoalkeeperEntry] {
        &self.goalkeepers
    }

    pub fn top_sg_club(&self) -> Option<i64> {
        self.sg_ranking.first().map(|(club, _)| *club)
    }
}

/// Ranking order, dropping athletes that left the market or are no longer
/// live. Prices come from the athlete rows.
fn join_ranking(
    stored: &[CandidateScore],
    athletes: &HashMap<i64, Athlete>,
    is_live: impl Fn(i64) -> bool,
) -> Vec<Pick> {
    stored
        .iter()
        .filter(|c| is_live(c.athlete_id))
        .filter_map(|c| {
            let athlete = athletes.get(&c.athlete_id)?;
            let position = athlete.position()?;
            Some(Pick::from_athlete(athlete, position, c.final_score))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pick(id: i64, club: i64, position: Position, price: f64) -> Pick {
        Pick {
            athlete_id: id,
            nickname: format!("P{id}"),
            position,
            club_id: club,
            price,
            score: 0.0,
        }
    }

    #[test]
    fn club_lists_are_cheapest_first() {
        let universe = SelectionUniverse::new(
            BTreeMap::new(),
            vec![
                pick(1, 10, Position::Zagueiro, 9.0),
                pick(2, 10, Position::Zagueiro, 3.0),
                pick(3, 11, Position::Zagueiro, 1.0),
            ],
            Vec::new(),
            vec![(10, 0.8), (11, 0.2)],
        );
        let ids: Vec<i64> = universe
            .club_athletes(10, Position::Zagueiro)
            .iter()
            .map(|p| p.athlete_id)
            .collect();
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(universe.top_sg_club(), Some(10));
        assert!(universe.ranked(Position::Meia).is_empty());
    }

    #[test]
    fn join_drops_unknown_and_dead_athletes() {
        let mut athletes = HashMap::new();
        for id in [1, 2] {
            athletes.insert(
                id,
                Athlete {
                    athlete_id: id,
                    nickname: format!("A{id}"),
                    full_name: String::new(),
                    club_id: 10,
                    position_id: 5,
                    price: 7.5,
                    season_avg: 0.0,
                    games: 0,
                    status_id: 7,
                },
            );
        }
        let stored: Vec<CandidateScore> = [3, 2, 1]
            .iter()
            .map(|&id| CandidateScore {
                athlete_id: id,
                nickname: String::new(),
                position_id: 5,
                club_id: 10,
                club_name: String::new(),
                opponent_name: None,
                final_score: id as f64,
                popularity_weight: 1.0,
                inputs: Default::default(),
            })
            .collect();
        let joined = join_ranking(&stored, &athletes, |id| id != 1);
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].athlete_id, 2);
        assert!((joined[0].price - 7.5).abs() < f64::EPSILON);
    }
}
