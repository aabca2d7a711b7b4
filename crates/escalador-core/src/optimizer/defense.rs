// Closed defense: lock goalkeeper, center-backs and side-backs from the club
// most likely to keep a clean sheet.

use tracing::info;

use super::selection::BUDGET_EPSILON;
use super::universe::{Pick, SelectionUniverse};
use crate::model::Position;

const MAX_GOALKEEPERS: usize = 5;
const MAX_CENTER_BACKS: usize = 8;
const MAX_SIDE_BACKS: usize = 8;

/// Defensive athletes chosen before the standard fill runs.
#[derive(Debug, Clone, PartialEq)]
pub struct DefenseBlock {
    pub club_id: i64,
    pub picks: Vec<Pick>,
}

impl DefenseBlock {
    pub fn cost(&self) -> f64 {
        self.picks.iter().map(|p| p.price).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.picks.len() == 5
    }
}

/// Candidates of `position` from `club_id`: ranked athletes first, then the
/// cheapest unranked live athletes at score 0, up to `limit`.
fn club_candidates(universe: &SelectionUniverse, club_id: i64, position: Position, limit: usize) -> Vec<Pick> {
    let mut list: Vec<Pick> = universe
        .ranked(position)
        .iter()
        .filter(|p| p.club_id == club_id)
        .take(limit)
        .cloned()
        .collect();
    for pad in universe.club_athletes(club_id, position) {
        if list.len() >= limit {
            break;
        }
        if list.iter().all(|p| p.athlete_id != pad.athlete_id) {
            list.push(Pick { score: 0.0, ..pad.clone() });
        }
    }
    list
}

/// Choose the defensive block to lock, or `None` to run the plain standard
/// strategy. Only the top clean-sheet club is considered.
pub fn lock_block(universe: &SelectionUniverse, patrimonio: f64) -> Option<DefenseBlock> {
    let Some(club_id) = universe.top_sg_club() else {
        info!("closed defense: no clean-sheet ranking for this round, using standard strategy");
        return None;
    };

    let gks = club_candidates(universe, club_id, Position::Goleiro, MAX_GOALKEEPERS);
    let zags = club_candidates(universe, club_id, Position::Zagueiro, MAX_CENTER_BACKS);
    let lats = club_candidates(universe, club_id, Position::Lateral, MAX_SIDE_BACKS);

    if !gks.is_empty() && zags.len() >= 2 && lats.len() >= 2 {
        if let Some(picks) = best_full_block(&gks, &zags, &lats, patrimonio) {
            let block = DefenseBlock { club_id, picks };
            info!(
                "closed defense: locked full block from club {} (cost {:.2})",
                club_id,
                block.cost()
            );
            return Some(block);
        }
    }

    let picks = partial_block(&gks, &zags, &lats, patrimonio);
    if picks.is_empty() {
        info!("closed defense: nothing affordable from club {club_id}, using standard strategy");
        return None;
    }
    let block = DefenseBlock { club_id, picks };
    info!(
        "closed defense: locked {} defenders from club {} (cost {:.2})",
        block.picks.len(),
        club_id,
        block.cost()
    );
    Some(block)
}

/// Highest total score among 1 GK + 2 ZAG + 2 LAT within budget. The first
/// maximum in enumeration order wins.
fn best_full_block(gks: &[Pick], zags: &[Pick], lats: &[Pick], patrimonio: f64) -> Option<Vec<Pick>> {
    let mut best: Option<(f64, [usize; 5])> = None;
    for g in 0..gks.len() {
        for z1 in 0..zags.len() {
            for z2 in z1 + 1..zags.len() {
                for l1 in 0..lats.len() {
                    for l2 in l1 + 1..lats.len() {
                        let cost = gks[g].price + zags[z1].price + zags[z2].price + lats[l1].price + lats[l2].price;
                        if cost > patrimonio + BUDGET_EPSILON {
                            continue;
                        }
                        let score = gks[g].score + zags[z1].score + zags[z2].score + lats[l1].score + lats[l2].score;
                        if best.map_or(true, |(s, _)| score > s) {
                            best = Some((score, [g, z1, z2, l1, l2]));
                        }
                    }
                }
            }
        }
    }
    best.map(|(_, [g, z1, z2, l1, l2])| {
        vec![
            gks[g].clone(),
            zags[z1].clone(),
            zags[z2].clone(),
            lats[l1].clone(),
            lats[l2].clone(),
        ]
    })
}

/// Greedy cheapest-first fill with per-position caps.
fn partial_block(gks: &[Pick], zags: &[Pick], lats: &[Pick], patrimonio: f64) -> Vec<Pick> {
    let mut bucket: Vec<&Pick> = gks.iter().chain(zags).chain(lats).collect();
    bucket.sort_by(|a, b| {
        a.price
            .partial_cmp(&b.price)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal))
    });

    let cap = |position: Position| -> usize {
        let available = match position {
            Position::Goleiro => gks.len(),
            Position::Zagueiro => zags.len(),
            Position::Lateral => lats.len(),
            _ => 0,
        };
        position.formation_count().min(available)
    };
    let max_total = cap(Position::Goleiro) + cap(Position::Zagueiro) + cap(Position::Lateral);

    let mut picks: Vec<Pick> = Vec::new();
    let mut cost = 0.0;
    for pick in bucket {
        if picks.len() >= max_total {
            break;
        }
        let taken = picks.iter().filter(|p| p.position == pick.position).count();
        if taken >= cap(pick.position) {
            continue;
        }
        if cost + pick.price <= patrimonio + BUDGET_EPSILON {
            cost += pick.price;
            picks.push(pick.clone());
        }
    }
    picks
}
