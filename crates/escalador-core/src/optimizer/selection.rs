// Standard greedy fill and the combinatorial pool for de-escalated positions.

use std::collections::{BTreeMap, HashSet};

use super::universe::{Pick, SelectionUniverse};
use crate::model::Position;

/// Slack for float price sums.
pub(crate) const BUDGET_EPSILON: f64 = 1e-9;

/// Why one attempt could not complete the formation.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum AttemptFailure {
    /// A position had fewer candidates than open slots.
    Short {
        position: Position,
        needed: usize,
        found: usize,
    },
    /// Enough candidates, but no affordable choice.
    Budget,
}

/// Lineup under construction.
#[derive(Debug, Clone, Default)]
pub(crate) struct Attempt {
    pub starters: BTreeMap<Position, Vec<Pick>>,
    pub used: HashSet<i64>,
    pub cost: f64,
    pub luxury: Option<Pick>,
    /// The captain position was completed by the pool.
    pub captain_pooled: bool,
}

impl Attempt {
    pub fn count(&self, position: Position) -> usize {
        self.starters.get(&position).map_or(0, Vec::len)
    }

    pub fn add_starter(&mut self, pick: Pick) {
        self.cost += pick.price;
        self.used.insert(pick.athlete_id);
        self.starters.entry(pick.position).or_default().push(pick);
    }

    pub fn open_slots(&self, position: Position) -> usize {
        position.formation_count().saturating_sub(self.count(position))
    }
}

/// Greedy pass over the top `2 * search` unused candidates: take each one
/// whose price keeps the running cost within `patrimonio`, until `search`
/// picks are made.
pub(crate) fn greedy_pick(
    candidates: &[Pick],
    used: &HashSet<i64>,
    search: usize,
    cost_so_far: f64,
    patrimonio: f64,
) -> Vec<Pick> {
    let mut running = cost_so_far;
    let mut picked = Vec::with_capacity(search);
    for candidate in candidates
        .iter()
        .filter(|c| !used.contains(&c.athlete_id))
        .take(search * 2)
    {
        if picked.len() >= search {
            break;
        }
        if running + candidate.price <= patrimonio + BUDGET_EPSILON {
            running += candidate.price;
            picked.push(candidate.clone());
        }
    }
    picked
}

/// Fill one non-pooled position. The captain position searches one extra
/// athlete; the most expensive picks become starters and the next one is
/// the luxury reserve.
pub(crate) fn fill_standard(
    universe: &SelectionUniverse,
    attempt: &mut Attempt,
    position: Position,
    captain: Position,
    patrimonio: f64,
) -> Result<(), AttemptFailure> {
    let needed = attempt.open_slots(position);
    if needed == 0 {
        return Ok(());
    }
    let is_captain = position == captain && position.can_captain();
    let search = if is_captain { needed + 1 } else { needed };

    let mut picked = greedy_pick(
        universe.ranked(position),
        &attempt.used,
        search,
        attempt.cost,
        patrimonio,
    );
    if picked.len() < needed {
        return Err(AttemptFailure::Short {
            position,
            needed,
            found: picked.len(),
        });
    }

    if is_captain {
        picked.sort_by(|a, b| b.price.partial_cmp(&a.price).unwrap_or(std::cmp::Ordering::Equal));
        if picked.len() > needed {
            attempt.luxury = Some(picked.remove(needed));
        }
    }
    for pick in picked.into_iter().take(needed) {
        attempt.add_starter(pick);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Combinatorial pool
// ---------------------------------------------------------------------------

struct PoolGroup {
    position: Position,
    needed: usize,
    candidates: Vec<Pick>,
    /// Cost of the `needed` cheapest candidates.
    min_cost: f64,
}

/// Complete every position in `pooled` (in that order) that still has open
/// slots. Index combinations are walked lexicographically per position and
/// the Cartesian product across positions in pooled order; the first tuple
/// within the remaining budget wins.
pub(crate) fn fill_pool(
    universe: &SelectionUniverse,
    attempt: &mut Attempt,
    pooled: &[Position],
    captain: Position,
    patrimonio: f64,
) -> Result<(), AttemptFailure> {
    let mut groups = Vec::new();
    for &position in pooled {
        let needed = attempt.open_slots(position);
        if needed == 0 {
            continue;
        }
        let candidates: Vec<Pick> = universe
            .ranked(position)
            .iter()
            .filter(|c| !attempt.used.contains(&c.athlete_id))
            .take(position.pool_size())
            .cloned()
            .collect();
        if candidates.len() < needed {
            return Err(AttemptFailure::Short {
                position,
                needed,
                found: candidates.len(),
            });
        }
        let mut prices: Vec<f64> = candidates.iter().map(|c| c.price).collect();
        prices.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let min_cost = prices.iter().take(needed).sum();
        groups.push(PoolGroup {
            position,
            needed,
            candidates,
            min_cost,
        });
    }
    if groups.is_empty() {
        return Ok(());
    }

    // Cheapest possible cost of groups[i..].
    let mut suffix_min = vec![0.0; groups.len() + 1];
    for i in (0..groups.len()).rev() {
        suffix_min[i] = suffix_min[i + 1] + groups[i].min_cost;
    }

    let remaining = patrimonio - attempt.cost;
    let mut chosen: Vec<Vec<usize>> = Vec::with_capacity(groups.len());
    if !search_groups(&groups, &suffix_min, 0, remaining, &mut chosen) {
        return Err(AttemptFailure::Budget);
    }

    for (group, indices) in groups.iter().zip(chosen) {
        if group.position == captain {
            attempt.captain_pooled = true;
        }
        for i in indices {
            attempt.add_starter(group.candidates[i].clone());
        }
    }
    Ok(())
}

fn search_groups(
    groups: &[PoolGroup],
    suffix_min: &[f64],
    depth: usize,
    budget: f64,
    chosen: &mut Vec<Vec<usize>>,
) -> bool {
    if depth == groups.len() {
        return true;
    }
    if suffix_min[depth] > budget + BUDGET_EPSILON {
        return false;
    }
    let group = &groups[depth];
    // What this group may spend and still leave room for the cheapest
    // completion of the groups after it.
    let group_budget = budget - suffix_min[depth + 1];
    let mut combo = Vec::with_capacity(group.needed);
    walk_combinations(group, 0, 0.0, group_budget, &mut combo, &mut |indices: &[usize], cost: f64| {
        chosen.push(indices.to_vec());
        if search_groups(groups, suffix_min, depth + 1, budget - cost, chosen) {
            return true;
        }
        chosen.pop();
        false
    })
}

/// Lexicographic k-combinations of the group's candidate indices, pruning
/// prefixes already over `budget`. Stops at the first combination for which
/// `visit` returns true.
fn walk_combinations(
    group: &PoolGroup,
    start: usize,
    cost: f64,
    budget: f64,
    combo: &mut Vec<usize>,
    visit: &mut dyn FnMut(&[usize], f64) -> bool,
) -> bool {
    if combo.len() == group.needed {
        return visit(combo, cost);
    }
    let still_needed = group.needed - combo.len();
    for i in start..=group.candidates.len() - still_needed {
        let next = cost + group.candidates[i].price;
        if next > budget + BUDGET_EPSILON {
            continue;
        }
        combo.push(i);
        if walk_combinations(group, i + 1, next, budget, combo, visit) {
            return true;
        }
        combo.pop();
    }
    false
}
