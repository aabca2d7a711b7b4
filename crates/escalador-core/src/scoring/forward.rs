// Forward formula.

use super::{non_negative, outfield_base, popularity_weight, CandidateInputs, ScoreBreakdown};
use crate::weights::PositionWeights;

/// `sqrt(max(0, base)) * peso_esc`, no clean-sheet term.
pub fn score(inputs: &CandidateInputs, w: &PositionWeights) -> ScoreBreakdown {
    let base = outfield_base(inputs, w);
    let peso_esc = popularity_weight(inputs, w);
    ScoreBreakdown {
        base,
        final_score: non_negative(base).sqrt() * peso_esc,
        popularity_weight: peso_esc,
    }
}
