// Side-back formula.

use super::{non_negative, outfield_base, popularity_weight, CandidateInputs, ScoreBreakdown};
use crate::weights::PositionWeights;

/// Outfield base scaled by the clean-sheet factor, square-rooted, then
/// multiplied by the popularity weight.
pub fn score(inputs: &CandidateInputs, w: &PositionWeights) -> ScoreBreakdown {
    let base = outfield_base(inputs, w);
    let scaled = non_negative(base * (1.0 + inputs.peso_sg * w.sg));
    let peso_esc = popularity_weight(inputs, w);
    ScoreBreakdown {
        base,
        final_score: scaled.sqrt() * peso_esc,
        popularity_weight: peso_esc,
    }
}
