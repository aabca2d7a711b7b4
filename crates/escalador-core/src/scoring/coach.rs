// Coach formula: the game weight alone.

use super::{jogo_term, non_negative, CandidateInputs, ScoreBreakdown};
use crate::weights::PositionWeights;

pub fn score(inputs: &CandidateInputs, w: &PositionWeights) -> ScoreBreakdown {
    let base = jogo_term(inputs, w);
    ScoreBreakdown {
        base,
        final_score: non_negative(base),
        popularity_weight: 1.0,
    }
}
