// Center-back formula.

use super::{jogo_term, non_negative, popularity_weight, CandidateInputs, ScoreBreakdown};
use crate::weights::PositionWeights;

/// `sqrt(max(0, (media*FM + jogo + ds*opp_ds*FDS) * (1 + peso_sg*FSG) * peso_esc))`
pub fn score(inputs: &CandidateInputs, w: &PositionWeights) -> ScoreBreakdown {
    let base = inputs.media * w.media
        + jogo_term(inputs, w)
        + inputs.own.ds * inputs.opponent_allowance.ds * w.ds;
    let scaled = base * (1.0 + inputs.peso_sg * w.sg);
    let peso_esc = popularity_weight(inputs, w);
    ScoreBreakdown {
        base,
        final_score: non_negative(scaled * peso_esc).sqrt(),
        popularity_weight: peso_esc,
    }
}
