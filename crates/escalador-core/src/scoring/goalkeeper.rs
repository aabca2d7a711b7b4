// Goalkeeper formula: shots the opponent produces, less the goals it scores,
// scaled by the clean-sheet weight.

use super::{jogo_term, non_negative, CandidateInputs, ScoreBreakdown};
use crate::weights::PositionWeights;

/// `max(0, (media*FM + jogo + oppFF*FF + oppFD*FD - oppGoals*FGA) * (FSG + peso_sg))`
///
/// No popularity factor and no square root.
pub fn score(inputs: &CandidateInputs, w: &PositionWeights) -> ScoreBreakdown {
    let base = inputs.media * w.media
        + jogo_term(inputs, w)
        + inputs.opponent_club.ff * w.ff
        + inputs.opponent_club.fd * w.fd
        - inputs.opponent_goals * w.gol_adversario;
    ScoreBreakdown {
        base,
        final_score: non_negative(base * (w.sg + inputs.peso_sg)),
        popularity_weight: 1.0,
    }
}
