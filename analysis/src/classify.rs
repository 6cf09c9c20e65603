use serde::{Deserialize, Serialize};

use crate::sampler::Stage;

/// Evaluation gain (player's perspective) at which a move counts as brilliant.
pub const BRILLIANT_DELTA_CP: i32 = 100;
/// Evaluation loss at which a move counts as a mistake.
pub const MISTAKE_DELTA_CP: i32 = -50;

/// Three-tier move quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveQuality {
    Brilliant,
    Neutral,
    Mistake,
}

impl MoveQuality {
    pub fn from_delta(delta: i32) -> Self {
        if delta >= BRILLIANT_DELTA_CP {
            Self::Brilliant
        } else if delta <= MISTAKE_DELTA_CP {
            Self::Mistake
        } else {
            Self::Neutral
        }
    }
}

/// Classify a move from evaluations before and after it, both from the mover's perspective.
pub fn classify(cp_before: i32, cp_after: i32) -> MoveQuality {
    MoveQuality::from_delta(cp_after.saturating_sub(cp_before))
}

/// Orient a side-to-move score to the player's perspective.
pub fn player_pov(side_to_move_cp: i32, player_to_move: bool) -> i32 {
    if player_to_move {
        side_to_move_cp
    } else {
        side_to_move_cp.saturating_neg()
    }
}

/// One evaluated player move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveEvaluation {
    /// Index among the player's own moves (0-based).
    pub move_index: usize,
    /// Full-move number in the game, for linking to the position.
    pub move_number: u32,
    pub stage: Stage,
    pub cp_before: i32,
    pub cp_after: i32,
    pub cp_delta: i32,
    pub quality: MoveQuality,
}

impl MoveEvaluation {
    pub fn new(
        move_index: usize,
        move_number: u32,
        stage: Stage,
        cp_before: i32,
        cp_after: i32,
    ) -> Self {
        let cp_delta = cp_after.saturating_sub(cp_before);
        Self {
            move_index,
            move_number,
            stage,
            cp_before,
            cp_after,
            cp_delta,
            quality: MoveQuality::from_delta(cp_delta),
        }
    }

    /// Evaluation drop caused by the move; 0 when the move did not lose ground.
    pub fn cp_loss(&self) -> i32 {
        self.cp_delta.saturating_neg().max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_table() {
        let table = [
            (150, MoveQuality::Brilliant),
            (100, MoveQuality::Brilliant),
            (99, MoveQuality::Neutral),
            (0, MoveQuality::Neutral),
            (-49, MoveQuality::Neutral),
            (-50, MoveQuality::Mistake),
            (-200, MoveQuality::Mistake),
        ];
        for (delta, expected) in table {
            assert_eq!(MoveQuality::from_delta(delta), expected, "delta {}", delta);
            assert_eq!(classify(30, 30 + delta), expected, "delta {}", delta);
        }
    }

    #[test]
    fn test_mate_scores_do_not_overflow() {
        assert_eq!(
            classify(chess::MATE_SCORE_CP, -chess::MATE_SCORE_CP),
            MoveQuality::Mistake
        );
        assert_eq!(classify(i32::MIN, i32::MAX), MoveQuality::Brilliant);
    }

    #[test]
    fn test_player_pov_flips_for_opponent_to_move() {
        // After the player's move the engine reports for the opponent.
        assert_eq!(player_pov(80, false), -80);
        assert_eq!(player_pov(80, true), 80);
    }

    #[test]
    fn test_move_evaluation_cp_loss() {
        let blunder = MoveEvaluation::new(3, 8, Stage::Early, 40, -310);
        assert_eq!(blunder.cp_delta, -350);
        assert_eq!(blunder.cp_loss(), 350);
        assert_eq!(blunder.quality, MoveQuality::Mistake);

        let gain = MoveEvaluation::new(4, 9, Stage::Early, -310, -100);
        assert_eq!(gain.cp_loss(), 0);
        assert_eq!(gain.quality, MoveQuality::Brilliant);
    }
}
