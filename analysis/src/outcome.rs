//! Per-move and per-game results fed to the aggregator. Failures are values here,
//! so a skipped move or game never aborts the batch.

use serde::Serialize;

use crate::classify::MoveEvaluation;
use crate::sampler::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    EngineUnavailable,
    Timeout,
    /// The evaluator produced no usable score.
    Rejected,
    /// The position was already won or lost beyond the configured margin.
    Decided,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    Evaluated(MoveEvaluation),
    Skipped {
        move_index: usize,
        stage: Stage,
        reason: SkipReason,
    },
}

impl MoveOutcome {
    pub fn evaluation(&self) -> Option<&MoveEvaluation> {
        match self {
            Self::Evaluated(eval) => Some(eval),
            Self::Skipped { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameSkipReason {
    MalformedPgn(String),
    NoPlayerMoves,
}

impl std::fmt::Display for GameSkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedPgn(err) => write!(f, "malformed PGN: {}", err),
            Self::NoPlayerMoves => f.write_str("player made no moves"),
        }
    }
}

/// Every sampled move of one game, evaluated or skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameAnalysis {
    pub url: String,
    pub lost_by_resignation: bool,
    pub moves: Vec<MoveOutcome>,
}

impl GameAnalysis {
    /// The move with the largest evaluation drop, if any move lost ground.
    pub fn largest_drop(&self) -> Option<&MoveEvaluation> {
        self.moves
            .iter()
            .filter_map(MoveOutcome::evaluation)
            .filter(|eval| eval.cp_loss() > 0)
            .max_by(|a, b| {
                a.cp_loss()
                    .cmp(&b.cp_loss())
                    .then_with(|| b.move_index.cmp(&a.move_index))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameOutcome {
    Analyzed(GameAnalysis),
    Skipped { url: String, reason: GameSkipReason },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_largest_drop_prefers_earliest_on_tie() {
        let game = GameAnalysis {
            url: "u".into(),
            lost_by_resignation: true,
            moves: vec![
                MoveOutcome::Evaluated(MoveEvaluation::new(0, 1, Stage::Early, 0, -200)),
                MoveOutcome::Skipped {
                    move_index: 1,
                    stage: Stage::Early,
                    reason: SkipReason::Timeout,
                },
                MoveOutcome::Evaluated(MoveEvaluation::new(2, 3, Stage::Middle, 100, -100)),
                MoveOutcome::Evaluated(MoveEvaluation::new(3, 4, Stage::Late, 0, 300)),
            ],
        };
        assert_eq!(game.largest_drop().map(|e| e.move_index), Some(0));
    }

    #[test]
    fn test_no_drop_when_nothing_lost() {
        let game = GameAnalysis {
            url: "u".into(),
            lost_by_resignation: false,
            moves: vec![MoveOutcome::Evaluated(MoveEvaluation::new(
                0,
                1,
                Stage::Early,
                0,
                10,
            ))],
        };
        assert!(game.largest_drop().is_none());
    }
}
