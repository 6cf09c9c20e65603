//! Deterministic selection of which player moves to evaluate in one game.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Early,
    Middle,
    Late,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Early, Stage::Middle, Stage::Late];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Early => "early",
            Self::Middle => "middle",
            Self::Late => "late",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Early => "Early game",
            Self::Middle => "Middlegame",
            Self::Late => "Endgame",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Self::Early => 0,
            Self::Middle => 1,
            Self::Late => 2,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Player-move indices selected for evaluation, by stage. Each list is ascending
/// and the three lists are disjoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MoveSampleSet {
    pub early: Vec<usize>,
    pub middle: Vec<usize>,
    pub late: Vec<usize>,
}

impl MoveSampleSet {
    pub fn stage(&self, stage: Stage) -> &[usize] {
        match stage {
            Stage::Early => &self.early,
            Stage::Middle => &self.middle,
            Stage::Late => &self.late,
        }
    }

    pub fn len(&self) -> usize {
        self.early.len() + self.middle.len() + self.late.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All selected indices in ascending order, with their stage.
    pub fn iter(&self) -> impl Iterator<Item = (usize, Stage)> + '_ {
        Stage::ALL
            .into_iter()
            .flat_map(move |stage| self.stage(stage).iter().map(move |&i| (i, stage)))
    }
}

/// Select which of a game's `total_player_moves` to evaluate.
///
/// Games of at most `3 * moves_per_stage` moves are evaluated in full and split
/// into thirds. Longer games take the first and last `moves_per_stage` moves plus
/// `moves_per_stage` evenly strided picks from the range between them.
pub fn select_moves(total_player_moves: usize, moves_per_stage: usize) -> MoveSampleSet {
    let n = total_player_moves;
    if n == 0 || moves_per_stage == 0 {
        return MoveSampleSet::default();
    }

    if n <= moves_per_stage.saturating_mul(3) {
        let first_cut = n.div_ceil(3);
        let second_cut = (2 * n).div_ceil(3);
        return MoveSampleSet {
            early: (0..first_cut).collect(),
            middle: (first_cut..second_cut).collect(),
            late: (second_cut..n).collect(),
        };
    }

    let early_end = moves_per_stage;
    // Never earlier than the end of `early`, so the windows cannot overlap.
    let late_start = n.saturating_sub(moves_per_stage).max(early_end);
    let remaining = late_start - early_end;
    let stride = (remaining / moves_per_stage).max(1);

    MoveSampleSet {
        early: (0..early_end).collect(),
        middle: (early_end..late_start)
            .step_by(stride)
            .take(moves_per_stage)
            .collect(),
        late: (late_start..n).collect(),
    }
}
