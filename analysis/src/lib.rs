//! Synchronous mistake-analysis algorithms: game and move sampling, move
//! classification, and per-stage aggregation. No I/O happens here.

pub mod aggregate;
pub mod classify;
pub mod game;
pub mod outcome;
pub mod sampler;
pub mod selector;

pub use aggregate::{
    AggregatedResult, CriticalMistake, CriticalMistakeGame, StageAggregator, StageStatistics,
    WorstMistake, CRITICAL_MISTAKE_FLOOR_CP, NO_QUALIFYING_GAME,
};
pub use classify::{classify, player_pov, MoveEvaluation, MoveQuality};
pub use game::{GameRecord, PlayerResult, Termination};
pub use outcome::{GameAnalysis, GameOutcome, GameSkipReason, MoveOutcome, SkipReason};
pub use sampler::{select_moves, MoveSampleSet, Stage};
pub use selector::{select_games, selected_indices};
