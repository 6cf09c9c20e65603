pub mod cloud;
pub mod evaluator;
pub mod stockfish;
pub mod uci;

pub use cloud::{CloudEvaluator, CloudStats};
pub use evaluator::{
    EvalError, EvaluatorFactory, FallbackEvaluator, PositionEvaluator, SearchBudget,
    StockfishEvaluator, StockfishFactory,
};
pub use stockfish::{EngineConfig, EngineError, StockfishEngine};
pub use uci::{UciError, UciMessage};

use cozy_chess::Move;

/// Commands sent to the engine
#[derive(Debug, Clone)]
pub enum EngineCommand {
    SetPosition { fen: String },
    SetOption { name: String, value: Option<String> },
    Go(GoParams),
    Stop,
    Quit,
}

/// Limits for the "go" command. A node budget overrides movetime and depth.
#[derive(Debug, Clone, Default)]
pub struct GoParams {
    pub nodes: Option<u64>,
    pub movetime: Option<u64>, // milliseconds
    pub depth: Option<u8>,
}

/// Events received from the engine
#[derive(Debug, Clone)]
pub enum EngineEvent {
    Ready,
    /// `None` when the engine answers `bestmove (none)` (no legal moves).
    BestMove(Option<Move>),
    Info(EngineInfo),
    Error(String),
}

/// The parts of an `info` line the evaluator reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineInfo {
    pub score: Option<Score>,
    pub bound: ScoreBound,
    pub multipv: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Score {
    Centipawns(i32),
    Mate(i8), // Negative for being mated
}

/// Whether a reported score is exact or only a fail-high/fail-low bound.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScoreBound {
    #[default]
    Exact,
    Lower,
    Upper,
}

impl From<Score> for chess::AnalysisScore {
    fn from(score: Score) -> Self {
        match score {
            Score::Centipawns(cp) => Self::Centipawns(cp),
            Score::Mate(m) => Self::Mate(m as i32),
        }
    }
}
