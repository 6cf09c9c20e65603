//! Line-level UCI protocol handling for the engine subprocess.

pub mod parser;

pub use parser::{parse_uci_message, parse_uci_move, UciMessage};

/// A line from the engine that could not be understood.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UciError {
    #[error("truncated UCI line `{0}`")]
    MalformedMessage(String),
    #[error("unrecognised UCI line `{0}`")]
    UnknownMessage(String),
    #[error("`{0}` is not a move in long algebraic notation")]
    InvalidMove(String),
    #[error("bad square in `{0}`")]
    InvalidSquare(String),
    #[error("bad promotion piece in `{0}`")]
    InvalidPromotion(String),
}
