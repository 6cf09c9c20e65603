pub mod analysis;
pub mod fen;
pub mod pgn;
pub mod types;

pub use analysis::{AnalysisScore, MATE_SCORE_CP};
pub use fen::{
    format_fen, fullmove_number, is_checkmate, is_terminal_position, parse_fen, FenError,
    STARTING_FEN,
};
pub use pgn::{parse_pgn, parse_san, GameResult, PgnError, PgnGame, PgnMove, SanError};
pub use types::PieceColor;
