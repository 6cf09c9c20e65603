use cozy_chess::Board;

pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Parse a FEN string into a Board
pub fn parse_fen(fen: &str) -> Result<Board, FenError> {
    let parts: Vec<&str> = fen.split_whitespace().collect();
    if parts.is_empty() {
        return Err(FenError::InvalidFormat);
    }
    fen.parse().map_err(|_| FenError::InvalidFormat)
}

/// Format a Board as a FEN string
pub fn format_fen(board: &Board) -> String {
    board.to_string()
}

/// Full-move number recorded in the sixth FEN field. Defaults to 1 when the
/// field is missing or unparseable.
pub fn fullmove_number(fen: &str) -> u32 {
    fen.split_whitespace()
        .nth(5)
        .and_then(|n| n.parse().ok())
        .filter(|n| *n > 0)
        .unwrap_or(1)
}

/// Check if a position has no legal moves (checkmate or stalemate).
///
/// Fifty-move and repetition draws are not terminal here: the side to move
/// still has moves an engine can search.
pub fn is_terminal_position(fen: &str) -> bool {
    match fen.parse::<Board>() {
        Ok(board) => !has_legal_moves(&board),
        Err(_) => false,
    }
}

/// Check if a position is checkmate (as opposed to stalemate).
pub fn is_checkmate(fen: &str) -> bool {
    match fen.parse::<Board>() {
        Ok(board) => !has_legal_moves(&board) && !board.checkers().is_empty(),
        Err(_) => false,
    }
}

fn has_legal_moves(board: &Board) -> bool {
    board.generate_moves(|moves| !moves.is_empty())
}

#[derive(Debug, thiserror::Error)]
pub enum FenError {
    #[error("Invalid FEN format")]
    InvalidFormat,
}
