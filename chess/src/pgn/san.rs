use cozy_chess::{Board, File, Move, Piece, Rank, Square};

/// Parse a Standard Algebraic Notation (SAN) move against the legal moves of `board`.
///
/// Accepts check/mate markers and suffix annotations (`+`, `#`, `!`, `?`),
/// castling as `O-O`/`0-0`, and promotions with or without `=`.
pub fn parse_san(board: &Board, san: &str) -> Result<Move, SanError> {
    let cleaned = san
        .trim()
        .trim_end_matches(|c: char| matches!(c, '+' | '#' | '!' | '?'));
    if cleaned.is_empty() {
        return Err(SanError::InvalidFormat(san.to_string()));
    }

    match cleaned {
        "O-O" | "0-0" => return find_castle(board, true, san),
        "O-O-O" | "0-0-0" => return find_castle(board, false, san),
        _ => {}
    }

    let (piece, rest) = match cleaned.chars().next() {
        Some('K') => (Piece::King, &cleaned[1..]),
        Some('Q') => (Piece::Queen, &cleaned[1..]),
        Some('R') => (Piece::Rook, &cleaned[1..]),
        Some('B') => (Piece::Bishop, &cleaned[1..]),
        Some('N') => (Piece::Knight, &cleaned[1..]),
        _ => (Piece::Pawn, cleaned),
    };

    let (body, promotion) = split_promotion(rest, piece, san)?;
    let body: Vec<char> = body.chars().filter(|c| !matches!(c, 'x' | ':' | '-')).collect();
    if body.len() < 2 {
        return Err(SanError::InvalidFormat(san.to_string()));
    }

    let dest = Square::new(
        parse_file(body[body.len() - 2])?,
        parse_rank(body[body.len() - 1])?,
    );

    let mut from_file = None;
    let mut from_rank = None;
    for &c in &body[..body.len() - 2] {
        match c {
            'a'..='h' => from_file = Some(parse_file(c)?),
            '1'..='8' => from_rank = Some(parse_rank(c)?),
            _ => return Err(SanError::InvalidFormat(san.to_string())),
        }
    }

    let own = board.colors(board.side_to_move());
    let mut candidates = Vec::new();
    board.generate_moves(|moves| {
        if moves.piece != piece {
            return false;
        }
        for mv in moves {
            // Castling is encoded king-takes-own-rook; only reachable via O-O.
            if piece == Piece::King && own.has(mv.to) {
                continue;
            }
            if mv.to != dest || mv.promotion != promotion {
                continue;
            }
            if from_file.is_some_and(|f| mv.from.file() != f) {
                continue;
            }
            if from_rank.is_some_and(|r| mv.from.rank() != r) {
                continue;
            }
            candidates.push(mv);
        }
        false
    });

    match candidates.len() {
        0 => Err(SanError::NoLegalMove(san.to_string())),
        1 => Ok(candidates[0]),
        _ => Err(SanError::AmbiguousMove(san.to_string())),
    }
}

fn split_promotion<'a>(
    rest: &'a str,
    piece: Piece,
    san: &str,
) -> Result<(&'a str, Option<Piece>), SanError> {
    if let Some(idx) = rest.find('=') {
        let promo = rest[idx + 1..]
            .chars()
            .next()
            .ok_or_else(|| SanError::InvalidPromotion(san.to_string()))?;
        return Ok((&rest[..idx], Some(parse_promotion(promo, san)?)));
    }
    if piece == Piece::Pawn {
        if let Some(last) = rest.chars().last() {
            if matches!(last, 'Q' | 'R' | 'B' | 'N') {
                return Ok((&rest[..rest.len() - 1], Some(parse_promotion(last, san)?)));
            }
        }
    }
    Ok((rest, None))
}

fn parse_promotion(c: char, san: &str) -> Result<Piece, SanError> {
    match c.to_ascii_uppercase() {
        'Q' => Ok(Piece::Queen),
        'R' => Ok(Piece::Rook),
        'B' => Ok(Piece::Bishop),
        'N' => Ok(Piece::Knight),
        _ => Err(SanError::InvalidPromotion(san.to_string())),
    }
}

fn find_castle(board: &Board, kingside: bool, san: &str) -> Result<Move, SanError> {
    let own = board.colors(board.side_to_move());
    let mut found = None;
    board.generate_moves(|moves| {
        if moves.piece != Piece::King {
            return false;
        }
        for mv in moves {
            if !own.has(mv.to) {
                continue;
            }
            let to_right = (mv.to.file() as u8) > (mv.from.file() as u8);
            if to_right == kingside {
                found = Some(mv);
            }
        }
        found.is_some()
    });
    found.ok_or_else(|| SanError::NoLegalMove(san.to_string()))
}

fn parse_file(c: char) -> Result<File, SanError> {
    Ok(match c {
        'a' => File::A,
        'b' => File::B,
        'c' => File::C,
        'd' => File::D,
        'e' => File::E,
        'f' => File::F,
        'g' => File::G,
        'h' => File::H,
        _ => return Err(SanError::InvalidFile(c)),
    })
}

fn parse_rank(c: char) -> Result<Rank, SanError> {
    Ok(match c {
        '1' => Rank::First,
        '2' => Rank::Second,
        '3' => Rank::Third,
        '4' => Rank::Fourth,
        '5' => Rank::Fifth,
        '6' => Rank::Sixth,
        '7' => Rank::Seventh,
        '8' => Rank::Eighth,
        _ => return Err(SanError::InvalidRank(c)),
    })
}

#[derive(Debug, thiserror::Error)]
pub enum SanError {
    #[error("No legal move found for: {0}")]
    NoLegalMove(String),
    #[error("Ambiguous move: {0}")]
    AmbiguousMove(String),
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
    #[error("Invalid file: {0}")]
    InvalidFile(char),
    #[error("Invalid rank: {0}")]
    InvalidRank(char),
    #[error("Invalid promotion: {0}")]
    InvalidPromotion(String),
}
