use std::collections::HashMap;

use cozy_chess::{Color, Move};

use super::san::{parse_san, SanError};
use crate::fen::{format_fen, fullmove_number, parse_fen, FenError};
use crate::types::PieceColor;

/// A parsed PGN game
#[derive(Debug, Clone)]
pub struct PgnGame {
    pub tags: HashMap<String, String>,
    pub start_fen: String,
    pub moves: Vec<PgnMove>,
    pub result: GameResult,
}

/// A single move in PGN with metadata
#[derive(Debug, Clone)]
pub struct PgnMove {
    pub mv: Move,
    pub san: String,
    pub mover: PieceColor,
    /// Full-move number this move belongs to (1. e4 e5 are both move 1).
    pub move_number: u32,
    pub fen_before: String,
    pub fen_after: String,
    pub comment: Option<String>,
    pub nags: Vec<u8>, // Numeric Annotation Glyphs (!!, ?, etc.)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameResult {
    WhiteWins,
    BlackWins,
    Draw,
    Ongoing,
}

impl GameResult {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "1-0" => Some(Self::WhiteWins),
            "0-1" => Some(Self::BlackWins),
            "1/2-1/2" => Some(Self::Draw),
            "*" => Some(Self::Ongoing),
            _ => None,
        }
    }
}

impl PgnGame {
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags.get(name).map(String::as_str)
    }

    /// Moves played by one side, in game order.
    pub fn moves_by(&self, color: PieceColor) -> impl Iterator<Item = &PgnMove> {
        self.moves.iter().filter(move |m| m.mover == color)
    }
}

/// Parse a PGN string into a game.
///
/// Only the main line is kept: variations are skipped, comments attach to the
/// preceding move. Every SAN token is resolved against the running position,
/// so a returned game is always legal from its start position.
pub fn parse_pgn(input: &str) -> Result<PgnGame, PgnError> {
    let mut tags = HashMap::new();
    let mut movetext = String::new();
    let mut in_header = true;

    for line in input.lines() {
        let trimmed = line.trim();
        if in_header && trimmed.starts_with('[') {
            let (key, value) = parse_tag(trimmed)?;
            tags.insert(key, value);
            continue;
        }
        if trimmed.is_empty() && movetext.is_empty() {
            continue;
        }
        in_header = false;
        movetext.push_str(line);
        movetext.push('\n');
    }

    if tags.is_empty() && movetext.trim().is_empty() {
        return Err(PgnError::InvalidFormat);
    }

    let start_fen = tags
        .get("FEN")
        .cloned()
        .unwrap_or_else(|| crate::fen::STARTING_FEN.to_string());
    let mut board = parse_fen(&start_fen)?;
    let mut move_number = fullmove_number(&start_fen);

    let mut moves: Vec<PgnMove> = Vec::new();
    let mut result = tags
        .get("Result")
        .and_then(|r| GameResult::from_token(r))
        .unwrap_or(GameResult::Ongoing);

    for token in tokenize(&movetext)? {
        match token {
            Token::Comment(text) => {
                if let Some(last) = moves.last_mut() {
                    let text = text.trim().to_string();
                    last.comment = match last.comment.take() {
                        Some(prev) => Some(format!("{} {}", prev, text)),
                        None => Some(text),
                    };
                }
            }
            Token::Nag(nag) => {
                if let Some(last) = moves.last_mut() {
                    last.nags.push(nag);
                }
            }
            Token::Word(word) => {
                if let Some(r) = GameResult::from_token(&word) {
                    result = r;
                    continue;
                }
                let san = strip_move_number(&word)
                    .trim_end_matches(|c: char| matches!(c, '!' | '?'));
                if san.is_empty() {
                    continue;
                }

                let mv = parse_san(&board, san).map_err(|source| PgnError::IllegalMove {
                    ply: moves.len() + 1,
                    san: san.to_string(),
                    source,
                })?;

                let mover = board.side_to_move();
                let fen_before = format_fen(&board);
                board.play_unchecked(mv);

                moves.push(PgnMove {
                    mv,
                    san: san.to_string(),
                    mover: mover.into(),
                    move_number,
                    fen_before,
                    fen_after: format_fen(&board),
                    comment: None,
                    nags: vec![],
                });

                if mover == Color::Black {
                    move_number += 1;
                }
            }
        }
    }

    Ok(PgnGame {
        tags,
        start_fen,
        moves,
        result,
    })
}

fn parse_tag(line: &str) -> Result<(String, String), PgnError> {
    let inner = line
        .strip_prefix('[')
        .and_then(|l| l.strip_suffix(']'))
        .ok_or_else(|| PgnError::InvalidTag(line.to_string()))?;
    let (key, rest) = inner
        .trim()
        .split_once(char::is_whitespace)
        .ok_or_else(|| PgnError::InvalidTag(line.to_string()))?;
    let value = rest
        .trim()
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .ok_or_else(|| PgnError::InvalidTag(line.to_string()))?;
    Ok((key.to_string(), value.replace("\\\"", "\"")))
}

/// "12." / "12..." / "12.e4" -> "" / "" / "e4"
fn strip_move_number(word: &str) -> &str {
    let after_digits = word.trim_start_matches(|c: char| c.is_ascii_digit());
    if after_digits.len() == word.len() {
        return word;
    }
    match after_digits.strip_prefix('.') {
        Some(rest) => rest.trim_start_matches('.'),
        // Bare number with no dot: not a move.
        None if after_digits.is_empty() => "",
        None => word,
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Token {
    Word(String),
    Comment(String),
    Nag(u8),
}

fn tokenize(text: &str) -> Result<Vec<Token>, PgnError> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    let mut word = String::new();
    let mut variation_depth = 0usize;

    fn flush(word: &mut String, tokens: &mut Vec<Token>, depth: usize) {
        if !word.is_empty() {
            if depth == 0 {
                tokens.push(Token::Word(std::mem::take(word)));
            } else {
                word.clear();
            }
        }
    }

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                flush(&mut word, &mut tokens, variation_depth);
                let mut comment = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    comment.push(c);
                }
                if !closed {
                    return Err(PgnError::UnterminatedComment);
                }
                if variation_depth == 0 {
                    tokens.push(Token::Comment(comment));
                }
            }
            ';' => {
                flush(&mut word, &mut tokens, variation_depth);
                let comment: String = chars.by_ref().take_while(|c| *c != '\n').collect();
                if variation_depth == 0 {
                    tokens.push(Token::Comment(comment));
                }
            }
            '(' => {
                flush(&mut word, &mut tokens, variation_depth);
                variation_depth += 1;
            }
            ')' => {
                flush(&mut word, &mut tokens, variation_depth);
                variation_depth = variation_depth
                    .checked_sub(1)
                    .ok_or(PgnError::UnbalancedVariation)?;
            }
            '$' => {
                flush(&mut word, &mut tokens, variation_depth);
                let mut digits = String::new();
                while let Some(d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                    digits.push(*d);
                    chars.next();
                }
                if variation_depth == 0 {
                    if let Ok(nag) = digits.parse() {
                        tokens.push(Token::Nag(nag));
                    }
                }
            }
            c if c.is_whitespace() => flush(&mut word, &mut tokens, variation_depth),
            c => word.push(c),
        }
    }
    flush(&mut word, &mut tokens, variation_depth);

    if variation_depth != 0 {
        return Err(PgnError::UnbalancedVariation);
    }
    Ok(tokens)
}

#[derive(Debug, thiserror::Error)]
pub enum PgnError {
    #[error("Invalid PGN format")]
    InvalidFormat,
    #[error("Invalid tag: {0}")]
    InvalidTag(String),
    #[error("Invalid start position: {0}")]
    InvalidFen(#[from] FenError),
    #[error("Unterminated comment")]
    UnterminatedComment,
    #[error("Unbalanced variation parentheses")]
    UnbalancedVariation,
    #[error("Illegal move at ply {ply} ({san}): {source}")]
    IllegalMove {
        ply: usize,
        san: String,
        #[source]
        source: SanError,
    },
}
