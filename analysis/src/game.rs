//! Game records supplied by the fetching layer, plus result/termination normalisation.

use chess::{PgnGame, PieceColor};
use serde::{Deserialize, Serialize};

/// One game as delivered by the game-fetching collaborator. Read-only for the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRecord {
    pub pgn: String,
    #[serde(default)]
    pub url: String,
    pub player_color: PieceColor,
    /// Chess.com-style result for the analysed player ("win", "resigned", "agreed", ...).
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub termination: Option<String>,
    #[serde(default)]
    pub player_rating: Option<u32>,
    #[serde(default)]
    pub opponent_rating: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerResult {
    Win,
    Loss,
    Draw,
}

impl PlayerResult {
    pub fn from_result_code(code: &str) -> Self {
        match code.trim().to_ascii_lowercase().as_str() {
            "win" => Self::Win,
            "checkmated" | "timeout" | "resigned" | "abandoned" | "lose" => Self::Loss,
            _ => Self::Draw,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    Checkmate,
    Timeout,
    Resignation,
    Abandoned,
    Agreement,
    Repetition,
    InsufficientMaterial,
    Stalemate,
    Other,
}

impl Termination {
    /// Classify free-text termination such as "Black won by resignation" or
    /// "Game drawn by timeout vs insufficient material".
    pub fn classify(text: &str) -> Self {
        let text = text.to_ascii_lowercase();
        // Draw reasons first: "timeout vs insufficient material" is not a timeout loss.
        if text.contains("insufficient") {
            Self::InsufficientMaterial
        } else if text.contains("stalemate") {
            Self::Stalemate
        } else if text.contains("repetition") {
            Self::Repetition
        } else if text.contains("agree") {
            Self::Agreement
        } else if text.contains("checkmate") {
            Self::Checkmate
        } else if text.contains("resign") {
            Self::Resignation
        } else if text.contains("abandon") {
            Self::Abandoned
        } else if text.contains("time") {
            Self::Timeout
        } else {
            Self::Other
        }
    }
}

impl GameRecord {
    pub fn player_result(&self) -> PlayerResult {
        PlayerResult::from_result_code(&self.result)
    }

    /// Termination from the record, falling back to the PGN `Termination` tag.
    pub fn termination(&self, pgn: Option<&PgnGame>) -> Termination {
        self.termination
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| pgn.and_then(|g| g.tag("Termination")))
            .map(Termination::classify)
            .unwrap_or(Termination::Other)
    }

    /// True for losses ended by the player resigning. Timeouts and abandonments never count.
    pub fn lost_by_resignation(&self, termination: Termination) -> bool {
        if self.player_result() != PlayerResult::Loss {
            return false;
        }
        let code = self.result.trim().to_ascii_lowercase();
        if matches!(code.as_str(), "timeout" | "abandoned")
            || matches!(termination, Termination::Timeout | Termination::Abandoned)
        {
            return false;
        }
        code == "resigned" || termination == Termination::Resignation
    }
}
