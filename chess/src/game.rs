//! Game records as supplied by a game source.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::analysis::is_white_ply;
use crate::pgn::PgnGame;
use crate::types::PieceColor;

/// Declared result of a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameResult {
    #[serde(rename = "1-0")]
    WhiteWins,
    #[serde(rename = "0-1")]
    BlackWins,
    #[serde(rename = "1/2-1/2")]
    Draw,
}

/// Result from the analysed player's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Win,
    Loss,
    Draw,
}

impl GameResult {
    pub fn outcome_for(self, color: PieceColor) -> Outcome {
        match (self, color) {
            (Self::Draw, _) => Outcome::Draw,
            (Self::WhiteWins, PieceColor::White) | (Self::BlackWins, PieceColor::Black) => {
                Outcome::Win
            }
            _ => Outcome::Loss,
        }
    }
}

/// How a game ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    Checkmate,
    Resignation,
    Timeout,
    Abandoned,
    Stalemate,
    Agreement,
    Repetition,
    InsufficientMaterial,
    FiftyMoveRule,
    #[default]
    Other,
}

impl Termination {
    /// Classify a free-text termination ("Time forfeit", "alice won on time",
    /// "Game drawn by repetition", "resigned", ...).
    pub fn from_description(text: &str) -> Self {
        let t = text.to_ascii_lowercase();
        if t.contains("time") || t.contains("timeout") {
            Self::Timeout
        } else if t.contains("checkmate") {
            Self::Checkmate
        } else if t.contains("resign") {
            Self::Resignation
        } else if t.contains("abandon") {
            Self::Abandoned
        } else if t.contains("stalemate") {
            Self::Stalemate
        } else if t.contains("agree") {
            Self::Agreement
        } else if t.contains("repetition") {
            Self::Repetition
        } else if t.contains("insufficient") {
            Self::InsufficientMaterial
        } else if t.contains("50") || t.contains("fifty") {
            Self::FiftyMoveRule
        } else {
            Self::Other
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Checkmate => "checkmate",
            Self::Resignation => "resignation",
            Self::Timeout => "timeout",
            Self::Abandoned => "abandoned",
            Self::Stalemate => "stalemate",
            Self::Agreement => "agreement",
            Self::Repetition => "repetition",
            Self::InsufficientMaterial => "insufficient_material",
            Self::FiftyMoveRule => "fifty_move_rule",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeControlClass {
    Bullet,
    Blitz,
    Rapid,
    Classical,
    Daily,
    #[default]
    Unknown,
}

impl TimeControlClass {
    /// Classify a PGN `TimeControl` tag by estimated duration
    /// (base + 40 × increment seconds).
    pub fn from_tag(tag: &str) -> Self {
        let tag = tag.trim();
        if tag == "-" || tag.contains('/') {
            return Self::Daily;
        }
        let mut parts = tag.split('+');
        let base = parts.next().and_then(|b| b.parse::<u64>().ok());
        let inc = parts.next().map_or(Some(0), |i| i.parse::<u64>().ok());
        match (base, inc) {
            (Some(base), Some(inc)) => match base + 40 * inc {
                0..=179 => Self::Bullet,
                180..=479 => Self::Blitz,
                480..=1499 => Self::Rapid,
                _ => Self::Classical,
            },
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bullet => "bullet",
            Self::Blitz => "blitz",
            Self::Rapid => "rapid",
            Self::Classical => "classical",
            Self::Daily => "daily",
            Self::Unknown => "unknown",
        }
    }
}

/// One completed game of the analysed player. Immutable once ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    pub id: String,
    /// Moves in SAN (UCI accepted as a fallback).
    pub moves: Vec<String>,
    pub result: GameResult,
    #[serde(default)]
    pub termination: Termination,
    pub player_color: PieceColor,
    #[serde(default)]
    pub opponent: Option<String>,
    /// Declared ECO or opening code.
    #[serde(default)]
    pub opening_code: Option<String>,
    /// Unix seconds (UTC).
    pub timestamp: i64,
    #[serde(default)]
    pub time_control: TimeControlClass,
    /// Remaining clock after each ply, index 0 = ply 1.
    #[serde(default)]
    pub clocks_ms: Vec<Option<u64>>,
    #[serde(default)]
    pub player_rating: Option<u32>,
}

impl GameRecord {
    pub fn outcome(&self) -> Outcome {
        self.result.outcome_for(self.player_color)
    }

    pub fn lost_on_time(&self) -> bool {
        self.outcome() == Outcome::Loss && self.termination == Termination::Timeout
    }

    /// Whether the 1-indexed ply was played by the analysed player.
    pub fn is_player_ply(&self, ply: u32) -> bool {
        is_white_ply(ply) == (self.player_color == PieceColor::White)
    }

    /// Clock remaining after the given 1-indexed ply.
    pub fn clock_after_ply(&self, ply: u32) -> Option<u64> {
        let idx = (ply as usize).checked_sub(1)?;
        self.clocks_ms.get(idx).copied().flatten()
    }

    /// Clock the mover had when starting to think about the given ply: their
    /// reading after their previous move.
    pub fn clock_before_ply(&self, ply: u32) -> Option<u64> {
        if ply <= 2 {
            return None;
        }
        self.clock_after_ply(ply - 2)
    }

    /// Build a record from a parsed PGN game, seen from `username`'s side.
    pub fn from_pgn(id: &str, pgn: &PgnGame, username: &str) -> Result<Self, GameImportError> {
        let result = pgn
            .result
            .or_else(|| match pgn.tag("Result") {
                Some("1-0") => Some(GameResult::WhiteWins),
                Some("0-1") => Some(GameResult::BlackWins),
                Some("1/2-1/2") => Some(GameResult::Draw),
                _ => None,
            })
            .ok_or(GameImportError::MissingResult)?;

        let white = pgn.tag("White").unwrap_or_default();
        let black = pgn.tag("Black").unwrap_or_default();
        let player_color = if white.eq_ignore_ascii_case(username) {
            PieceColor::White
        } else if black.eq_ignore_ascii_case(username) {
            PieceColor::Black
        } else {
            return Err(GameImportError::UnknownPlayer(username.to_string()));
        };
        let (opponent, rating_tag) = match player_color {
            PieceColor::White => (black, "WhiteElo"),
            PieceColor::Black => (white, "BlackElo"),
        };

        Ok(Self {
            id: id.to_string(),
            moves: pgn.moves.clone(),
            result,
            termination: pgn
                .tag("Termination")
                .map(Termination::from_description)
                .unwrap_or_default(),
            player_color,
            opponent: (!opponent.is_empty()).then(|| opponent.to_string()),
            opening_code: pgn
                .tag("ECO")
                .filter(|eco| !eco.is_empty() && *eco != "?")
                .map(str::to_string),
            timestamp: pgn_timestamp(pgn).unwrap_or(0),
            time_control: pgn
                .tag("TimeControl")
                .map(TimeControlClass::from_tag)
                .unwrap_or_default(),
            clocks_ms: pgn.clocks_ms.clone(),
            player_rating: pgn.tag(rating_tag).and_then(|r| r.parse().ok()),
        })
    }
}

fn pgn_timestamp(pgn: &PgnGame) -> Option<i64> {
    let date = pgn.tag("UTCDate").or_else(|| pgn.tag("Date"))?;
    let date = NaiveDate::parse_from_str(date, "%Y.%m.%d").ok()?;
    let time = pgn
        .tag("UTCTime")
        .and_then(|t| NaiveTime::parse_from_str(t, "%H:%M:%S").ok())
        .unwrap_or_default();
    Some(date.and_time(time).and_utc().timestamp())
}

#[derive(Debug, thiserror::Error)]
pub enum GameImportError {
    #[error("game has no result")]
    MissingResult,
    #[error("player {0} did not play this game")]
    UnknownPlayer(String),
}
