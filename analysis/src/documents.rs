//! Versioned output documents handed to report renderers.

use chess::{GameRecord, Outcome, PieceColor, Termination, TimeControlClass};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::classifier::{ClassifiedGame, MoveRecord, TacticalSummary};
use crate::openings::resolve_opening_code;

/// Bumped on any incompatible change to a document's shape.
pub const SCHEMA_VERSION: u32 = 1;

/// A serialisable document carrying a `schema_version` field.
pub trait VersionedDocument: Serialize + DeserializeOwned {
    const KIND: &'static str;

    fn schema_version(&self) -> u32;
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("{kind} has schema version {found}, expected {expected}")]
    SchemaVersionMismatch {
        kind: &'static str,
        found: u32,
        expected: u32,
    },
    #[error("malformed document: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Deserialize)]
struct Header {
    #[serde(default)]
    schema_version: u32,
}

/// Decode a document, refusing any schema version but the current one.
pub fn decode_document<T: VersionedDocument>(json: &str) -> Result<T, DocumentError> {
    let header: Header = serde_json::from_str(json)?;
    if header.schema_version != SCHEMA_VERSION {
        return Err(DocumentError::SchemaVersionMismatch {
            kind: T::KIND,
            found: header.schema_version,
            expected: SCHEMA_VERSION,
        });
    }
    Ok(serde_json::from_str(json)?)
}

pub fn encode_document<T: VersionedDocument>(document: &T) -> Result<String, DocumentError> {
    Ok(serde_json::to_string_pretty(document)?)
}

/// Per-game analysis: every ply's record plus accuracy and motif counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameAnalysis {
    pub schema_version: u32,
    pub game_id: String,
    /// Version of the evaluator whose scores produced the losses.
    pub evaluator_version: String,
    pub player_color: PieceColor,
    pub opponent: Option<String>,
    pub opening_code: String,
    pub outcome: Outcome,
    pub termination: Termination,
    pub timestamp: i64,
    pub time_control: TimeControlClass,
    pub moves: Vec<MoveRecord>,
    pub white_accuracy: Option<f64>,
    pub black_accuracy: Option<f64>,
    pub tactical_summary: TacticalSummary,
    pub degraded_plies: u32,
}

impl GameAnalysis {
    pub fn new(game: &GameRecord, evaluator_version: &str, classified: ClassifiedGame) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            game_id: game.id.clone(),
            evaluator_version: evaluator_version.to_string(),
            player_color: game.player_color,
            opponent: game.opponent.clone(),
            opening_code: resolve_opening_code(game.opening_code.as_deref(), &game.moves),
            outcome: game.outcome(),
            termination: game.termination,
            timestamp: game.timestamp,
            time_control: game.time_control,
            moves: classified.moves,
            white_accuracy: classified.white_accuracy,
            black_accuracy: classified.black_accuracy,
            tactical_summary: classified.tactical_summary,
            degraded_plies: classified.degraded_plies,
        }
    }

    pub fn accuracy_for(&self, color: PieceColor) -> Option<f64> {
        match color {
            PieceColor::White => self.white_accuracy,
            PieceColor::Black => self.black_accuracy,
        }
    }

    pub fn player_accuracy(&self) -> Option<f64> {
        self.accuracy_for(self.player_color)
    }

    pub fn player_moves(&self) -> impl Iterator<Item = &MoveRecord> {
        self.moves.iter().filter(move |m| m.mover == self.player_color)
    }

    /// Plies where the player made a mistake or blunder.
    pub fn player_error_plies(&self) -> Vec<u32> {
        self.player_moves()
            .filter(|m| m.classification.is_error())
            .map(|m| m.ply)
            .collect()
    }

    pub fn lost_on_time(&self) -> bool {
        self.outcome == Outcome::Loss && self.termination == Termination::Timeout
    }

    /// Whether this document can stand in for a fresh analysis of `game_id`
    /// under `evaluator_version`. A document with unevaluated plies never can.
    pub fn is_current(&self, game_id: &str, evaluator_version: &str) -> bool {
        self.schema_version == SCHEMA_VERSION
            && self.game_id == game_id
            && self.evaluator_version == evaluator_version
            && self.degraded_plies == 0
    }
}

impl VersionedDocument for GameAnalysis {
    const KIND: &'static str = "game_analysis";

    fn schema_version(&self) -> u32 {
        self.schema_version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{classify_game, MoveClassification, PositionScore};
    use crate::openings::OpeningReport;
    use chess::{AnalysisScore, GameResult};

    fn record() -> GameRecord {
        GameRecord {
            id: "g1".into(),
            moves: vec!["e4".into(), "c5".into()],
            result: GameResult::BlackWins,
            termination: Termination::Timeout,
            player_color: PieceColor::White,
            opponent: Some("rival".into()),
            opening_code: None,
            timestamp: 1_700_000_000,
            time_control: TimeControlClass::Bullet,
            clocks_ms: Vec::new(),
            player_rating: Some(1500),
        }
    }

    fn analysis() -> GameAnalysis {
        let game = record();
        let positions = chess::replay(&game.moves).unwrap();
        let scores: Vec<_> = [30, 90, 40]
            .into_iter()
            .map(|cp| Some(PositionScore::new(AnalysisScore::Centipawns(cp))))
            .collect();
        GameAnalysis::new(&game, "fake-1", classify_game(&positions, &scores, &[]))
    }

    #[test]
    fn built_from_record_and_classification() {
        let doc = analysis();
        assert_eq!(doc.opening_code, "Sicilian Defense");
        assert_eq!(doc.outcome, Outcome::Loss);
        assert!(doc.lost_on_time());
        // 30 before, -90 after for white.
        assert_eq!(doc.moves[0].centipawn_loss, Some(120));
        assert_eq!(doc.moves[0].classification, MoveClassification::Mistake);
        assert_eq!(doc.player_error_plies(), vec![1]);
        assert!(doc.player_accuracy().unwrap() < 100.0);
        assert!(doc.is_current("g1", "fake-1"));
        assert!(!doc.is_current("g1", "fake-2"));
        assert!(!doc.is_current("g2", "fake-1"));
    }

    #[test]
    fn degraded_documents_are_never_current() {
        let game = record();
        let positions = chess::replay(&game.moves).unwrap();
        let scores = vec![Some(PositionScore::new(AnalysisScore::Centipawns(30))), None, None];
        let doc = GameAnalysis::new(&game, "fake-1", classify_game(&positions, &scores, &[]));

        assert_eq!(doc.degraded_plies, 2);
        assert!(!doc.is_current("g1", "fake-1"));
    }

    #[test]
    fn document_round_trips_through_json() {
        let doc = analysis();
        let json = encode_document(&doc).unwrap();
        let back: GameAnalysis = decode_document(&json).unwrap();
        assert_eq!(back.game_id, doc.game_id);
        assert_eq!(back.moves, doc.moves);
        assert_eq!(back.tactical_summary, doc.tactical_summary);
        assert!(back.player_accuracy().is_some());
    }

    #[test]
    fn other_schema_versions_are_rejected() {
        let mut doc = analysis();
        doc.schema_version = SCHEMA_VERSION + 1;
        let json = serde_json::to_string(&doc).unwrap();
        match decode_document::<GameAnalysis>(&json) {
            Err(DocumentError::SchemaVersionMismatch { kind, found, expected }) => {
                assert_eq!(kind, "game_analysis");
                assert_eq!(found, SCHEMA_VERSION + 1);
                assert_eq!(expected, SCHEMA_VERSION);
            }
            other => panic!("expected mismatch, got {other:?}"),
        }

        let missing = r#"{"rating_band": 1600, "buckets": []}"#;
        assert!(matches!(
            decode_document::<OpeningReport>(missing),
            Err(DocumentError::SchemaVersionMismatch { found: 0, .. })
        ));
    }

    #[test]
    fn garbage_is_a_json_error() {
        assert!(matches!(
            decode_document::<GameAnalysis>("not json"),
            Err(DocumentError::Json(_))
        ));
    }
}
