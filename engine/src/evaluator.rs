//! The Position Evaluator contract the analysis pipeline consumes.

use std::future::Future;

use chess::{AnalysisScore, Position};
use serde::{Deserialize, Serialize};

/// An engine's verdict on one canonical position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionEvaluation {
    pub fingerprint: String,
    /// Side-to-move oriented.
    pub score: AnalysisScore,
    /// UCI notation, castling as the king's two-square move.
    pub best_move: Option<String>,
    pub depth: Option<u8>,
}

impl PositionEvaluation {
    /// Moves to mate, when the score is a mate score.
    pub fn mate_in(&self) -> Option<i32> {
        match self.score {
            AnalysisScore::Mate(m) => Some(m),
            AnalysisScore::Centipawns(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvaluationError {
    #[error("evaluation timed out after {after_ms} ms")]
    Timeout { after_ms: u64 },
    #[error("evaluator unavailable: {0}")]
    Unavailable(String),
}

/// Scores positions. Implementations may be slow, remote or flaky; callers
/// bound each call with their own timeout and retry policy.
///
/// Returns `impl Future + Send` rather than `async fn` so that the futures can
/// be driven from spawned tokio tasks.
pub trait PositionEvaluator: Send + Sync {
    /// Identifies the evaluator and its settings. Cached evaluations are only
    /// reused under the same version.
    fn version(&self) -> &str;

    fn evaluate(
        &self,
        position: &Position,
    ) -> impl Future<Output = Result<PositionEvaluation, EvaluationError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mate_distance_is_exposed() {
        let eval = PositionEvaluation {
            fingerprint: "fp".into(),
            score: AnalysisScore::Mate(-3),
            best_move: None,
            depth: Some(20),
        };
        assert_eq!(eval.mate_in(), Some(-3));

        let eval = PositionEvaluation {
            score: AnalysisScore::Centipawns(12),
            ..eval
        };
        assert_eq!(eval.mate_in(), None);
    }

    #[test]
    fn evaluation_serializes_for_the_cache_snapshot() {
        let eval = PositionEvaluation {
            fingerprint: "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq -".into(),
            score: AnalysisScore::Centipawns(25),
            best_move: Some("e2e4".into()),
            depth: Some(16),
        };
        let json = serde_json::to_string(&eval).unwrap();
        let back: PositionEvaluation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, eval);
    }

    #[test]
    fn errors_describe_themselves() {
        assert_eq!(
            EvaluationError::Timeout { after_ms: 500 }.to_string(),
            "evaluation timed out after 500 ms"
        );
    }
}
