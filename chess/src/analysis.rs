//! Engine evaluation score shared by the evaluator, the cache and the classifier.

use serde::{Deserialize, Serialize};

/// Magnitude every mate score saturates to, in centipawns.
///
/// Mate distances are deliberately flattened: a mate in 1 and a mate in 12 are
/// the same fixed value, which keeps per-ply losses finite and bounded by
/// `2 * MATE_SCORE_CP`.
pub const MATE_SCORE_CP: i32 = 10_000;

/// Engine evaluation score.
///
/// Centipawns: positive = side-to-move is better.
/// Mate: positive N = side-to-move mates in N moves,
/// negative N = side-to-move gets mated in N moves,
/// zero = side-to-move is already checkmated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalysisScore {
    Centipawns(i32),
    Mate(i32),
}

impl AnalysisScore {
    pub fn display(&self) -> String {
        match self {
            Self::Centipawns(cp) => format!("{:+.2}", *cp as f64 / 100.0),
            Self::Mate(m) => {
                if *m > 0 {
                    format!("+M{}", m)
                } else {
                    format!("-M{}", m.abs())
                }
            }
        }
    }

    /// Convert to centipawns for comparison, saturating mates and runaway
    /// centipawn values to `±MATE_SCORE_CP`.
    pub fn to_cp(&self) -> i32 {
        match self {
            Self::Centipawns(cp) => (*cp).clamp(-MATE_SCORE_CP, MATE_SCORE_CP),
            Self::Mate(m) if *m > 0 => MATE_SCORE_CP,
            Self::Mate(_) => -MATE_SCORE_CP,
        }
    }

    pub fn is_mate(&self) -> bool {
        matches!(self, Self::Mate(_))
    }
}

/// Returns true if the given 1-indexed ply belongs to White.
/// Convention: odd plies (1, 3, 5, …) are White moves; even plies (2, 4, 6, …) are Black.
pub fn is_white_ply(ply: u32) -> bool {
    ply % 2 == 1
}

impl std::fmt::Display for AnalysisScore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}
