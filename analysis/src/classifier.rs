//! Per-ply centipawn loss, quality classification and game accuracy.
//!
//! Classification runs as two passes over the same position sequence that
//! meet in one [`PlyAnnotation`] per ply: the evaluation pass fills in the
//! mover-oriented scores and loss, the tactical pass adds tactical tags
//! (using those scores for sacrifices). Only then is a ply's classification
//! decided, so the "brilliant" override never has to reach back into either
//! pass.

use std::collections::BTreeMap;

use chess::{AnalysisScore, PieceColor, Position};
use serde::{Deserialize, Serialize};

use crate::board_analysis::{detect_move_tactics, TacticalTag, TacticalTagKind};

/// Highest loss still counted as excellent.
pub const EXCELLENT_MAX_LOSS: u32 = 10;
pub const INACCURACY_LOSS: u32 = 50;
pub const MISTAKE_LOSS: u32 = 100;
pub const BLUNDER_LOSS: u32 = 300;
/// Decay constant of the accuracy curve.
pub const ACCURACY_DECAY: f64 = 0.006;

/// Classification of a move's quality relative to the engine's view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveClassification {
    /// A sound sacrifice that gave up nothing on the board's evaluation.
    Brilliant,
    /// Within 10 cp of the engine's expectation.
    Excellent,
    /// Under 50 cp lost.
    Good,
    /// 50-99 cp lost.
    Inaccuracy,
    /// 100-299 cp lost.
    Mistake,
    /// 300+ cp lost.
    Blunder,
    /// An evaluation around this ply was unavailable.
    Unknown,
}

impl MoveClassification {
    /// Classify based on centipawn loss.
    pub fn from_cp_loss(cp_loss: u32) -> Self {
        match cp_loss {
            l if l >= BLUNDER_LOSS => Self::Blunder,
            l if l >= MISTAKE_LOSS => Self::Mistake,
            l if l >= INACCURACY_LOSS => Self::Inaccuracy,
            l if l > EXCELLENT_MAX_LOSS => Self::Good,
            _ => Self::Excellent,
        }
    }

    pub fn is_error(self) -> bool {
        matches!(self, Self::Mistake | Self::Blunder)
    }
}

/// Engine verdict on one position, side-to-move oriented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionScore {
    pub score: AnalysisScore,
    pub best_move: Option<String>,
}

impl PositionScore {
    pub fn new(score: AnalysisScore) -> Self {
        Self {
            score,
            best_move: None,
        }
    }
}

/// Shared per-ply record the evaluation and tactical passes write into.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlyAnnotation {
    pub ply: u32,
    /// Mover-oriented score before the move.
    pub eval_before: Option<i32>,
    /// Mover-oriented score after the move.
    pub eval_after: Option<i32>,
    pub centipawn_loss: Option<u32>,
    pub tactics: Vec<TacticalTag>,
}

/// Everything known about one ply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveRecord {
    pub ply: u32,
    pub mover: PieceColor,
    pub san: String,
    pub uci: String,
    pub eval_before: Option<i32>,
    pub eval_after: Option<i32>,
    /// Engine's preferred move in the position before this one.
    pub best_move: Option<String>,
    pub centipawn_loss: Option<u32>,
    pub classification: MoveClassification,
    #[serde(default)]
    pub tactics: Vec<TacticalTag>,
    pub primary_tactic: Option<TacticalTagKind>,
    /// Mover's remaining clock after the move.
    #[serde(default)]
    pub clock_ms: Option<u64>,
}

/// Motif counts per side over one game.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TacticalSummary {
    pub white: BTreeMap<TacticalTagKind, u32>,
    pub black: BTreeMap<TacticalTagKind, u32>,
}

impl TacticalSummary {
    pub fn for_side(&self, color: PieceColor) -> &BTreeMap<TacticalTagKind, u32> {
        match color {
            PieceColor::White => &self.white,
            PieceColor::Black => &self.black,
        }
    }

    fn record(&mut self, color: PieceColor, kind: TacticalTagKind) {
        let side = match color {
            PieceColor::White => &mut self.white,
            PieceColor::Black => &mut self.black,
        };
        *side.entry(kind).or_insert(0) += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedGame {
    pub moves: Vec<MoveRecord>,
    pub white_accuracy: Option<f64>,
    pub black_accuracy: Option<f64>,
    pub tactical_summary: TacticalSummary,
    /// Plies whose loss could not be computed.
    pub degraded_plies: u32,
}

/// Pass one: mover-oriented evaluations and loss per ply.
///
/// `scores[i]` belongs to `positions[i]`; `None` marks a degraded evaluation.
pub fn evaluation_pass(positions: &[Position], scores: &[Option<PositionScore>]) -> Vec<PlyAnnotation> {
    (1..positions.len())
        .map(|i| {
            // The position before the move already has the mover to play; the
            // one after has the opponent to play, so its score flips sign.
            let eval_before = scores.get(i - 1).and_then(|s| s.as_ref()).map(|s| s.score.to_cp());
            let eval_after = scores.get(i).and_then(|s| s.as_ref()).map(|s| -s.score.to_cp());
            let centipawn_loss = match (eval_before, eval_after) {
                (Some(before), Some(after)) => Some((before - after).max(0) as u32),
                _ => None,
            };
            PlyAnnotation {
                ply: i as u32,
                eval_before,
                eval_after,
                centipawn_loss,
                tactics: Vec::new(),
            }
        })
        .collect()
}

/// Pass two: tactical tags per ply. Needs no evaluations, but uses them for
/// sacrifices when the first pass found them.
pub fn tactical_pass(positions: &[Position], annotations: &mut [PlyAnnotation]) {
    for (annotation, pair) in annotations.iter_mut().zip(positions.windows(2)) {
        annotation.tactics = detect_move_tactics(
            &pair[0],
            &pair[1],
            annotation.eval_before,
            annotation.eval_after,
        );
    }
}

/// Decide a ply's classification from its finished annotation.
pub fn classify(annotation: &PlyAnnotation) -> MoveClassification {
    let Some(loss) = annotation.centipawn_loss else {
        return MoveClassification::Unknown;
    };
    let sacrificed = annotation
        .tactics
        .iter()
        .any(|t| t.kind == TacticalTagKind::Sacrifice);
    if sacrificed && loss <= EXCELLENT_MAX_LOSS {
        MoveClassification::Brilliant
    } else {
        MoveClassification::from_cp_loss(loss)
    }
}

/// Accuracy from a side's per-ply losses: `100 * exp(-0.006 * mean_loss)`.
///
/// Exactly 100 when every loss is zero and strictly decreasing in each loss.
/// `None` when there is nothing to average.
pub fn compute_accuracy<I>(losses: I) -> Option<f64>
where
    I: IntoIterator<Item = u32>,
{
    let (count, total) = losses
        .into_iter()
        .fold((0u32, 0f64), |(n, sum), loss| (n + 1, sum + f64::from(loss)));
    if count == 0 {
        return None;
    }
    let mean = total / f64::from(count);
    Some(100.0 * (-ACCURACY_DECAY * mean).exp())
}

/// Accuracy of one side over evaluated plies only.
pub fn side_accuracy(moves: &[MoveRecord], color: PieceColor) -> Option<f64> {
    compute_accuracy(
        moves
            .iter()
            .filter(|m| m.mover == color)
            .filter_map(|m| m.centipawn_loss),
    )
}

/// Run both passes over a replayed game and build its move records.
///
/// `clocks_ms[i]` is the clock after ply `i + 1`.
pub fn classify_game(
    positions: &[Position],
    scores: &[Option<PositionScore>],
    clocks_ms: &[Option<u64>],
) -> ClassifiedGame {
    let mut annotations = evaluation_pass(positions, scores);
    tactical_pass(positions, &mut annotations);

    let mut summary = TacticalSummary::default();
    let mut degraded_plies = 0;
    let mut moves = Vec::with_capacity(annotations.len());

    for (annotation, position) in annotations.into_iter().zip(positions.iter().skip(1)) {
        let Some(played) = position.last_move() else {
            continue;
        };
        let classification = classify(&annotation);
        if classification == MoveClassification::Unknown {
            degraded_plies += 1;
        }
        for tag in &annotation.tactics {
            summary.record(played.mover, tag.kind);
        }
        let idx = annotation.ply as usize - 1;
        moves.push(MoveRecord {
            ply: annotation.ply,
            mover: played.mover,
            san: played.san.clone(),
            uci: played.uci.clone(),
            eval_before: annotation.eval_before,
            eval_after: annotation.eval_after,
            best_move: scores
                .get(idx)
                .and_then(|s| s.as_ref())
                .and_then(|s| s.best_move.clone()),
            centipawn_loss: annotation.centipawn_loss,
            classification,
            primary_tactic: annotation.tactics.first().map(|t| t.kind),
            tactics: annotation.tactics,
            clock_ms: clocks_ms.get(idx).copied().flatten(),
        });
    }

    ClassifiedGame {
        white_accuracy: side_accuracy(&moves, PieceColor::White),
        black_accuracy: side_accuracy(&moves, PieceColor::Black),
        moves,
        tactical_summary: summary,
        degraded_plies,
    }
}
