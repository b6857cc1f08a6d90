use cozy_chess::GameStatus;

use super::detector::{TacticalContext, TacticalDetector};
use super::tactical_types::{TacticalEvidence, TacticalTag, TacticalTagKind};

/// Tags a move that gives check, or mate when the opponent has no reply.
pub struct CheckDetector;

impl TacticalDetector for CheckDetector {
    fn detect(&self, ctx: &TacticalContext) -> Vec<TacticalTag> {
        let checkers = ctx.after.checkers();
        if checkers.is_empty() {
            return vec![];
        }

        let king = ctx.after.king(!ctx.side_to_move_before).to_string();
        let checkers: Vec<String> = checkers.into_iter().map(|sq| sq.to_string()).collect();
        let mate = ctx.after.status() == GameStatus::Won;
        let (kind, note) = match (mate, checkers.len()) {
            (true, _) => (TacticalTagKind::Checkmate, "checkmate".to_string()),
            (false, 1) => (TacticalTagKind::Check, format!("check from {}", checkers[0])),
            (false, n) => (TacticalTagKind::Check, format!("double check from {n} pieces")),
        };

        vec![TacticalTag {
            kind,
            attacker: checkers.first().cloned(),
            victims: vec![king.clone()],
            target_square: Some(king.clone()),
            confidence: 1.0,
            note: Some(note),
            evidence: TacticalEvidence {
                lines: vec![],
                threatened_pieces: vec![king],
                defended_by: checkers,
            },
        }]
    }
}
