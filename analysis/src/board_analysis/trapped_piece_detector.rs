use cozy_chess::{Color, Piece, Square};

use super::detector::{TacticalContext, TacticalDetector};
use super::helpers::piece_value;
use super::tactical_types::{TacticalEvidence, TacticalTag, TacticalTagKind};

/// Detects pieces the move traps: an enemy knight, bishop, rook or queen is
/// newly attacked, cannot simply be held by its defenders, and every legal
/// move it has lands on an attacked square without winning its value back.
pub struct TrappedPieceDetector;

impl TacticalDetector for TrappedPieceDetector {
    fn detect(&self, ctx: &TacticalContext) -> Vec<TacticalTag> {
        let mover = ctx.side_to_move_before;
        let enemy = !mover;
        // In check every reply is forced; nothing is trapped by this move alone.
        if !ctx.after.checkers().is_empty() {
            return vec![];
        }
        let replies = chess::legal_moves(ctx.after);

        let mut tags = Vec::new();
        for sq in ctx.after.colors(enemy) {
            let Some(piece) = ctx.after.piece_on(sq) else {
                continue;
            };
            if matches!(piece, Piece::Pawn | Piece::King) {
                continue;
            }
            // A pinned piece is reported as a pin.
            if ctx.after_attacks.pins().iter().any(|pin| pin.pinned == sq) {
                continue;
            }
            let value = piece_value(piece);

            let Some(hunter) = ctx
                .after_attacks
                .attackers_of(sq, mover)
                .filter(|a| !ctx.before_attacks.attacks(*a, sq, mover))
                .min_by_key(|a| piece_value(a.piece))
            else {
                continue;
            };
            let outnumbered =
                ctx.after_attacks.attacker_count(sq, mover) > ctx.after_attacks.attacker_count(sq, enemy);
            if piece_value(hunter.piece) >= value && !outnumbered {
                continue;
            }

            let exits: Vec<Square> = replies.iter().filter(|r| r.from == sq).map(|r| r.to).collect();
            if exits.iter().any(|to| is_safe_landing(ctx, *to, value, mover)) {
                continue;
            }

            let covered: Vec<String> = exits.iter().map(|to| to.to_string()).collect();
            tags.push(TacticalTag {
                kind: TacticalTagKind::TrappedPiece,
                attacker: Some(hunter.from.to_string()),
                victims: vec![sq.to_string()],
                target_square: Some(sq.to_string()),
                confidence: if exits.is_empty() { 0.85 } else { 0.75 },
                note: Some(format!(
                    "trapped piece: {} on {} has {} exits, all covered",
                    piece,
                    sq,
                    exits.len()
                )),
                evidence: TacticalEvidence {
                    lines: vec![],
                    threatened_pieces: vec![sq.to_string()],
                    defended_by: covered,
                },
            });
        }
        tags
    }
}

/// Whether a piece worth `value` can move to `to` without losing material.
fn is_safe_landing(ctx: &TacticalContext, to: Square, value: u16, mover: Color) -> bool {
    let regained = ctx.after.piece_on(to).map_or(0, piece_value);
    regained >= value || !ctx.after_attacks.is_attacked(to, mover)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board_analysis::detector::test_support::Fixture;

    // Knight in the corner: b3 is covered by the a2 pawn, c2 by the king.
    const CORNERED_KNIGHT: &str = "8/7k/8/8/8/8/P2K1B2/n7 w - - 0 1";

    #[test]
    fn bishop_seals_cornered_knight() {
        let fixture = Fixture::new(CORNERED_KNIGHT, "f2d4");
        let tags = TrappedPieceDetector.detect(&fixture.ctx());

        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].kind, TacticalTagKind::TrappedPiece);
        assert_eq!(tags[0].attacker.as_deref(), Some("d4"));
        assert_eq!(tags[0].target_square.as_deref(), Some("a1"));
    }

    #[test]
    fn knight_with_a_safe_exit_is_not_trapped() {
        // Without the a2 pawn the knight escapes to b3.
        let fixture = Fixture::new("8/7k/8/8/8/8/3K1B2/n7 w - - 0 1", "f2d4");
        assert!(TrappedPieceDetector.detect(&fixture.ctx()).is_empty());
    }

    #[test]
    fn pinned_piece_is_left_to_the_pin() {
        let fixture = Fixture::new("4k3/8/4n3/8/8/8/Q7/6K1 w - - 0 1", "a2e2");
        assert!(TrappedPieceDetector.detect(&fixture.ctx()).is_empty());
    }

    #[test]
    fn existing_attack_is_not_reported_again() {
        // The bishop already eyes a1; a king move changes nothing.
        let fixture = Fixture::new("8/7k/8/8/3B4/8/P2K4/n7 w - - 0 1", "d2d3");
        assert!(TrappedPieceDetector.detect(&fixture.ctx()).is_empty());
    }
}
