use cozy_chess::Piece;

use super::attack_map::PinInfo;
use super::detector::{TacticalContext, TacticalDetector};
use super::helpers::squares_between;
use super::tactical_types::{TacticalEvidence, TacticalLine, TacticalTag, TacticalTagKind};

/// Detects pins created by the move: a slider of the mover holds an enemy
/// piece in front of an equal or more valuable one, and the defender cannot
/// simply capture the pinner.
pub struct PinDetector;

impl TacticalDetector for PinDetector {
    fn detect(&self, ctx: &TacticalContext) -> Vec<TacticalTag> {
        let mover = ctx.side_to_move_before;
        let replies = chess::legal_moves(ctx.after);

        ctx.after_attacks
            .pins()
            .iter()
            .filter(|pin| ctx.after.colors(mover).has(pin.pinner.from))
            .filter(|pin| !ctx.before_attacks.pins().contains(pin))
            .filter(|pin| !replies.iter().any(|reply| reply.to == pin.pinner.from))
            .map(|pin| pin_to_tag(ctx, pin))
            .collect()
    }
}

fn pin_to_tag(ctx: &TacticalContext, pin: &PinInfo) -> TacticalTag {
    let is_absolute = ctx.after.piece_on(pin.pinned_to) == Some(Piece::King);

    let through: Vec<String> = squares_between(pin.pinner.from, pin.pinned_to)
        .into_iter()
        .filter(|sq| *sq != pin.pinned)
        .map(|sq| sq.to_string())
        .collect();

    TacticalTag {
        kind: TacticalTagKind::Pin,
        attacker: Some(pin.pinner.from.to_string()),
        victims: vec![pin.pinned.to_string()],
        target_square: Some(pin.pinned_to.to_string()),
        confidence: if is_absolute { 1.0 } else { 0.8 },
        note: Some(if is_absolute {
            format!("absolute pin: {} pins {} to king", pin.pinner.piece, pin.pinned)
        } else {
            format!(
                "relative pin: {} pins {} to {}",
                pin.pinner.piece, pin.pinned, pin.pinned_to
            )
        }),
        evidence: TacticalEvidence {
            lines: vec![TacticalLine {
                from: pin.pinner.from.to_string(),
                through,
                to: pin.pinned_to.to_string(),
            }],
            threatened_pieces: vec![pin.pinned.to_string()],
            defended_by: vec![],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board_analysis::detector::test_support::Fixture;

    #[test]
    fn queen_pins_knight_to_king() {
        // Qa2-e2 pins the e6 knight against the e8 king.
        let fixture = Fixture::new("4k3/8/4n3/8/8/8/Q7/6K1 w - - 0 1", "a2e2");
        let tags = PinDetector.detect(&fixture.ctx());

        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].kind, TacticalTagKind::Pin);
        assert_eq!(tags[0].attacker.as_deref(), Some("e2"));
        assert_eq!(tags[0].victims, vec!["e6"]);
        assert_eq!(tags[0].target_square.as_deref(), Some("e8"));
        assert_eq!(tags[0].confidence, 1.0);
        let line = &tags[0].evidence.lines[0];
        assert_eq!(line.through, vec!["e3", "e4", "e5", "e7"]);
    }

    #[test]
    fn capturable_pinner_is_not_a_pin() {
        // Same pin, but the h2 rook can take the queen on e2.
        let fixture = Fixture::new("4k3/8/4n3/8/8/8/Q6r/6K1 w - - 0 1", "a2e2");
        assert!(PinDetector.detect(&fixture.ctx()).is_empty());
    }

    #[test]
    fn existing_pin_is_not_reported_again() {
        // The a4 bishop already pins c6; a king move changes nothing.
        let fixture = Fixture::new("4k3/8/2n5/8/B7/8/8/4K3 w - - 0 1", "e1d1");
        assert!(PinDetector.detect(&fixture.ctx()).is_empty());
    }

    #[test]
    fn relative_pin_to_queen() {
        // Rb1-a1 lines up on the a5 knight with the queen behind it.
        let fixture = Fixture::new("q3k3/8/8/n7/8/8/8/1R2K3 w - - 0 1", "b1a1");
        let tags = PinDetector.detect(&fixture.ctx());

        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].confidence, 0.8);
        assert!(tags[0].note.as_ref().unwrap().contains("relative pin"));
    }
}
