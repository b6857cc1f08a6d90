use cozy_chess::{Color, Piece, Square};

use super::attack_map::{AttackMap, Attacker};
use super::detector::{TacticalContext, TacticalDetector};
use super::helpers::{piece_attacks, piece_value};
use super::tactical_types::{TacticalEvidence, TacticalTag, TacticalTagKind};

/// Combined value the forked pieces must reach.
const MIN_FORK_VALUE: u32 = 500;

/// A target is worth hitting when it is the king, outranks the attacker, or
/// is attacked more often than it is defended.
fn is_vulnerable(
    attacks: &AttackMap,
    attacker: Piece,
    target_sq: Square,
    target: Piece,
    mover: Color,
) -> bool {
    target == Piece::King
        || piece_value(target) > piece_value(attacker)
        || attacks.attacker_count(target_sq, mover) > attacks.attacker_count(target_sq, !mover)
}

/// Detects forks: the moved piece attacks two or more vulnerable enemy pieces
/// at once.
pub struct ForkDetector;

impl TacticalDetector for ForkDetector {
    fn detect(&self, ctx: &TacticalContext) -> Vec<TacticalTag> {
        let mover = ctx.side_to_move_before;
        let sq = ctx.mv.to;
        let Some(piece) = ctx.after.piece_on(sq) else {
            return vec![];
        };
        if !ctx.after.colors(mover).has(sq) {
            return vec![];
        }

        let attacks = piece_attacks(ctx.after, sq, piece, mover) & ctx.after.colors(!mover);
        let targets: Vec<(Square, Piece)> = attacks
            .into_iter()
            .filter_map(|target_sq| ctx.after.piece_on(target_sq).map(|p| (target_sq, p)))
            .filter(|(target_sq, target)| {
                is_vulnerable(ctx.after_attacks, piece, *target_sq, *target, mover)
            })
            .collect();

        let total: u32 = targets.iter().map(|(_, p)| u32::from(piece_value(*p))).sum();
        if targets.len() < 2 || total < MIN_FORK_VALUE {
            return vec![];
        }

        let has_king_target = targets.iter().any(|(_, p)| *p == Piece::King);
        let victims: Vec<String> = targets.iter().map(|(tsq, _)| tsq.to_string()).collect();

        vec![TacticalTag {
            kind: TacticalTagKind::Fork,
            attacker: Some(sq.to_string()),
            victims: victims.clone(),
            target_square: None,
            confidence: if has_king_target { 0.95 } else { 0.85 },
            note: Some(format!(
                "fork: {} on {} attacks {} pieces",
                piece,
                sq,
                targets.len()
            )),
            evidence: TacticalEvidence {
                lines: vec![],
                threatened_pieces: victims,
                defended_by: vec![],
            },
        }]
    }
}

/// Detects double attacks: one move creates new threats from at least two
/// different pieces against at least two different vulnerable targets.
pub struct DoubleAttackDetector;

impl TacticalDetector for DoubleAttackDetector {
    fn detect(&self, ctx: &TacticalContext) -> Vec<TacticalTag> {
        let mover = ctx.side_to_move_before;
        let enemy = !mover;

        let mut threats: Vec<(Attacker, Square)> = Vec::new();
        for target_sq in ctx.after.colors(enemy) {
            let Some(target) = ctx.after.piece_on(target_sq) else {
                continue;
            };
            for attacker in ctx.after_attacks.attackers_of(target_sq, mover) {
                let is_new = !ctx.before_attacks.attacks(attacker, target_sq, mover);
                if is_new
                    && is_vulnerable(ctx.after_attacks, attacker.piece, target_sq, target, mover)
                {
                    threats.push((attacker, target_sq));
                }
            }
        }

        // Two threats that share neither attacker nor target.
        let pair = threats.iter().enumerate().find_map(|(i, a)| {
            threats[i + 1..]
                .iter()
                .find(|b| a.0.from != b.0.from && a.1 != b.1)
                .map(|b| (*a, *b))
        });
        let Some((first, second)) = pair else {
            return vec![];
        };

        let victims = vec![first.1.to_string(), second.1.to_string()];
        vec![TacticalTag {
            kind: TacticalTagKind::DoubleAttack,
            attacker: Some(ctx.mv.to.to_string()),
            victims: victims.clone(),
            target_square: None,
            confidence: 0.7,
            note: Some(format!(
                "double attack: {} hits {} while {} hits {}",
                first.0.from, first.1, second.0.from, second.1
            )),
            evidence: TacticalEvidence {
                lines: vec![],
                threatened_pieces: victims,
                defended_by: vec![first.0.from.to_string(), second.0.from.to_string()],
            },
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board_analysis::detector::test_support::Fixture;

    #[test]
    fn detects_knight_fork_of_queen_and_rook() {
        // Nb5-c7 hits the rook on a8 and the queen on e6.
        let fixture = Fixture::new("r6k/8/4q3/1N6/8/8/8/6K1 w - - 0 1", "b5c7");
        let tags = ForkDetector.detect(&fixture.ctx());

        assert_eq!(tags.len(), 1);
        let fork = &tags[0];
        assert_eq!(fork.kind, TacticalTagKind::Fork);
        assert_eq!(fork.attacker.as_deref(), Some("c7"));
        assert!(fork.victims.contains(&"a8".to_string()));
        assert!(fork.victims.contains(&"e6".to_string()));
        assert_eq!(fork.confidence, 0.85);
    }

    #[test]
    fn royal_fork_has_higher_confidence() {
        // Nd5-f6+ hits the king on e8 and the rook on d7.
        let fixture = Fixture::new("4k3/3r4/8/3N4/8/8/8/4K3 w - - 0 1", "d5f6");
        let tags = ForkDetector.detect(&fixture.ctx());

        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].confidence, 0.95);
    }

    #[test]
    fn cheap_defended_targets_are_not_a_fork() {
        // Nc3-d5 hits pawns on c7 and e7, both defended by the king.
        let fixture = Fixture::new("3k4/2p1p3/8/8/8/2N5/8/4K3 w - - 0 1", "c3d5");
        assert!(ForkDetector.detect(&fixture.ctx()).is_empty());
    }

    #[test]
    fn single_target_is_not_a_fork() {
        let fixture = Fixture::new("4k3/2r5/8/8/1N6/8/8/4K3 w - - 0 1", "b4d5");
        assert!(ForkDetector.detect(&fixture.ctx()).is_empty());
    }

    #[test]
    fn detects_double_attack_from_two_pieces() {
        // Nc3-e4 attacks the d6 rook and unmasks the a1 bishop on the e5 queen.
        let fixture = Fixture::new("K6k/8/3r4/4q3/8/2N5/8/B7 w - - 0 1", "c3e4");
        let tags = DoubleAttackDetector.detect(&fixture.ctx());

        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].kind, TacticalTagKind::DoubleAttack);
        assert!(tags[0].victims.contains(&"d6".to_string()));
        assert!(tags[0].victims.contains(&"e5".to_string()));
    }

    #[test]
    fn single_attacker_is_not_a_double_attack() {
        let fixture = Fixture::new("r6k/8/4q3/1N6/8/8/8/6K1 w - - 0 1", "b5c7");
        assert!(DoubleAttackDetector.detect(&fixture.ctx()).is_empty());
    }
}
