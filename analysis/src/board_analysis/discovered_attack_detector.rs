use cozy_chess::Piece;

use super::attack_map::Attacker;
use super::detector::{TacticalContext, TacticalDetector};
use super::helpers::{piece_value, squares_between, SLIDERS};
use super::tactical_types::{TacticalEvidence, TacticalLine, TacticalTag, TacticalTagKind};

/// Detects discovered attacks: a piece moves out of the way and a stationary
/// slider behind it now attacks an enemy piece it could not reach before.
pub struct DiscoveredAttackDetector;

impl TacticalDetector for DiscoveredAttackDetector {
    fn detect(&self, ctx: &TacticalContext) -> Vec<TacticalTag> {
        let mover = ctx.side_to_move_before;
        let enemy = !mover;
        let moving_piece = ctx.before.piece_on(ctx.mv.from).unwrap_or(Piece::Pawn);
        let mut tags = Vec::new();

        for slider_piece in SLIDERS {
            let sliders = ctx.after.pieces(slider_piece) & ctx.after.colors(mover);
            for slider_sq in sliders {
                // The revealed piece must not have moved itself (this also
                // rules out the rook of a castling move).
                let stationary = ctx.before.piece_on(slider_sq) == Some(slider_piece)
                    && ctx.before.colors(mover).has(slider_sq);
                if slider_sq == ctx.mv.to || !stationary {
                    continue;
                }
                let attacker = Attacker {
                    from: slider_sq,
                    piece: slider_piece,
                };

                for target_sq in ctx.after.colors(enemy) {
                    let Some(target_piece) = ctx.after.piece_on(target_sq) else {
                        continue;
                    };
                    if target_piece == Piece::Pawn
                        || !ctx.after_attacks.attacks(attacker, target_sq, mover)
                        || ctx.before_attacks.attacks(attacker, target_sq, mover)
                    {
                        continue;
                    }

                    let confidence = if piece_value(target_piece) >= piece_value(Piece::Rook) {
                        0.8
                    } else {
                        0.65
                    };
                    let through = squares_between(slider_sq, target_sq)
                        .into_iter()
                        .map(|sq| sq.to_string())
                        .collect();

                    tags.push(TacticalTag {
                        kind: TacticalTagKind::DiscoveredAttack,
                        attacker: Some(slider_sq.to_string()),
                        victims: vec![target_sq.to_string()],
                        target_square: Some(target_sq.to_string()),
                        confidence,
                        note: Some(format!(
                            "discovered attack: {} moves, revealing {} attack on {}",
                            moving_piece, slider_piece, target_sq
                        )),
                        evidence: TacticalEvidence {
                            lines: vec![TacticalLine {
                                from: slider_sq.to_string(),
                                through,
                                to: target_sq.to_string(),
                            }],
                            threatened_pieces: vec![target_sq.to_string()],
                            defended_by: vec![],
                        },
                    });
                }
            }
        }

        tags
    }
}
