use cozy_chess::Piece;

use super::detector::{TacticalContext, TacticalDetector};
use super::helpers::piece_value;
use super::tactical_types::{TacticalEvidence, TacticalTag, TacticalTagKind};

/// How far the mover's evaluation may drop for material given up to still
/// count as compensated.
pub const SACRIFICE_TOLERANCE_CP: i32 = 50;

/// Detects sacrifices: the moved piece is left en prise for less than it is
/// worth, yet the evaluation holds.
pub struct SacrificeDetector;

impl TacticalDetector for SacrificeDetector {
    fn detect(&self, ctx: &TacticalContext) -> Vec<TacticalTag> {
        let (Some(eval_before), Some(eval_after)) = (ctx.eval_before, ctx.eval_after) else {
            return vec![];
        };

        let mover = ctx.side_to_move_before;
        let enemy = !mover;
        let mv = ctx.mv;

        let Some(moving_piece) = ctx.before.piece_on(mv.from) else {
            return vec![];
        };
        // Castling lands the king on its own rook in cozy-chess notation.
        if moving_piece == Piece::King || ctx.before.colors(mover).has(mv.to) {
            return vec![];
        }
        let Some(landed) = ctx.after.piece_on(mv.to) else {
            return vec![];
        };

        let Some(cheapest_attacker) = ctx
            .after_attacks
            .cheapest_attacker(mv.to, enemy)
            .map(|a| piece_value(a.piece))
        else {
            return vec![];
        };

        let value = piece_value(landed);
        let captured_value = ctx
            .before
            .piece_on(mv.to)
            .filter(|_| ctx.before.colors(enemy).has(mv.to))
            .map_or(0, piece_value);

        let en_prise = cheapest_attacker < value
            || ctx.after_attacks.attacker_count(mv.to, enemy) > ctx.after_attacks.attacker_count(mv.to, mover);
        if !en_prise || value <= captured_value {
            return vec![];
        }

        let eval_delta = eval_after - eval_before;
        if eval_delta < -SACRIFICE_TOLERANCE_CP {
            return vec![];
        }

        vec![TacticalTag {
            kind: TacticalTagKind::Sacrifice,
            attacker: Some(mv.to.to_string()),
            victims: vec![],
            target_square: Some(mv.to.to_string()),
            confidence: 0.6,
            note: Some(format!(
                "sacrifice: {} to {} (eval change: {}cp)",
                moving_piece, mv.to, eval_delta
            )),
            evidence: TacticalEvidence {
                lines: vec![],
                threatened_pieces: vec![mv.to.to_string()],
                defended_by: ctx
                    .after_attacks
                    .attackers_of(mv.to, mover)
                    .map(|d| d.from.to_string())
                    .collect(),
            },
        }]
    }
}
