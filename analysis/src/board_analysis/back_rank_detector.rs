use cozy_chess::{BitBoard, Board, Color, Piece, Square};

use super::attack_map::AttackMap;
use super::detector::{TacticalContext, TacticalDetector};
use super::helpers::home_rank;
use super::tactical_types::{TacticalEvidence, TacticalTag, TacticalTagKind};

/// Detects back-rank threats created by the move: the enemy king sits on its
/// home rank with fewer than two escape squares and a rook or queen of the
/// mover bears down on that rank.
pub struct BackRankDetector;

struct BackRankThreat {
    king: Square,
    escapes: usize,
    attackers: Vec<Square>,
}

impl TacticalDetector for BackRankDetector {
    fn detect(&self, ctx: &TacticalContext) -> Vec<TacticalTag> {
        let mover = ctx.side_to_move_before;
        if back_rank_threat(ctx.before, ctx.before_attacks, mover).is_some() {
            return vec![];
        }
        let Some(threat) = back_rank_threat(ctx.after, ctx.after_attacks, mover) else {
            return vec![];
        };

        let attackers: Vec<String> = threat.attackers.iter().map(|sq| sq.to_string()).collect();
        vec![TacticalTag {
            kind: TacticalTagKind::BackRankThreat,
            attacker: attackers.first().cloned(),
            victims: vec![threat.king.to_string()],
            target_square: Some(threat.king.to_string()),
            confidence: if threat.escapes == 0 { 0.85 } else { 0.7 },
            note: Some(format!(
                "back rank threat: {} king on {} has {} escape squares",
                chess::PieceColor::from(!mover),
                threat.king,
                threat.escapes
            )),
            evidence: TacticalEvidence {
                lines: vec![],
                threatened_pieces: vec![threat.king.to_string()],
                defended_by: attackers,
            },
        }]
    }
}

/// The threat `attacker` poses to the other side's back rank, if any.
fn back_rank_threat(board: &Board, attacks: &AttackMap, attacker: Color) -> Option<BackRankThreat> {
    let defender = !attacker;
    let king = board.king(defender);
    let rank = home_rank(defender);
    if king.rank() != rank {
        return None;
    }

    let rank_bb = rank.bitboard();
    let own = board.colors(defender);
    let escapes = (cozy_chess::get_king_moves(king) & !rank_bb & !own)
        .into_iter()
        .filter(|sq| !attacks.is_attacked(*sq, attacker))
        .count();
    if escapes >= 2 {
        return None;
    }

    let majors = (board.pieces(Piece::Rook) | board.pieces(Piece::Queen)) & board.colors(attacker);
    let attackers: Vec<Square> = majors
        .into_iter()
        .filter(|sq| {
            let lines: BitBoard = cozy_chess::get_rook_moves(*sq, board.occupied());
            !(lines & rank_bb).is_empty()
        })
        .collect();
    if attackers.is_empty() {
        return None;
    }

    Some(BackRankThreat {
        king,
        escapes,
        attackers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board_analysis::detector::test_support::Fixture;

    #[test]
    fn rook_swings_onto_open_file() {
        // Rb8-a8 opens the a-file onto the first rank; the g1 king is boxed in.
        let fixture = Fixture::new("1r5k/8/8/8/8/8/1P3PPP/6K1 b - - 0 1", "b8a8");
        let tags = BackRankDetector.detect(&fixture.ctx());

        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].kind, TacticalTagKind::BackRankThreat);
        assert_eq!(tags[0].target_square.as_deref(), Some("g1"));
        assert_eq!(tags[0].attacker.as_deref(), Some("a8"));
        assert_eq!(tags[0].confidence, 0.85);
    }

    #[test]
    fn luft_prevents_threat() {
        // Without the f2 pawn and with h3 played, the king can run to f2 or h2.
        let fixture = Fixture::new("1r5k/8/8/8/8/7P/1P4P1/6K1 b - - 0 1", "b8a8");
        assert!(BackRankDetector.detect(&fixture.ctx()).is_empty());
    }

    #[test]
    fn threat_already_present_is_not_repeated() {
        let fixture = Fixture::new("r6k/8/8/8/8/8/1P3PPP/6K1 b - - 0 1", "h8g8");
        assert!(BackRankDetector.detect(&fixture.ctx()).is_empty());
    }
}
