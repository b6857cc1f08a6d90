use cozy_chess::{Board, Color, Piece, Square};

use super::detector::{TacticalContext, TacticalDetector};
use super::helpers::{find_piece_behind, piece_attacks, piece_value, squares_between, SLIDERS};
use super::tactical_types::{TacticalEvidence, TacticalLine, TacticalTag, TacticalTagKind};

/// Detects skewers: a sliding piece attacks a valuable enemy piece with a
/// cheaper enemy piece behind it on the same line. The front piece has to
/// move and the rear one falls.
pub struct SkewerDetector;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Skewer {
    slider: Square,
    slider_piece: Piece,
    front: Square,
    back: Square,
}

impl TacticalDetector for SkewerDetector {
    fn detect(&self, ctx: &TacticalContext) -> Vec<TacticalTag> {
        let mover = ctx.side_to_move_before;
        let existing = find_skewers(ctx.before, mover);

        find_skewers(ctx.after, mover)
            .into_iter()
            .filter(|skewer| !existing.contains(skewer))
            .map(|skewer| {
                let is_king_skewer = ctx.after.piece_on(skewer.front) == Some(Piece::King);
                let through: Vec<String> = squares_between(skewer.slider, skewer.back)
                    .into_iter()
                    .filter(|sq| *sq != skewer.front)
                    .map(|sq| sq.to_string())
                    .collect();
                TacticalTag {
                    kind: TacticalTagKind::Skewer,
                    attacker: Some(skewer.slider.to_string()),
                    victims: vec![skewer.front.to_string(), skewer.back.to_string()],
                    target_square: Some(skewer.back.to_string()),
                    confidence: if is_king_skewer { 0.9 } else { 0.75 },
                    note: Some(format!(
                        "skewer: {} attacks {} through to {}",
                        skewer.slider_piece, skewer.front, skewer.back
                    )),
                    evidence: TacticalEvidence {
                        lines: vec![TacticalLine {
                            from: skewer.slider.to_string(),
                            through,
                            to: skewer.back.to_string(),
                        }],
                        threatened_pieces: vec![skewer.front.to_string(), skewer.back.to_string()],
                        defended_by: vec![],
                    },
                }
            })
            .collect()
    }
}

fn find_skewers(board: &Board, color: Color) -> Vec<Skewer> {
    let enemy = !color;
    let mut skewers = Vec::new();

    for slider_piece in SLIDERS {
        let sliders = board.pieces(slider_piece) & board.colors(color);

        for slider in sliders {
            let attacks = piece_attacks(board, slider, slider_piece, color);

            for front in attacks & board.colors(enemy) {
                let Some(front_piece) = board.piece_on(front) else {
                    continue;
                };
                let Some(back) = find_piece_behind(board, slider, front, enemy) else {
                    continue;
                };
                let Some(back_piece) = board.piece_on(back) else {
                    continue;
                };

                // The mirror image of a pin: the front piece is worth more.
                if front_piece == Piece::King || piece_value(front_piece) > piece_value(back_piece)
                {
                    skewers.push(Skewer {
                        slider,
                        slider_piece,
                        front,
                        back,
                    });
                }
            }
        }
    }

    skewers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board_analysis::detector::test_support::Fixture;

    #[test]
    fn rook_skewers_king_to_queen() {
        // Ra1-e1+ drives the e4 king off the file and wins the e8 queen.
        let fixture = Fixture::new("4q3/8/8/8/4k3/8/8/R6K w - - 0 1", "a1e1");
        let tags = SkewerDetector.detect(&fixture.ctx());

        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].kind, TacticalTagKind::Skewer);
        assert_eq!(tags[0].victims, vec!["e4", "e8"]);
        assert_eq!(tags[0].confidence, 0.9);
        assert_eq!(
            tags[0].evidence.lines[0].through,
            vec!["e2", "e3", "e5", "e6", "e7"]
        );
    }

    #[test]
    fn bishop_skewers_queen_to_rook() {
        // Be2-b5 with nothing behind the c6 queen is only an attack.
        let fixture = Fixture::new("7k/8/2q5/8/8/8/4B3/6K1 w - - 0 1", "e2b5");
        assert!(SkewerDetector.detect(&fixture.ctx()).is_empty());

        // With the d7 rook behind it, the queen is skewered.
        let fixture = Fixture::new("7k/3r4/2q5/8/8/8/4B3/6K1 w - - 0 1", "e2b5");
        let tags = SkewerDetector.detect(&fixture.ctx());
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].victims, vec!["c6", "d7"]);
        assert_eq!(tags[0].confidence, 0.75);
    }

    #[test]
    fn existing_skewer_is_not_reported_again() {
        // The b5 bishop already skewers c6/d7; a king move changes nothing.
        let fixture = Fixture::new("7k/3r4/2q5/1B6/8/8/8/6K1 w - - 0 1", "g1f1");
        assert!(SkewerDetector.detect(&fixture.ctx()).is_empty());
    }
}
