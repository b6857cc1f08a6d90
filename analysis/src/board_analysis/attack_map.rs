use cozy_chess::{BitBoard, Board, Color, Piece, Square};
use smallvec::SmallVec;

use super::helpers::{attackers_of, piece_value, slider_attacks, SLIDERS};

/// A piece of one side that bears on some square.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attacker {
    pub from: Square,
    pub piece: Piece,
}

/// A slider lined up on an enemy piece with a more (or equally) valuable
/// piece of the same color behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinInfo {
    pub pinner: Attacker,
    pub pinned: Square,
    pub pinned_to: Square,
}

type Pins = SmallVec<[PinInfo; 4]>;

/// Who attacks what in one position, for both colors, plus its pins.
///
/// Stored target-first: for every square, the set of squares whose piece
/// attacks it. Detectors mostly ask "who hits this square", so that lookup
/// is a single index.
#[derive(Debug, Clone)]
pub struct AttackMap {
    coverage: [[BitBoard; Square::NUM]; Color::NUM],
    occupants: [Option<Piece>; Square::NUM],
    pins: Pins,
}

impl AttackMap {
    pub fn compute(board: &Board) -> Self {
        let mut coverage = [[BitBoard::EMPTY; Square::NUM]; Color::NUM];
        let mut occupants = [None; Square::NUM];
        for sq in Square::ALL {
            occupants[sq as usize] = board.piece_on(sq);
            for color in Color::ALL {
                coverage[color as usize][sq as usize] = attackers_of(board, sq, color);
            }
        }

        Self {
            coverage,
            occupants,
            pins: xray_pins(board),
        }
    }

    /// Squares holding a `color` piece that attacks `sq`.
    pub fn attacker_squares(&self, sq: Square, color: Color) -> BitBoard {
        self.coverage[color as usize][sq as usize]
    }

    pub fn attackers_of(&self, sq: Square, color: Color) -> impl Iterator<Item = Attacker> + '_ {
        self.attacker_squares(sq, color)
            .into_iter()
            .filter_map(|from| self.occupants[from as usize].map(|piece| Attacker { from, piece }))
    }

    pub fn attacker_count(&self, sq: Square, color: Color) -> usize {
        self.attacker_squares(sq, color).len() as usize
    }

    pub fn is_attacked(&self, sq: Square, by: Color) -> bool {
        !self.attacker_squares(sq, by).is_empty()
    }

    /// Least valuable `color` piece attacking `sq`.
    pub fn cheapest_attacker(&self, sq: Square, color: Color) -> Option<Attacker> {
        self.attackers_of(sq, color).min_by_key(|a| piece_value(a.piece))
    }

    /// Whether this exact piece, on this square, attacks `target`.
    pub fn attacks(&self, attacker: Attacker, target: Square, color: Color) -> bool {
        self.attacker_squares(target, color).has(attacker.from)
            && self.occupants[attacker.from as usize] == Some(attacker.piece)
    }

    pub fn pins(&self) -> &[PinInfo] {
        &self.pins
    }
}

/// Pins found by lifting each enemy piece a slider hits and looking at what
/// the slider sees through it. The king is never the front piece.
fn xray_pins(board: &Board) -> Pins {
    let occupied = board.occupied();
    let mut pins = Pins::new();

    for color in Color::ALL {
        let enemy = board.colors(!color);
        for piece in SLIDERS {
            for from in board.pieces(piece) & board.colors(color) {
                let seen = slider_attacks(from, piece, occupied);
                for front in seen & enemy {
                    let Some(front_piece) = board.piece_on(front).filter(|p| *p != Piece::King) else {
                        continue;
                    };
                    // Lifting one piece only opens the ray through it.
                    let revealed = slider_attacks(from, piece, occupied ^ front.bitboard()) & !seen;
                    let Some(behind) = (revealed & enemy).into_iter().next() else {
                        continue;
                    };
                    let Some(rear_piece) = board.piece_on(behind) else {
                        continue;
                    };
                    if piece_value(rear_piece) >= piece_value(front_piece) {
                        pins.push(PinInfo {
                            pinner: Attacker { from, piece },
                            pinned: front,
                            pinned_to: behind,
                        });
                    }
                }
            }
        }
    }

    pins
}
