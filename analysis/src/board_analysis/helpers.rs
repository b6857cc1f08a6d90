use cozy_chess::{BitBoard, Board, Color, File, Piece, Rank, Square};

/// Returns all pieces of `color` that attack the given square.
pub fn attackers_of(board: &Board, sq: Square, color: Color) -> BitBoard {
    let occupied = board.occupied();
    let color_pieces = board.colors(color);

    let mut attackers = BitBoard::EMPTY;

    // A pawn of `color` attacks `sq` if a pawn of the other color on `sq` would attack it.
    attackers |= cozy_chess::get_pawn_attacks(sq, !color) & board.pieces(Piece::Pawn) & color_pieces;
    attackers |= cozy_chess::get_knight_moves(sq) & board.pieces(Piece::Knight) & color_pieces;

    let diagonal = board.pieces(Piece::Bishop) | board.pieces(Piece::Queen);
    attackers |= cozy_chess::get_bishop_moves(sq, occupied) & diagonal & color_pieces;

    let orthogonal = board.pieces(Piece::Rook) | board.pieces(Piece::Queen);
    attackers |= cozy_chess::get_rook_moves(sq, occupied) & orthogonal & color_pieces;

    attackers |= cozy_chess::get_king_moves(sq) & board.pieces(Piece::King) & color_pieces;

    attackers
}

/// Standard piece values in centipawns.
pub fn piece_value(piece: Piece) -> u16 {
    match piece {
        Piece::Pawn => 100,
        Piece::Knight => 320,
        Piece::Bishop => 330,
        Piece::Rook => 500,
        Piece::Queen => 900,
        Piece::King => 20000,
    }
}

/// Returns the attack bitboard for a specific piece on a square.
pub fn piece_attacks(board: &Board, sq: Square, piece: Piece, color: Color) -> BitBoard {
    match piece {
        Piece::Pawn => cozy_chess::get_pawn_attacks(sq, color),
        Piece::Knight => cozy_chess::get_knight_moves(sq),
        Piece::King => cozy_chess::get_king_moves(sq),
        slider => slider_attacks(sq, slider, board.occupied()),
    }
}

/// Squares a bishop, rook or queen on `sq` sees through `occupied`.
/// Empty for any other piece.
pub fn slider_attacks(sq: Square, piece: Piece, occupied: BitBoard) -> BitBoard {
    match piece {
        Piece::Bishop => cozy_chess::get_bishop_moves(sq, occupied),
        Piece::Rook => cozy_chess::get_rook_moves(sq, occupied),
        Piece::Queen => {
            cozy_chess::get_bishop_moves(sq, occupied) | cozy_chess::get_rook_moves(sq, occupied)
        }
        _ => BitBoard::EMPTY,
    }
}

pub const SLIDERS: [Piece; 3] = [Piece::Bishop, Piece::Rook, Piece::Queen];

/// Walks along the ray from `slider_sq` through `front_sq` and returns the first
/// piece behind `front_sq` if it belongs to `target_color`.
pub fn find_piece_behind(
    board: &Board,
    slider_sq: Square,
    front_sq: Square,
    target_color: Color,
) -> Option<Square> {
    let (dr, df) = direction(slider_sq, front_sq)?;

    let mut r = front_sq.rank() as i8 + dr;
    let mut f = front_sq.file() as i8 + df;

    while (0..8).contains(&r) && (0..8).contains(&f) {
        let sq = Square::new(File::try_index(f as usize)?, Rank::try_index(r as usize)?);
        if board.occupied().has(sq) {
            return board.colors(target_color).has(sq).then_some(sq);
        }
        r += dr;
        f += df;
    }

    None
}

/// Squares strictly between two aligned squares.
pub fn squares_between(from: Square, to: Square) -> Vec<Square> {
    let Some((dr, df)) = direction(from, to) else {
        return Vec::new();
    };
    let mut squares = Vec::new();
    let mut r = from.rank() as i8 + dr;
    let mut f = from.file() as i8 + df;
    while (r, f) != (to.rank() as i8, to.file() as i8) {
        let (Some(file), Some(rank)) = (File::try_index(f as usize), Rank::try_index(r as usize))
        else {
            break;
        };
        squares.push(Square::new(file, rank));
        r += dr;
        f += df;
    }
    squares
}

/// Unit step from `from` towards `to`, if the squares share a line.
fn direction(from: Square, to: Square) -> Option<(i8, i8)> {
    let dr = to.rank() as i8 - from.rank() as i8;
    let df = to.file() as i8 - from.file() as i8;
    let aligned = dr == 0 || df == 0 || dr.abs() == df.abs();
    if (dr == 0 && df == 0) || !aligned {
        return None;
    }
    Some((dr.signum(), df.signum()))
}

pub fn home_rank(color: Color) -> Rank {
    match color {
        Color::White => Rank::First,
        Color::Black => Rank::Eighth,
    }
}
