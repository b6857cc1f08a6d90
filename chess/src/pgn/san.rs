use cozy_chess::{Board, File, GameStatus, Move, Piece, Rank, Square};

use crate::replay::legal_moves;
use crate::uci::{format_file, format_rank, format_square, is_castle, parse_file, parse_rank};

/// Parse Standard Algebraic Notation (SAN) move against `board`.
///
/// Check/mate markers and annotation glyphs (`+ # ! ?`) are ignored; `0-0`
/// is accepted for castling and the `=` before a promotion piece is optional.
pub fn parse_san(board: &Board, san: &str) -> Result<Move, SanError> {
    let text = san.trim().trim_end_matches(['+', '#', '!', '?']);
    if text.is_empty() {
        return Err(SanError::InvalidFormat(san.to_string()));
    }
    let legal = legal_moves(board);

    match text {
        "O-O" | "0-0" => return find_castle(board, &legal, true, san),
        "O-O-O" | "0-0-0" => return find_castle(board, &legal, false, san),
        _ => {}
    }

    let (body, promotion) = split_promotion(text)?;
    let (piece, rest) = match body.chars().next() {
        Some(c @ ('N' | 'B' | 'R' | 'Q' | 'K')) => (piece_from_letter(c), &body[1..]),
        Some(_) => (Piece::Pawn, body),
        None => return Err(SanError::InvalidFormat(san.to_string())),
    };
    let rest: String = rest.chars().filter(|c| *c != 'x' && *c != '-').collect();
    if rest.len() < 2 || !rest.is_ascii() {
        return Err(SanError::InvalidFormat(san.to_string()));
    }
    let (hint, dest) = rest.split_at(rest.len() - 2);
    let to = parse_dest(dest)?;

    let mut from_file = None;
    let mut from_rank = None;
    for c in hint.chars() {
        if let Some(f) = parse_file(c) {
            from_file = Some(f);
        } else if let Some(r) = parse_rank(c) {
            from_rank = Some(r);
        } else {
            return Err(SanError::InvalidFormat(san.to_string()));
        }
    }

    let candidates: Vec<Move> = legal
        .into_iter()
        .filter(|mv| {
            mv.to == to
                && mv.promotion == promotion
                && board.piece_on(mv.from) == Some(piece)
                && !is_castle(board, *mv)
                && from_file.map_or(true, |f| mv.from.file() == f)
                && from_rank.map_or(true, |r| mv.from.rank() == r)
        })
        .collect();

    match candidates.as_slice() {
        [mv] => Ok(*mv),
        [] => Err(SanError::NoLegalMove(san.to_string())),
        _ => Err(SanError::AmbiguousMove(san.to_string())),
    }
}

fn find_castle(board: &Board, legal: &[Move], short: bool, san: &str) -> Result<Move, SanError> {
    legal
        .iter()
        .copied()
        .find(|mv| is_castle(board, *mv) && ((mv.to.file() as u8 > mv.from.file() as u8) == short))
        .ok_or_else(|| SanError::NoLegalMove(san.to_string()))
}

fn split_promotion(text: &str) -> Result<(&str, Option<Piece>), SanError> {
    if let Some((body, promo)) = text.split_once('=') {
        let mut chars = promo.chars();
        return match (chars.next(), chars.next()) {
            (Some(c @ ('N' | 'B' | 'R' | 'Q')), None) => Ok((body, Some(piece_from_letter(c)))),
            _ => Err(SanError::InvalidPromotion(text.to_string())),
        };
    }
    // Bare form: "e8Q"
    let mut rev = text.chars().rev();
    match (rev.next(), rev.next()) {
        (Some(c @ ('N' | 'B' | 'R' | 'Q')), Some('1' | '8')) => {
            Ok((&text[..text.len() - 1], Some(piece_from_letter(c))))
        }
        _ => Ok((text, None)),
    }
}

fn parse_dest(dest: &str) -> Result<Square, SanError> {
    let mut chars = dest.chars();
    let (Some(f), Some(r)) = (chars.next(), chars.next()) else {
        return Err(SanError::InvalidSquare(dest.to_string()));
    };
    let file = parse_file(f).ok_or(SanError::InvalidFile(f))?;
    let rank = parse_rank(r).ok_or(SanError::InvalidRank(r))?;
    Ok(Square::new(file, rank))
}

fn piece_from_letter(c: char) -> Piece {
    match c {
        'N' => Piece::Knight,
        'B' => Piece::Bishop,
        'R' => Piece::Rook,
        'Q' => Piece::Queen,
        'K' => Piece::King,
        _ => Piece::Pawn,
    }
}

fn piece_letter(piece: Piece) -> &'static str {
    match piece {
        Piece::Pawn => "",
        Piece::Knight => "N",
        Piece::Bishop => "B",
        Piece::Rook => "R",
        Piece::Queen => "Q",
        Piece::King => "K",
    }
}

/// Format a legal move as SAN, including disambiguation and check markers.
pub fn format_san(board: &Board, mv: Move) -> String {
    let Some(piece) = board.piece_on(mv.from) else {
        return crate::uci::format_uci_move(mv);
    };

    let mut san = if is_castle(board, mv) {
        if mv.to.file() as u8 > mv.from.file() as u8 {
            "O-O".to_string()
        } else {
            "O-O-O".to_string()
        }
    } else {
        let capture = board.colors(!board.side_to_move()).has(mv.to)
            || (piece == Piece::Pawn && mv.from.file() != mv.to.file());
        let mut s = String::new();
        if piece == Piece::Pawn {
            if capture {
                s.push(format_file(mv.from.file()));
            }
        } else {
            s.push_str(piece_letter(piece));
            s.push_str(&disambiguation(board, mv, piece));
        }
        if capture {
            s.push('x');
        }
        s.push_str(&format_square(mv.to));
        if let Some(promo) = mv.promotion {
            s.push('=');
            s.push_str(piece_letter(promo));
        }
        s
    };

    let mut after = board.clone();
    after.play_unchecked(mv);
    if !after.checkers().is_empty() {
        san.push(if after.status() == GameStatus::Won {
            '#'
        } else {
            '+'
        });
    }
    san
}

fn disambiguation(board: &Board, mv: Move, piece: Piece) -> String {
    let rivals: Vec<Square> = legal_moves(board)
        .into_iter()
        .filter(|other| {
            other.to == mv.to
                && other.from != mv.from
                && board.piece_on(other.from) == Some(piece)
                && !is_castle(board, *other)
        })
        .map(|other| other.from)
        .collect();
    if rivals.is_empty() {
        return String::new();
    }
    let file: File = mv.from.file();
    let rank: Rank = mv.from.rank();
    if rivals.iter().all(|sq| sq.file() != file) {
        format_file(file).to_string()
    } else if rivals.iter().all(|sq| sq.rank() != rank) {
        format_rank(rank).to_string()
    } else {
        format_square(mv.from)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SanError {
    #[error("No legal move found for: {0}")]
    NoLegalMove(String),
    #[error("Ambiguous move: {0}")]
    AmbiguousMove(String),
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
    #[error("Invalid square: {0}")]
    InvalidSquare(String),
    #[error("Invalid file: {0}")]
    InvalidFile(char),
    #[error("Invalid rank: {0}")]
    InvalidRank(char),
    #[error("Invalid promotion: {0}")]
    InvalidPromotion(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uci::format_uci_move;

    fn board(fen: &str) -> Board {
        fen.parse().unwrap()
    }

    #[test]
    fn parses_pawn_and_piece_moves() {
        let b = Board::default();
        assert_eq!(format_uci_move(parse_san(&b, "e4").unwrap()), "e2e4");
        assert_eq!(format_uci_move(parse_san(&b, "Nf3").unwrap()), "g1f3");
        assert!(matches!(parse_san(&b, "e5"), Err(SanError::NoLegalMove(_))));
    }

    #[test]
    fn disambiguates_by_file_and_rank() {
        // Knights on b1 and f1 can both reach d2; rooks on a1 and a5 both reach a3.
        let b = board("4k3/8/8/R7/8/8/8/RN2KN2 w - - 0 1");
        assert!(matches!(parse_san(&b, "Nd2"), Err(SanError::AmbiguousMove(_))));
        assert_eq!(format_uci_move(parse_san(&b, "Nbd2").unwrap()), "b1d2");
        assert_eq!(format_uci_move(parse_san(&b, "R1a3").unwrap()), "a1a3");
        let mv = parse_san(&b, "Nfd2").unwrap();
        assert_eq!(format_san(&b, mv), "Nfd2");
        let rook = parse_san(&b, "R5a3").unwrap();
        assert_eq!(format_san(&b, rook), "R5a3");
    }

    #[test]
    fn promotion_forms() {
        let b = board("8/4P3/8/8/8/8/k7/4K3 w - - 0 1");
        let q = parse_san(&b, "e8=Q").unwrap();
        assert_eq!(q.promotion, Some(Piece::Queen));
        assert_eq!(parse_san(&b, "e8N").unwrap().promotion, Some(Piece::Knight));
        assert!(matches!(
            parse_san(&b, "e8=K"),
            Err(SanError::InvalidPromotion(_))
        ));
        assert_eq!(format_san(&b, q), "e8=Q");
    }

    #[test]
    fn castling_and_check_markers() {
        let b = board("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1");
        let short = parse_san(&b, "O-O").unwrap();
        assert_eq!(format_san(&b, short), "O-O");
        let long = parse_san(&b, "0-0-0").unwrap();
        assert_eq!(format_san(&b, long), "O-O-O");

        let mate = board("6k1/5ppp/8/8/8/8/8/R5K1 w - - 0 1");
        let mv = parse_san(&mate, "Ra8#").unwrap();
        assert_eq!(format_san(&mate, mv), "Ra8#");
        let check = board("6k1/8/8/8/8/8/8/R5K1 w - - 0 1");
        let mv = parse_san(&check, "Ra8").unwrap();
        assert_eq!(format_san(&check, mv), "Ra8+");
    }

    #[test]
    fn captures_are_marked() {
        let b = board("4k3/8/8/3p4/4P3/8/8/4K3 w - - 0 1");
        let mv = parse_san(&b, "exd5").unwrap();
        assert_eq!(format_san(&b, mv), "exd5");
        assert_eq!(format_uci_move(parse_san(&b, "ed5").unwrap()), "e4d5");
    }
}
