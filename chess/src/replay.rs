//! Board replay: turns a recorded move list into the sequence of positions it
//! passes through.

use cozy_chess::{Board, GameStatus, Move};

use crate::analysis::AnalysisScore;
use crate::fen::{fingerprint_fen, format_fen, parse_fen, FenError};
use crate::pgn::{format_san, parse_san};
use crate::types::PieceColor;
use crate::uci::{convert_uci_castling_to_cozy, format_uci_standard, parse_uci_move};

/// The move that produced a position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayedMove {
    /// 1-indexed ply number.
    pub ply: u32,
    pub mover: PieceColor,
    /// Notation exactly as recorded in the source.
    pub notation: String,
    /// Normalised SAN generated from the board.
    pub san: String,
    /// Standard UCI (castling written as the king's two-square move).
    pub uci: String,
    pub mv: Move,
}

/// A canonical board state. Never mutated after creation.
#[derive(Debug, Clone)]
pub struct Position {
    board: Board,
    fen: String,
    fingerprint: String,
    last_move: Option<PlayedMove>,
}

impl Position {
    /// The standard starting position.
    pub fn start() -> Self {
        Self::from_board(Board::default())
    }

    pub fn from_fen(fen: &str) -> Result<Self, FenError> {
        Ok(Self::from_board(parse_fen(fen)?))
    }

    pub fn from_board(board: Board) -> Self {
        Self::build(board, None)
    }

    fn build(board: Board, last_move: Option<PlayedMove>) -> Self {
        let fen = format_fen(&board);
        let fingerprint = fingerprint_fen(&fen);
        Self {
            board,
            fen,
            fingerprint,
            last_move,
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn fen(&self) -> &str {
        &self.fen
    }

    /// Cache key: FEN without the move counters.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn last_move(&self) -> Option<&PlayedMove> {
        self.last_move.as_ref()
    }

    pub fn side_to_move(&self) -> PieceColor {
        self.board.side_to_move().into()
    }

    pub fn is_terminal(&self) -> bool {
        self.board.status() != GameStatus::Ongoing
    }

    /// Score of a finished position from the side to move's view, so that
    /// checkmate and stalemate never need an engine.
    pub fn terminal_score(&self) -> Option<AnalysisScore> {
        match self.board.status() {
            GameStatus::Won => Some(AnalysisScore::Mate(0)),
            GameStatus::Drawn => Some(AnalysisScore::Centipawns(0)),
            GameStatus::Ongoing => None,
        }
    }

    /// Apply one recorded move. `ply` is the number the new position gets.
    pub fn play(&self, ply: u32, notation: &str) -> Result<Position, IllegalMoveError> {
        let mv = resolve_move(&self.board, notation).map_err(|reason| IllegalMoveError {
            ply,
            notation: notation.to_string(),
            reason,
        })?;
        let played = PlayedMove {
            ply,
            mover: self.side_to_move(),
            notation: notation.to_string(),
            san: format_san(&self.board, mv),
            uci: format_uci_standard(&self.board, mv),
            mv,
        };
        let mut next = self.board.clone();
        next.play_unchecked(mv);
        Ok(Self::build(next, Some(played)))
    }
}

impl PartialEq for Position {
    fn eq(&self, other: &Self) -> bool {
        self.fen == other.fen && self.last_move == other.last_move
    }
}

impl Eq for Position {}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal move {notation:?} at ply {ply}: {reason}")]
pub struct IllegalMoveError {
    pub ply: u32,
    pub notation: String,
    pub reason: String,
}

/// All legal moves of the side to move.
pub fn legal_moves(board: &Board) -> Vec<Move> {
    let mut moves = Vec::new();
    board.generate_moves(|mvs| {
        moves.extend(mvs);
        false
    });
    moves
}

/// Resolve recorded notation to a legal move: SAN first, UCI as a fallback.
fn resolve_move(board: &Board, notation: &str) -> Result<Move, String> {
    let san_err = match parse_san(board, notation) {
        Ok(mv) => return Ok(mv),
        Err(e) => e,
    };
    if let Some(raw) = parse_uci_move(notation) {
        let legal = legal_moves(board);
        let mv = convert_uci_castling_to_cozy(raw, &legal);
        if legal.contains(&mv) {
            return Ok(mv);
        }
    }
    Err(san_err.to_string())
}

/// Replay moves from the standard starting position.
///
/// Returns `moves.len() + 1` positions: index 0 is the start, index `i` the
/// position after ply `i`. Stops at the first move that cannot be applied.
pub fn replay<S: AsRef<str>>(moves: &[S]) -> Result<Vec<Position>, IllegalMoveError> {
    replay_from(Position::start(), moves)
}

/// Replay moves from an arbitrary starting position.
pub fn replay_from<S: AsRef<str>>(
    start: Position,
    moves: &[S],
) -> Result<Vec<Position>, IllegalMoveError> {
    let mut positions = Vec::with_capacity(moves.len() + 1);
    let mut current = start;
    for (i, notation) in moves.iter().enumerate() {
        let next = current.play(i as u32 + 1, notation.as_ref())?;
        positions.push(std::mem::replace(&mut current, next));
    }
    positions.push(current);
    Ok(positions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn replays_short_game() {
        let positions = replay(&["e4", "e5", "Nf3", "Nc6", "Bb5"]).unwrap();
        assert_eq!(positions.len(), 6);
        assert_eq!(
            positions[5].fingerprint(),
            "r1bqkbnr/pppp1ppp/2n5/1B2p3/4P3/5N2/PPPP1PPP/RNBQK2R b KQkq -"
        );
        let last = positions[5].last_move().unwrap();
        assert_eq!(last.ply, 5);
        assert_eq!(last.mover, PieceColor::White);
        assert_eq!(last.uci, "f1b5");
        assert!(positions[0].last_move().is_none());
    }

    #[test]
    fn castling_en_passant_and_promotion() {
        // White castles short, black castles long, then an en passant capture.
        let moves = [
            "e4", "d5", "e5", "Qd6", "Nf3", "Bd7", "Be2", "Nc6", "O-O", "O-O-O", "c4", "f5",
            "exf6",
        ];
        let positions = replay(&moves).unwrap();
        let castle = positions[9].last_move().unwrap();
        assert_eq!(castle.san, "O-O");
        assert_eq!(castle.uci, "e1g1");
        let long = positions[10].last_move().unwrap();
        assert_eq!(long.san, "O-O-O");
        assert_eq!(long.uci, "e8c8");
        let ep = positions[13].last_move().unwrap();
        assert_eq!(ep.san, "exf6");
        assert!(positions[13].board().piece_on(cozy_chess::Square::F5).is_none());

        let promo = Position::from_fen("8/4P3/8/8/8/8/k7/4K3 w - - 0 1").unwrap();
        let after = promo.play(1, "e8=Q").unwrap();
        assert_eq!(after.last_move().unwrap().uci, "e7e8q");
    }

    #[test]
    fn accepts_uci_fallback() {
        let positions = replay(&["e2e4", "e7e5", "g1f3"]).unwrap();
        assert_eq!(positions[3].last_move().unwrap().san, "Nf3");
    }

    #[test]
    fn illegal_move_reports_ply() {
        let err = replay(&["e4", "e5", "Ke3"]).unwrap_err();
        assert_eq!(err.ply, 3);
        assert_eq!(err.notation, "Ke3");
    }

    #[test]
    fn terminal_positions_score_locally() {
        let positions = replay(&["f3", "e5", "g4", "Qh4#"]).unwrap();
        let mated = &positions[4];
        assert!(mated.is_terminal());
        assert_eq!(mated.terminal_score(), Some(AnalysisScore::Mate(0)));
        assert_eq!(mated.last_move().unwrap().san, "Qh4#");

        let stalemate = Position::from_fen("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1").unwrap();
        assert_eq!(stalemate.terminal_score(), Some(AnalysisScore::Centipawns(0)));
        assert_eq!(Position::start().terminal_score(), None);
    }

    proptest! {
        #[test]
        fn replay_is_deterministic(choices in proptest::collection::vec(any::<u16>(), 0..40)) {
            // Build a legal random game by picking moves from the legal list.
            let mut board = Board::default();
            let mut moves = Vec::new();
            for choice in choices {
                let legal = legal_moves(&board);
                if legal.is_empty() {
                    break;
                }
                let mv = legal[choice as usize % legal.len()];
                moves.push(format_san(&board, mv));
                board.play_unchecked(mv);
            }
            let first = replay(&moves).unwrap();
            let second = replay(&moves).unwrap();
            prop_assert_eq!(first.len(), moves.len() + 1);
            prop_assert_eq!(first, second);
        }
    }
}
