pub mod analysis;
pub mod fen;
pub mod game;
pub mod pgn;
pub mod replay;
pub mod types;
pub mod uci;

pub use analysis::{is_white_ply, AnalysisScore, MATE_SCORE_CP};
pub use fen::{fingerprint, FenError};
pub use game::{GameImportError, GameRecord, GameResult, Outcome, Termination, TimeControlClass};
pub use pgn::{format_san, parse_pgn, parse_pgn_games, parse_san, PgnError, PgnGame, SanError};
pub use replay::{legal_moves, replay, replay_from, IllegalMoveError, PlayedMove, Position};
pub use types::{PieceColor, PieceKind};
pub use uci::{convert_uci_castling_to_cozy, format_uci_move, format_uci_standard, parse_uci_move};
