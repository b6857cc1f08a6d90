mod parser;
mod san;

pub use parser::{parse_pgn, parse_pgn_games, PgnError, PgnGame};
pub use san::{format_san, parse_san, SanError};
