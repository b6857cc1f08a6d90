use cozy_chess::Board;

/// Parse a FEN string into a Board
pub fn parse_fen(fen: &str) -> Result<Board, FenError> {
    if fen.split_whitespace().next().is_none() {
        return Err(FenError::InvalidFormat);
    }
    fen.trim().parse().map_err(|_| FenError::InvalidBoardLayout)
}

/// Format a Board as a FEN string
pub fn format_fen(board: &Board) -> String {
    board.to_string()
}

/// Canonical position key: the first four FEN fields (placement, side to
/// move, castling rights, en passant). Move counters are dropped so the same
/// position reached at different points of different games shares one key.
pub fn fingerprint(board: &Board) -> String {
    fingerprint_fen(&format_fen(board))
}

/// Fingerprint an already-formatted FEN string.
pub fn fingerprint_fen(fen: &str) -> String {
    fen.split_whitespace().take(4).collect::<Vec<_>>().join(" ")
}

#[derive(Debug, thiserror::Error)]
pub enum FenError {
    #[error("Invalid FEN format")]
    InvalidFormat,
    #[error("Invalid board layout")]
    InvalidBoardLayout,
}
