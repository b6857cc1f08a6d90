pub mod evaluator;
pub mod stockfish;
pub mod uci;

pub use evaluator::{EvaluationError, PositionEvaluation, PositionEvaluator};
pub use stockfish::{EngineConfig, StockfishEvaluator};
pub use uci::{UciError, UciMessage};

use chess::AnalysisScore;

/// Search information reported by a UCI engine on an `info` line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineInfo {
    pub depth: Option<u8>,
    pub seldepth: Option<u8>,
    pub time_ms: Option<u64>,
    pub nodes: Option<u64>,
    pub score: Option<AnalysisScore>,
    /// Principal variation, UCI notation.
    pub pv: Vec<String>,
    pub multipv: Option<u8>,
    pub nps: Option<u64>,
}
