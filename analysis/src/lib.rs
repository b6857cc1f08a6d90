pub mod board_analysis;
pub mod classifier;
pub mod documents;
pub mod openings;
pub mod weakness;

pub use board_analysis::*;
pub use chess::{is_white_ply, AnalysisScore};
pub use classifier::{
    classify, classify_game, compute_accuracy, ClassifiedGame, MoveClassification, MoveRecord,
    PlyAnnotation, PositionScore, TacticalSummary,
};
pub use documents::{decode_document, DocumentError, GameAnalysis, VersionedDocument, SCHEMA_VERSION};
pub use openings::{
    resolve_opening_code, InsufficientSample, OpeningAggregator, OpeningBucket, OpeningKey,
    OpeningReport, OutcomeCounts, RatingBand, ReferenceError, ReferenceLookup,
    ReferenceOpeningDatabase, ReferenceRates,
};
pub use weakness::{
    synthesize, HistorySnapshot, PatternStat, Severity, TacticalPatternStats, TimeSignal, Trend,
    TrendDirection, WeaknessCategory, WeaknessConfig, WeaknessEntry, WeaknessReport,
};
