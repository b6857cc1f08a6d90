//! Opening performance: per (opening, colour) outcome buckets compared against
//! a reference population.

use std::collections::{BTreeMap, BTreeSet};

use chess::{GameRecord, Outcome, PieceColor, Termination, TimeControlClass};
use serde::{Deserialize, Serialize};

use crate::documents::{VersionedDocument, SCHEMA_VERSION};

/// Fewest games a bucket needs before it may be ranked as a weakness.
pub const DEFAULT_MIN_SAMPLE: u32 = 5;

/// Deepest move prefix consulted when naming an undeclared opening.
const PREFIX_DEPTH: usize = 5;

const OPENING_PREFIXES: &[(&str, &str)] = &[
    ("e4", "King's Pawn"),
    ("d4", "Queen's Pawn"),
    ("Nf3", "Reti Opening"),
    ("c4", "English Opening"),
    ("e4 e5", "King's Pawn Game"),
    ("e4 c5", "Sicilian Defense"),
    ("e4 e6", "French Defense"),
    ("e4 c6", "Caro-Kann Defense"),
    ("d4 Nf6", "Indian Defense"),
    ("d4 d5", "Closed Game"),
    ("e4 e5 Nf3", "King's Knight Opening"),
    ("e4 e5 Nf3 Nc6", "Four Knights"),
    ("e4 e5 Nf3 Nc6 Bb5", "Ruy Lopez"),
    ("e4 e5 Nf3 Nc6 Bc4", "Italian Game"),
    ("d4 Nf6 c4", "Indian Systems"),
    ("d4 d5 c4", "Queen's Gambit"),
    ("d4 Nf6 c4 g6", "King's Indian"),
    ("d4 Nf6 c4 e6", "Nimzo/Queen's Indian"),
];

/// Opening code for a game: the declared code, else the longest known move
/// prefix, else `"1. <first move>"`, else `"Unknown"`.
pub fn resolve_opening_code(declared: Option<&str>, moves: &[String]) -> String {
    if let Some(code) = declared.map(str::trim).filter(|c| !c.is_empty()) {
        return code.to_string();
    }

    let cleaned: Vec<&str> = moves
        .iter()
        .take(PREFIX_DEPTH)
        .map(|m| m.trim_end_matches(['+', '#', '!', '?']))
        .collect();

    for len in (1..=cleaned.len()).rev() {
        let prefix = cleaned[..len].join(" ");
        if let Some((_, name)) = OPENING_PREFIXES.iter().find(|(p, _)| *p == prefix) {
            return (*name).to_string();
        }
    }

    match cleaned.first() {
        Some(first) => format!("1. {first}"),
        None => "Unknown".to_string(),
    }
}

/// Win/loss/draw tally. `wins + losses + draws == games` always holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub games: u32,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
}

impl OutcomeCounts {
    pub fn record(&mut self, outcome: Outcome) {
        self.games += 1;
        match outcome {
            Outcome::Win => self.wins += 1,
            Outcome::Loss => self.losses += 1,
            Outcome::Draw => self.draws += 1,
        }
    }

    pub fn merge(&mut self, other: &OutcomeCounts) {
        self.games += other.games;
        self.wins += other.wins;
        self.losses += other.losses;
        self.draws += other.draws;
    }

    pub fn win_rate(&self) -> f64 {
        ratio(self.wins, self.games)
    }

    pub fn loss_rate(&self) -> f64 {
        ratio(self.losses, self.games)
    }

    pub fn draw_rate(&self) -> f64 {
        ratio(self.draws, self.games)
    }
}

fn ratio(part: u32, whole: u32) -> f64 {
    if whole == 0 {
        0.0
    } else {
        f64::from(part) / f64::from(whole)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OpeningKey {
    pub code: String,
    pub color: PieceColor,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct BucketTally {
    counts: OutcomeCounts,
    lost_games: BTreeSet<String>,
}

/// Population rates for one opening, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRates {
    pub white_win_pct: f64,
    pub draw_pct: f64,
    pub black_win_pct: f64,
}

impl ReferenceRates {
    /// Population win rate (0..1) for the side playing `color`.
    pub fn win_rate_for(&self, color: PieceColor) -> f64 {
        match color {
            PieceColor::White => self.white_win_pct / 100.0,
            PieceColor::Black => self.black_win_pct / 100.0,
        }
    }

    /// Population loss rate (0..1) for the side playing `color`.
    pub fn loss_rate_for(&self, color: PieceColor) -> f64 {
        self.win_rate_for(color.opposite())
    }
}

/// Rating bucket the reference statistics are keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RatingBand(u32);

impl RatingBand {
    pub const BANDS: [u32; 8] = [1000, 1200, 1400, 1600, 1800, 2000, 2200, 2500];

    /// Highest band not above `rating`; ratings below the lowest band use it.
    pub fn from_rating(rating: u32) -> Self {
        let band = Self::BANDS
            .iter()
            .rev()
            .find(|&&b| b <= rating)
            .copied()
            .unwrap_or(Self::BANDS[0]);
        Self(band)
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for RatingBand {
    fn default() -> Self {
        Self(1600)
    }
}

impl std::fmt::Display for RatingBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ReferenceError {
    #[error("reference database unavailable: {0}")]
    Unavailable(String),
}

/// Population-level opening statistics.
pub trait ReferenceOpeningDatabase {
    /// `Ok(None)` when the database has no entry for the code.
    fn reference_rates(
        &self,
        code: &str,
        band: RatingBand,
    ) -> Result<Option<ReferenceRates>, ReferenceError>;
}

/// Outcome of the reference lookup for one bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReferenceLookup {
    Found { win_rate: f64, loss_rate: f64 },
    NotFound,
    Unavailable { reason: String },
}

/// A bucket excluded from weakness ranking for having too few games.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{subject}: {games} games, {required} required")]
pub struct InsufficientSample {
    pub subject: String,
    pub games: u32,
    pub required: u32,
}

/// Reported statistics for one (opening, colour) key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpeningBucket {
    pub code: String,
    pub color: PieceColor,
    #[serde(flatten)]
    pub counts: OutcomeCounts,
    pub win_rate: f64,
    pub loss_rate: f64,
    pub reference: ReferenceLookup,
    /// Observed minus reference win rate.
    pub performance_delta: Option<f64>,
    /// Lost games, sorted by id.
    pub lost_games: Vec<String>,
}

impl OpeningBucket {
    pub fn check_sample(&self, required: u32) -> Result<(), InsufficientSample> {
        if self.counts.games >= required {
            Ok(())
        } else {
            Err(InsufficientSample {
                subject: format!("{} as {}", self.code, self.color),
                games: self.counts.games,
                required,
            })
        }
    }

    pub fn reference_loss_rate(&self) -> Option<f64> {
        match self.reference {
            ReferenceLookup::Found { loss_rate, .. } => Some(loss_rate),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeControlStats {
    pub time_control: TimeControlClass,
    #[serde(flatten)]
    pub counts: OutcomeCounts,
    pub win_rate: f64,
}

/// Versioned opening statistics document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpeningReport {
    pub schema_version: u32,
    pub rating_band: RatingBand,
    pub total_games: u32,
    /// Sorted by colour, then code.
    pub buckets: Vec<OpeningBucket>,
    pub time_controls: Vec<TimeControlStats>,
    pub terminations: BTreeMap<Termination, u32>,
}

impl OpeningReport {
    pub fn bucket(&self, code: &str, color: PieceColor) -> Option<&OpeningBucket> {
        self.buckets
            .iter()
            .find(|b| b.code == code && b.color == color)
    }
}

impl VersionedDocument for OpeningReport {
    const KIND: &'static str = "opening_report";

    fn schema_version(&self) -> u32 {
        self.schema_version
    }
}

/// Accumulates opening outcomes. Ingestion is commutative and `merge` is
/// plain counter addition, so partial aggregates combine in any order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpeningAggregator {
    buckets: BTreeMap<OpeningKey, BucketTally>,
    time_controls: BTreeMap<TimeControlClass, OutcomeCounts>,
    terminations: BTreeMap<Termination, u32>,
}

impl OpeningAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ingest(&mut self, game: &GameRecord, outcome: Outcome) {
        let key = OpeningKey {
            code: resolve_opening_code(game.opening_code.as_deref(), &game.moves),
            color: game.player_color,
        };
        let tally = self.buckets.entry(key).or_default();
        tally.counts.record(outcome);
        if outcome == Outcome::Loss {
            tally.lost_games.insert(game.id.clone());
        }

        self.time_controls
            .entry(game.time_control)
            .or_default()
            .record(outcome);
        *self.terminations.entry(game.termination).or_insert(0) += 1;
    }

    pub fn merge(&mut self, other: OpeningAggregator) {
        for (key, tally) in other.buckets {
            let mine = self.buckets.entry(key).or_default();
            mine.counts.merge(&tally.counts);
            mine.lost_games.extend(tally.lost_games);
        }
        for (class, counts) in other.time_controls {
            self.time_controls.entry(class).or_default().merge(&counts);
        }
        for (termination, count) in other.terminations {
            *self.terminations.entry(termination).or_insert(0) += count;
        }
    }

    pub fn total_games(&self) -> u32 {
        self.buckets.values().map(|t| t.counts.games).sum()
    }

    pub fn counts(&self, code: &str, color: PieceColor) -> Option<OutcomeCounts> {
        self.buckets
            .get(&OpeningKey {
                code: code.to_string(),
                color,
            })
            .map(|t| t.counts)
    }

    /// Every bucket with its observed rates and, where the reference database
    /// knows the opening, the performance delta.
    pub fn report(&self, reference: &dyn ReferenceOpeningDatabase, band: RatingBand) -> OpeningReport {
        let mut buckets: Vec<OpeningBucket> = self
            .buckets
            .iter()
            .map(|(key, tally)| {
                let lookup = match reference.reference_rates(&key.code, band) {
                    Ok(Some(rates)) => ReferenceLookup::Found {
                        win_rate: rates.win_rate_for(key.color),
                        loss_rate: rates.loss_rate_for(key.color),
                    },
                    Ok(None) => ReferenceLookup::NotFound,
                    Err(e) => ReferenceLookup::Unavailable {
                        reason: e.to_string(),
                    },
                };
                let win_rate = tally.counts.win_rate();
                let performance_delta = match lookup {
                    ReferenceLookup::Found { win_rate: population, .. } => Some(win_rate - population),
                    _ => None,
                };
                OpeningBucket {
                    code: key.code.clone(),
                    color: key.color,
                    counts: tally.counts,
                    win_rate,
                    loss_rate: tally.counts.loss_rate(),
                    reference: lookup,
                    performance_delta,
                    lost_games: tally.lost_games.iter().cloned().collect(),
                }
            })
            .collect();
        buckets.sort_by(|a, b| a.color.cmp(&b.color).then_with(|| a.code.cmp(&b.code)));

        OpeningReport {
            schema_version: SCHEMA_VERSION,
            rating_band: band,
            total_games: self.total_games(),
            buckets,
            time_controls: self
                .time_controls
                .iter()
                .map(|(&time_control, &counts)| TimeControlStats {
                    time_control,
                    counts,
                    win_rate: counts.win_rate(),
                })
                .collect(),
            terminations: self.terminations.clone(),
        }
    }
}
