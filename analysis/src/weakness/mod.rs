//! Ranked, evidence-backed weaknesses built from per-game analyses and the
//! opening report.

mod patterns;
mod trend;

use std::collections::{BTreeMap, HashMap};

use chess::PieceColor;
use serde::{Deserialize, Serialize};

use crate::board_analysis::TacticalTagKind;
use crate::documents::{GameAnalysis, VersionedDocument, SCHEMA_VERSION};
use crate::openings::{InsufficientSample, OpeningBucket, OpeningReport};

pub use patterns::{PatternStat, TacticalPatternStats};
use trend::{compute_trend, Observation};
pub use trend::{Trend, TrendDirection, TrendPoint};

const DAY_SECS: i64 = 86_400;

/// Thresholds for weakness emission and trend detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeaknessConfig {
    /// Fewest games (or plies, for clock signals) behind any entry.
    pub min_sample_size: u32,
    /// Fewest hits behind a tactical or time-management entry.
    pub min_evidence: u32,
    /// Loss rate assumed for a white opening when no reference is available.
    pub white_baseline_loss_rate: f64,
    pub black_baseline_loss_rate: f64,
    /// Share of games the player is expected to suffer a given motif in.
    pub tactical_baseline_rate: f64,
    pub timeout_baseline_rate: f64,
    /// Clock below which a ply counts as played in time trouble.
    pub low_clock_ms: u64,
    /// Error-rate excess in time trouble needed before it is reported.
    pub low_clock_margin: f64,
    pub trend_bucket_secs: i64,
    pub trend_tolerance: f64,
}

impl Default for WeaknessConfig {
    fn default() -> Self {
        Self {
            min_sample_size: 5,
            min_evidence: 3,
            white_baseline_loss_rate: 0.40,
            black_baseline_loss_rate: 0.45,
            tactical_baseline_rate: 0.15,
            timeout_baseline_rate: 0.05,
            low_clock_ms: 30_000,
            low_clock_margin: 0.10,
            trend_bucket_secs: 30 * DAY_SECS,
            trend_tolerance: 0.05,
        }
    }
}

impl WeaknessConfig {
    fn baseline_loss_rate(&self, color: PieceColor) -> f64 {
        match color {
            PieceColor::White => self.white_baseline_loss_rate,
            PieceColor::Black => self.black_baseline_loss_rate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeSignal {
    LostOnTime,
    /// Mistakes and blunders cluster on low-clock plies.
    LowClockErrors,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WeaknessCategory {
    Opening { code: String, color: PieceColor },
    TacticalPattern { motif: TacticalTagKind },
    TimeManagement { signal: TimeSignal },
}

impl WeaknessCategory {
    /// Stable key used by history snapshots.
    pub fn key(&self) -> String {
        match self {
            Self::Opening { code, color } => format!("opening:{color}:{code}"),
            Self::TacticalPattern { motif } => format!("tactic:{motif}"),
            Self::TimeManagement { signal: TimeSignal::LostOnTime } => "time:lost_on_time".into(),
            Self::TimeManagement { signal: TimeSignal::LowClockErrors } => "time:low_clock_errors".into(),
        }
    }
}

/// Declared most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Moderate,
    Minor,
}

impl Severity {
    fn grade(excess: f64, sample: u32, min_sample: u32) -> Self {
        if excess >= 0.20 && sample >= 2 * min_sample {
            Self::Critical
        } else if excess >= 0.10 {
            Self::Moderate
        } else {
            Self::Minor
        }
    }
}

/// A game supporting an entry and the plies that show it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub game_id: String,
    pub plies: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeaknessEntry {
    pub category: WeaknessCategory,
    pub severity: Severity,
    pub rate: f64,
    pub baseline: f64,
    pub sample: u32,
    pub hits: u32,
    /// `(rate - baseline) * sqrt(sample)`.
    pub evidence_strength: f64,
    pub evidence: Vec<Evidence>,
    pub trend: Trend,
    pub description: String,
}

/// Rates recorded after an earlier batch, keyed by [`WeaknessCategory::key`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySnapshot {
    pub timestamp: i64,
    pub rates: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeaknessReport {
    pub schema_version: u32,
    pub games_analyzed: u32,
    /// Sorted by severity, then evidence strength.
    pub entries: Vec<WeaknessEntry>,
    /// Opening buckets left out of ranking for lack of games.
    pub excluded: Vec<InsufficientSample>,
    #[serde(default)]
    pub tactical_patterns: TacticalPatternStats,
}

impl WeaknessReport {
    /// Snapshot of this report's rates for the history store.
    pub fn snapshot(&self, timestamp: i64) -> HistorySnapshot {
        HistorySnapshot {
            timestamp,
            rates: self
                .entries
                .iter()
                .map(|e| (e.category.key(), e.rate))
                .collect(),
        }
    }
}

impl VersionedDocument for WeaknessReport {
    const KIND: &'static str = "weakness_report";

    fn schema_version(&self) -> u32 {
        self.schema_version
    }
}

/// A candidate weakness before grading.
struct Signal {
    category: WeaknessCategory,
    rate: f64,
    baseline: f64,
    sample: u32,
    hits: u32,
    evidence: Vec<Evidence>,
    observations: Vec<Observation>,
    description: String,
}

/// Combine opening, tactical and time-management signals into a ranked list.
pub fn synthesize(
    games: &[GameAnalysis],
    openings: &OpeningReport,
    history: &[HistorySnapshot],
    config: &WeaknessConfig,
) -> WeaknessReport {
    let by_id: HashMap<&str, &GameAnalysis> = games.iter().map(|g| (g.game_id.as_str(), g)).collect();

    let mut excluded = Vec::new();
    let mut signals = Vec::new();
    for bucket in &openings.buckets {
        match bucket.check_sample(config.min_sample_size) {
            Ok(()) => signals.extend(opening_signal(bucket, games, &by_id, config)),
            Err(insufficient) => excluded.push(insufficient),
        }
    }
    signals.extend(tactical_signals(games, config));
    signals.extend(lost_on_time_signal(games, config));
    signals.extend(low_clock_signal(games, config));

    let mut entries: Vec<WeaknessEntry> = signals
        .into_iter()
        .map(|s| {
            let excess = s.rate - s.baseline;
            let key = s.category.key();
            WeaknessEntry {
                severity: Severity::grade(excess, s.sample, config.min_sample_size),
                evidence_strength: excess * f64::from(s.sample).sqrt(),
                trend: compute_trend(
                    &key,
                    &s.observations,
                    history,
                    config.trend_bucket_secs,
                    config.trend_tolerance,
                ),
                category: s.category,
                rate: s.rate,
                baseline: s.baseline,
                sample: s.sample,
                hits: s.hits,
                evidence: s.evidence,
                description: s.description,
            }
        })
        .collect();

    entries.sort_by(|a, b| {
        a.severity
            .cmp(&b.severity)
            .then_with(|| b.evidence_strength.total_cmp(&a.evidence_strength))
            .then_with(|| a.category.cmp(&b.category))
    });

    WeaknessReport {
        schema_version: SCHEMA_VERSION,
        games_analyzed: games.len() as u32,
        entries,
        excluded,
        tactical_patterns: TacticalPatternStats::from_games(games),
    }
}

fn opening_signal(
    bucket: &OpeningBucket,
    games: &[GameAnalysis],
    by_id: &HashMap<&str, &GameAnalysis>,
    config: &WeaknessConfig,
) -> Option<Signal> {
    let baseline = bucket
        .reference_loss_rate()
        .unwrap_or_else(|| config.baseline_loss_rate(bucket.color));
    if bucket.loss_rate <= baseline {
        return None;
    }

    let evidence = bucket
        .lost_games
        .iter()
        .map(|id| Evidence {
            game_id: id.clone(),
            plies: by_id
                .get(id.as_str())
                .map(|g| g.player_error_plies())
                .unwrap_or_default(),
        })
        .collect();
    let observations = games
        .iter()
        .filter(|g| g.opening_code == bucket.code && g.player_color == bucket.color)
        .map(|g| Observation {
            timestamp: g.timestamp,
            hits: u32::from(g.outcome == chess::Outcome::Loss),
            sample: 1,
        })
        .collect();

    Some(Signal {
        category: WeaknessCategory::Opening {
            code: bucket.code.clone(),
            color: bucket.color,
        },
        rate: bucket.loss_rate,
        baseline,
        sample: bucket.counts.games,
        hits: bucket.counts.losses,
        evidence,
        observations,
        description: format!(
            "Loses {:.0}% of {} games in {} as {} (baseline {:.0}%)",
            bucket.loss_rate * 100.0,
            bucket.counts.games,
            bucket.code,
            bucket.color,
            baseline * 100.0
        ),
    })
}

/// Motifs the opponent played against the player, one signal per motif.
fn tactical_signals(games: &[GameAnalysis], config: &WeaknessConfig) -> Vec<Signal> {
    let sample = games.len() as u32;
    if sample < config.min_sample_size {
        return Vec::new();
    }

    TacticalTagKind::ALL
        .into_iter()
        .filter(|motif| motif.counts_against_victim())
        .filter_map(|motif| {
            let mut evidence = Vec::new();
            let mut observations = Vec::with_capacity(games.len());
            for game in games {
                let plies: Vec<u32> = game
                    .moves
                    .iter()
                    .filter(|m| m.mover != game.player_color)
                    .filter(|m| m.tactics.iter().any(|t| t.kind == motif))
                    .map(|m| m.ply)
                    .collect();
                observations.push(Observation {
                    timestamp: game.timestamp,
                    hits: u32::from(!plies.is_empty()),
                    sample: 1,
                });
                if !plies.is_empty() {
                    evidence.push(Evidence {
                        game_id: game.game_id.clone(),
                        plies,
                    });
                }
            }

            let hits = evidence.len() as u32;
            let rate = f64::from(hits) / f64::from(sample);
            if hits < config.min_evidence || rate <= config.tactical_baseline_rate {
                return None;
            }
            Some(Signal {
                category: WeaknessCategory::TacticalPattern { motif },
                rate,
                baseline: config.tactical_baseline_rate,
                sample,
                hits,
                evidence,
                observations,
                description: format!(
                    "Fell to a {} in {hits} of {sample} games",
                    motif.as_str().replace('_', " ")
                ),
            })
        })
        .collect()
}

fn lost_on_time_signal(games: &[GameAnalysis], config: &WeaknessConfig) -> Option<Signal> {
    let sample = games.len() as u32;
    let timeouts: Vec<&GameAnalysis> = games.iter().filter(|g| g.lost_on_time()).collect();
    let hits = timeouts.len() as u32;
    if sample < config.min_sample_size || hits < config.min_evidence {
        return None;
    }
    let rate = f64::from(hits) / f64::from(sample);
    if rate <= config.timeout_baseline_rate {
        return None;
    }

    Some(Signal {
        category: WeaknessCategory::TimeManagement {
            signal: TimeSignal::LostOnTime,
        },
        rate,
        baseline: config.timeout_baseline_rate,
        sample,
        hits,
        evidence: timeouts
            .iter()
            .map(|g| Evidence {
                game_id: g.game_id.clone(),
                plies: g.moves.last().map(|m| vec![m.ply]).unwrap_or_default(),
            })
            .collect(),
        observations: games
            .iter()
            .map(|g| Observation {
                timestamp: g.timestamp,
                hits: u32::from(g.lost_on_time()),
                sample: 1,
            })
            .collect(),
        description: format!("Lost {hits} of {sample} games on time"),
    })
}

/// Error rate on plies started below `low_clock_ms` against the rest.
fn low_clock_signal(games: &[GameAnalysis], config: &WeaknessConfig) -> Option<Signal> {
    let mut low = (0u32, 0u32);
    let mut other = (0u32, 0u32);
    let mut evidence = Vec::new();
    let mut observations = Vec::new();

    for game in games {
        let mut error_plies = Vec::new();
        let mut game_low = (0u32, 0u32);
        for (idx, m) in game.moves.iter().enumerate() {
            if m.mover != game.player_color || m.centipawn_loss.is_none() {
                continue;
            }
            // Clock the player had before this ply: their reading one move earlier.
            let Some(clock) = idx
                .checked_sub(2)
                .and_then(|i| game.moves.get(i))
                .and_then(|prev| prev.clock_ms)
            else {
                continue;
            };
            let is_error = u32::from(m.classification.is_error());
            if clock < config.low_clock_ms {
                game_low.0 += is_error;
                game_low.1 += 1;
                if is_error == 1 {
                    error_plies.push(m.ply);
                }
            } else {
                other.0 += is_error;
                other.1 += 1;
            }
        }
        low.0 += game_low.0;
        low.1 += game_low.1;
        if game_low.1 > 0 {
            observations.push(Observation {
                timestamp: game.timestamp,
                hits: game_low.0,
                sample: game_low.1,
            });
        }
        if !error_plies.is_empty() {
            evidence.push(Evidence {
                game_id: game.game_id.clone(),
                plies: error_plies,
            });
        }
    }

    if low.1 < config.min_sample_size || low.0 < config.min_evidence {
        return None;
    }
    let rate = f64::from(low.0) / f64::from(low.1);
    let baseline = if other.1 == 0 {
        0.0
    } else {
        f64::from(other.0) / f64::from(other.1)
    };
    if rate - baseline <= config.low_clock_margin {
        return None;
    }

    Some(Signal {
        category: WeaknessCategory::TimeManagement {
            signal: TimeSignal::LowClockErrors,
        },
        rate,
        baseline,
        sample: low.1,
        hits: low.0,
        evidence,
        observations,
        description: format!(
            "{:.0}% of moves under {}s on the clock are mistakes or blunders, against {:.0}% otherwise",
            rate * 100.0,
            config.low_clock_ms / 1000,
            baseline * 100.0
        ),
    })
}
