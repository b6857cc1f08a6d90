//! Memoised position evaluation.
//!
//! Each fingerprint owns a `OnceCell`: the first caller on an unseen key runs
//! the evaluator (with timeout, retries and backoff) while concurrent callers
//! on the same key wait on that one evaluation. Exhausting the retry budget
//! stores an `Unavailable` outcome so other games hitting the same position
//! do not wait out the budget again. Those entries are never persisted; the
//! batch runner calls [`EvaluationCache::retry_unavailable`] before its
//! second pass over degraded games so that pass evaluates them afresh.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use analysis::VersionedDocument;
use chess::Position;
use engine::{EvaluationError, PositionEvaluation, PositionEvaluator};
use serde::{Deserialize, Serialize};
use tokio::sync::{OnceCell, RwLock};

use crate::config::RetryPolicy;

/// What the cache knows about one position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvaluationOutcome {
    Scored(PositionEvaluation),
    /// The evaluator failed on every attempt.
    Unavailable { reason: String },
}

impl EvaluationOutcome {
    pub fn evaluation(&self) -> Option<&PositionEvaluation> {
        match self {
            Self::Scored(eval) => Some(eval),
            Self::Unavailable { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Calls answered without running the evaluator.
    pub hits: u64,
    /// Calls that ran an evaluation.
    pub misses: u64,
    pub evaluator_calls: u64,
    /// Failed evaluator attempts, timeouts included.
    pub failures: u64,
    /// Positions that exhausted their retry budget.
    pub unavailable: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evaluator_calls: AtomicU64,
    failures: AtomicU64,
    unavailable: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Persisted form of the cache: scored evaluations under one evaluator version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub schema_version: u32,
    pub evaluator_version: String,
    /// Sorted by fingerprint.
    pub entries: Vec<PositionEvaluation>,
}

impl VersionedDocument for CacheSnapshot {
    const KIND: &'static str = "evaluation_cache";

    fn schema_version(&self) -> u32 {
        self.schema_version
    }
}

type Slot = Arc<OnceCell<EvaluationOutcome>>;

pub struct EvaluationCache<E> {
    evaluator: Arc<E>,
    policy: RetryPolicy,
    entries: RwLock<HashMap<String, Slot>>,
    counters: Counters,
}

impl<E: PositionEvaluator> EvaluationCache<E> {
    pub fn new(evaluator: Arc<E>, policy: RetryPolicy) -> Self {
        Self {
            evaluator,
            policy,
            entries: RwLock::new(HashMap::new()),
            counters: Counters::default(),
        }
    }

    pub fn evaluator_version(&self) -> &str {
        self.evaluator.version()
    }

    /// Evaluation of `position`, running the evaluator at most once per
    /// fingerprint no matter how many callers ask concurrently.
    ///
    /// Checkmate and stalemate are scored locally without an evaluator call.
    pub async fn get_or_evaluate(&self, position: &Position) -> EvaluationOutcome {
        if let Some(score) = position.terminal_score() {
            return EvaluationOutcome::Scored(PositionEvaluation {
                fingerprint: position.fingerprint().to_string(),
                score,
                best_move: None,
                depth: None,
            });
        }

        let slot = self.slot(position.fingerprint()).await;
        if let Some(outcome) = slot.get() {
            Counters::bump(&self.counters.hits);
            return outcome.clone();
        }

        let ran = AtomicBool::new(false);
        let outcome = slot
            .get_or_init(|| async {
                ran.store(true, Ordering::Relaxed);
                Counters::bump(&self.counters.misses);
                self.evaluate_with_retry(position).await
            })
            .await;
        if !ran.load(Ordering::Relaxed) {
            Counters::bump(&self.counters.hits);
        }
        outcome.clone()
    }

    async fn slot(&self, fingerprint: &str) -> Slot {
        if let Some(slot) = self.entries.read().await.get(fingerprint) {
            return slot.clone();
        }
        self.entries
            .write()
            .await
            .entry(fingerprint.to_string())
            .or_default()
            .clone()
    }

    async fn evaluate_with_retry(&self, position: &Position) -> EvaluationOutcome {
        let fingerprint = position.fingerprint();
        let attempts = self.policy.max_attempts.max(1);
        let mut last_error = EvaluationError::Unavailable("not attempted".into());

        for attempt in 1..=attempts {
            Counters::bump(&self.counters.evaluator_calls);
            let result = tokio::time::timeout(self.policy.timeout(), self.evaluator.evaluate(position)).await;
            match result {
                Ok(Ok(eval)) => {
                    tracing::debug!(fingerprint, attempt, score = %eval.score, "Position evaluated");
                    return EvaluationOutcome::Scored(eval);
                }
                Ok(Err(e)) => last_error = e,
                Err(_) => {
                    last_error = EvaluationError::Timeout {
                        after_ms: self.policy.timeout_ms,
                    }
                }
            }
            Counters::bump(&self.counters.failures);
            tracing::warn!(fingerprint, attempt, attempts, error = %last_error, "Evaluation attempt failed");

            if attempt < attempts {
                tokio::time::sleep(self.policy.backoff(attempt)).await;
            }
        }

        Counters::bump(&self.counters.unavailable);
        tracing::warn!(fingerprint, "Evaluation unavailable, degrading position");
        EvaluationOutcome::Unavailable {
            reason: last_error.to_string(),
        }
    }

    /// Forget every `Unavailable` outcome so the next request retries.
    /// Returns how many were dropped.
    pub async fn retry_unavailable(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, slot| !matches!(slot.get(), Some(EvaluationOutcome::Unavailable { .. })));
        before - entries.len()
    }

    pub fn stats(&self) -> CacheStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        CacheStats {
            hits: load(&self.counters.hits),
            misses: load(&self.counters.misses),
            evaluator_calls: load(&self.counters.evaluator_calls),
            failures: load(&self.counters.failures),
            unavailable: load(&self.counters.unavailable),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Scored entries for persistence.
    pub async fn snapshot(&self) -> CacheSnapshot {
        let mut entries: Vec<PositionEvaluation> = self
            .entries
            .read()
            .await
            .values()
            .filter_map(|slot| slot.get().and_then(EvaluationOutcome::evaluation).cloned())
            .collect();
        entries.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
        CacheSnapshot {
            schema_version: analysis::SCHEMA_VERSION,
            evaluator_version: self.evaluator_version().to_string(),
            entries,
        }
    }

    /// Seed the cache from a snapshot. A snapshot taken under another
    /// evaluator version is discarded. Returns the number of entries loaded.
    pub async fn restore(&self, snapshot: CacheSnapshot) -> usize {
        if snapshot.evaluator_version != self.evaluator_version() {
            tracing::info!(
                found = %snapshot.evaluator_version,
                current = %self.evaluator_version(),
                "Discarding evaluation cache from another evaluator version"
            );
            return 0;
        }

        let mut entries = self.entries.write().await;
        let mut loaded = 0;
        for eval in snapshot.entries {
            let slot = entries.entry(eval.fingerprint.clone()).or_default();
            if slot.set(EvaluationOutcome::Scored(eval)).is_ok() {
                loaded += 1;
            }
        }
        loaded
    }
}
