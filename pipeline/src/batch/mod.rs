//! Batch analysis over a corpus of games.
//!
//! Games go through a queue shared by a fixed pool of worker tasks. Workers
//! share the evaluation cache and keep their own partial opening aggregates,
//! which are merged once the queue is drained. Games left with unevaluated
//! plies get one more pass after the cache forgets its failed positions.
//! Per-game documents are written as games complete; the aggregate documents
//! are written at the end, each as a complete-then-replace write, and only if
//! the batch was not cancelled.

mod worker;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use analysis::{
    synthesize, GameAnalysis, OpeningReport, RatingBand,
    ReferenceOpeningDatabase, VersionedDocument, WeaknessReport, SCHEMA_VERSION,
};
use chess::GameRecord;
use engine::PositionEvaluator;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch, Mutex};

use crate::cache::{CacheSnapshot, CacheStats, EvaluationCache};
use crate::config::PipelineConfig;
use crate::persistence::{
    now_timestamp, read_document, write_document, DataDir, HistoryStore, JsonStore,
    PersistenceError,
};
use worker::{run_batch_worker, WorkerContext, WorkerReport};

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("batch worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// A game excluded from aggregates because a move could not be replayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MalformedGame {
    pub game_id: String,
    pub ply: u32,
    pub notation: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub schema_version: u32,
    pub started_at: i64,
    pub finished_at: i64,
    pub games: usize,
    pub analyzed: usize,
    /// Games whose stored analysis was still current.
    pub reused: usize,
    /// Degraded games analysed a second time after the cache dropped its
    /// failed positions.
    #[serde(default)]
    pub retried: usize,
    pub malformed: Vec<MalformedGame>,
    /// Unevaluated plies across every analysis in the outcome.
    pub degraded_plies: u32,
    pub cache: CacheStats,
    pub cancelled: bool,
}

impl VersionedDocument for BatchSummary {
    const KIND: &'static str = "batch_summary";

    fn schema_version(&self) -> u32 {
        self.schema_version
    }
}

/// Result of one batch. The reports are `None` when the batch was cancelled.
#[derive(Debug)]
pub struct BatchOutcome {
    pub summary: BatchSummary,
    pub analyses: Vec<GameAnalysis>,
    pub openings: Option<OpeningReport>,
    pub weaknesses: Option<WeaknessReport>,
}

pub struct BatchRunner<E> {
    config: PipelineConfig,
    data: DataDir,
    cache: Arc<EvaluationCache<E>>,
    cancel: watch::Receiver<bool>,
}

impl<E: PositionEvaluator + 'static> BatchRunner<E> {
    pub fn new(
        config: PipelineConfig,
        data: DataDir,
        cache: Arc<EvaluationCache<E>>,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            data,
            cache,
            cancel,
        }
    }

    /// Seed the evaluation cache from the persisted snapshot. A snapshot
    /// with another schema version is an error; it has to be deleted.
    pub async fn load_cache(&self) -> Result<usize, PersistenceError> {
        let path = self.data.evaluation_cache();
        let Some(snapshot) = read_document::<CacheSnapshot>(&path)? else {
            return Ok(0);
        };
        let loaded = self.cache.restore(snapshot).await;
        tracing::info!(loaded, path = %path.display(), "Evaluation cache restored");
        Ok(loaded)
    }

    /// Analyse `games` (oldest first) and write every output document.
    pub async fn run(
        &self,
        games: Vec<GameRecord>,
        reference: &dyn ReferenceOpeningDatabase,
    ) -> Result<BatchOutcome, BatchError> {
        let started_at = now_timestamp();
        self.load_cache().await?;

        let total = games.len();
        let band = games
            .iter()
            .rev()
            .find_map(|g| g.player_rating)
            .map(RatingBand::from_rating)
            .unwrap_or(self.config.rating_band);
        tracing::info!(games = total, workers = self.worker_count(), %band, "Starting batch");

        let store = Arc::new(JsonStore::<GameAnalysis>::new(self.data.analyses()));
        let mut merged = self.run_pool(games.clone(), &store).await?;
        let retried = if *self.cancel.borrow() {
            0
        } else {
            self.retry_degraded(&games, &store, &mut merged).await?
        };
        merged
            .analyses
            .sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.game_id.cmp(&b.game_id)));
        merged.malformed.sort_by(|a, b| a.game_id.cmp(&b.game_id));

        let cancelled = *self.cancel.borrow();
        let summary = BatchSummary {
            schema_version: SCHEMA_VERSION,
            started_at,
            finished_at: now_timestamp(),
            games: total,
            analyzed: merged.analyzed,
            reused: merged.reused,
            retried,
            malformed: merged.malformed,
            degraded_plies: merged.analyses.iter().map(|a| a.degraded_plies).sum(),
            cache: self.cache.stats(),
            cancelled,
        };

        if cancelled {
            tracing::warn!(
                analyzed = summary.analyzed,
                "Batch cancelled; aggregate documents left untouched"
            );
            return Ok(BatchOutcome {
                summary,
                analyses: merged.analyses,
                openings: None,
                weaknesses: None,
            });
        }

        let opening_report = merged.openings.report(reference, band);
        let history = HistoryStore::new(self.data.history());
        let weakness_report = synthesize(
            &merged.analyses,
            &opening_report,
            &history.load()?,
            &self.config.weakness,
        );

        write_document(&self.data.opening_report(), &opening_report)?;
        write_document(&self.data.weakness_report(), &weakness_report)?;
        write_document(&self.data.evaluation_cache(), &self.cache.snapshot().await)?;
        // Stamped with the newest game covered so later runs can place it
        // among their own time buckets.
        if let Some(as_of) = merged.analyses.iter().map(|a| a.timestamp).max() {
            history.append(weakness_report.snapshot(as_of))?;
        }
        write_document(&self.data.batch_summary(), &summary)?;

        tracing::info!(
            analyzed = summary.analyzed,
            reused = summary.reused,
            retried = summary.retried,
            malformed = summary.malformed.len(),
            degraded_plies = summary.degraded_plies,
            weaknesses = weakness_report.entries.len(),
            "Batch complete"
        );

        Ok(BatchOutcome {
            summary,
            analyses: merged.analyses,
            openings: Some(opening_report),
            weaknesses: Some(weakness_report),
        })
    }

    fn worker_count(&self) -> usize {
        self.config.workers.max(1)
    }

    /// Queue `games` and drain them with the worker pool.
    async fn run_pool(
        &self,
        games: Vec<GameRecord>,
        store: &Arc<JsonStore<GameAnalysis>>,
    ) -> Result<WorkerReport, BatchError> {
        // Sized to hold every game so queueing never waits on workers.
        let (job_tx, job_rx) = mpsc::channel::<GameRecord>(games.len().max(1));
        for game in games {
            if job_tx.send(game).await.is_err() {
                break;
            }
        }
        drop(job_tx);

        let shared_rx = Arc::new(Mutex::new(job_rx));
        let handles: Vec<_> = (0..self.worker_count())
            .map(|worker_id| {
                let ctx = WorkerContext {
                    cache: self.cache.clone(),
                    store: store.clone(),
                    cancel: self.cancel.clone(),
                };
                tokio::spawn(run_batch_worker(worker_id, shared_rx.clone(), ctx))
            })
            .collect();

        let mut merged = WorkerReport::default();
        for handle in handles {
            let report = handle.await?;
            merged.openings.merge(report.openings);
            merged.analyses.extend(report.analyses);
            merged.malformed.extend(report.malformed);
            merged.analyzed += report.analyzed;
            merged.reused += report.reused;
        }
        Ok(merged)
    }

    /// Give games with unevaluated plies one more pass once the cache has
    /// dropped its unavailable positions. Fresh analyses replace the degraded
    /// ones in `merged`; openings were already counted. Returns the number
    /// of games redone.
    async fn retry_degraded(
        &self,
        games: &[GameRecord],
        store: &Arc<JsonStore<GameAnalysis>>,
        merged: &mut WorkerReport,
    ) -> Result<usize, BatchError> {
        let degraded: HashSet<&str> = merged
            .analyses
            .iter()
            .filter(|a| a.degraded_plies > 0)
            .map(|a| a.game_id.as_str())
            .collect();
        if degraded.is_empty() {
            return Ok(0);
        }
        let retry: Vec<GameRecord> = games
            .iter()
            .filter(|g| degraded.contains(g.id.as_str()))
            .cloned()
            .collect();

        let dropped = self.cache.retry_unavailable().await;
        tracing::info!(games = retry.len(), dropped, "Retrying games with unevaluated plies");

        let second = self.run_pool(retry, store).await?;
        let redone = second.analyzed;
        let mut fresh: HashMap<String, GameAnalysis> = second
            .analyses
            .into_iter()
            .map(|a| (a.game_id.clone(), a))
            .collect();
        for analysis in &mut merged.analyses {
            if let Some(replacement) = fresh.remove(&analysis.game_id) {
                *analysis = replacement;
            }
        }
        Ok(redone)
    }
}
