use std::sync::Arc;

use analysis::{classify_game, GameAnalysis, OpeningAggregator, PositionScore};
use chess::{GameRecord, IllegalMoveError};
use engine::PositionEvaluator;
use tokio::sync::{mpsc, watch, Mutex};

use crate::cache::EvaluationCache;
use crate::persistence::JsonStore;

use super::MalformedGame;

/// Everything one worker needs; cloned per task.
pub(super) struct WorkerContext<E> {
    pub cache: Arc<EvaluationCache<E>>,
    pub store: Arc<JsonStore<GameAnalysis>>,
    pub cancel: watch::Receiver<bool>,
}

/// What a worker hands back when the queue is drained or the batch cancelled.
#[derive(Default)]
pub(super) struct WorkerReport {
    pub openings: OpeningAggregator,
    pub analyses: Vec<GameAnalysis>,
    pub malformed: Vec<MalformedGame>,
    pub analyzed: usize,
    pub reused: usize,
}

/// A worker task. Pulls games from the shared queue one at a time and keeps
/// its own partial opening aggregate.
pub(super) async fn run_batch_worker<E: PositionEvaluator>(
    worker_id: usize,
    job_rx: Arc<Mutex<mpsc::Receiver<GameRecord>>>,
    ctx: WorkerContext<E>,
) -> WorkerReport {
    tracing::debug!(worker_id, "Batch worker started");
    let mut report = WorkerReport::default();

    loop {
        if *ctx.cancel.borrow() {
            tracing::info!(worker_id, "Batch cancelled, worker stopping");
            break;
        }

        // Only one worker picks up each game.
        let game = {
            let mut rx = job_rx.lock().await;
            match rx.recv().await {
                Some(game) => game,
                None => break,
            }
        };
        // Cancelled while waiting on the queue: leave the game unprocessed.
        if *ctx.cancel.borrow() {
            tracing::info!(worker_id, game_id = %game.id, "Batch cancelled, game skipped");
            break;
        }

        if let Some(existing) = reusable_analysis(worker_id, &game, &ctx) {
            tracing::debug!(worker_id, game_id = %game.id, "Reusing stored analysis");
            report.openings.ingest(&game, game.outcome());
            report.analyses.push(existing);
            report.reused += 1;
            continue;
        }

        tracing::info!(worker_id, game_id = %game.id, plies = game.moves.len(), "Analysing game");
        match analyze_game(worker_id, &game, &ctx.cache).await {
            Ok(analysis) => {
                if let Err(e) = ctx.store.save(&analysis) {
                    tracing::error!(worker_id, game_id = %game.id, "Failed to save game analysis: {}", e);
                }
                report.openings.ingest(&game, game.outcome());
                report.analyses.push(analysis);
                report.analyzed += 1;
            }
            Err(e) => {
                tracing::warn!(
                    worker_id,
                    game_id = %game.id,
                    ply = e.ply,
                    "Skipping malformed game: {}",
                    e
                );
                report.malformed.push(MalformedGame {
                    game_id: game.id.clone(),
                    ply: e.ply,
                    notation: e.notation,
                    reason: e.reason,
                });
            }
        }
    }

    report
}

/// A complete stored analysis of this game made under the current
/// evaluator, if one exists. Degraded documents are always redone.
fn reusable_analysis<E: PositionEvaluator>(
    worker_id: usize,
    game: &GameRecord,
    ctx: &WorkerContext<E>,
) -> Option<GameAnalysis> {
    match ctx.store.load(&game.id) {
        Ok(Some(existing)) if existing.is_current(&game.id, ctx.cache.evaluator_version()) => Some(existing),
        Ok(Some(existing)) => {
            tracing::debug!(
                worker_id,
                game_id = %game.id,
                evaluator = %existing.evaluator_version,
                degraded = existing.degraded_plies,
                "Stored analysis is stale, re-analysing"
            );
            None
        }
        Ok(None) => None,
        Err(e) => {
            tracing::warn!(worker_id, game_id = %game.id, "Unreadable stored analysis, re-analysing: {}", e);
            None
        }
    }
}

/// Replay, evaluate every position through the cache, then classify.
async fn analyze_game<E: PositionEvaluator>(
    worker_id: usize,
    game: &GameRecord,
    cache: &EvaluationCache<E>,
) -> Result<GameAnalysis, IllegalMoveError> {
    let positions = chess::replay(&game.moves)?;

    let mut scores = Vec::with_capacity(positions.len());
    for (ply, position) in positions.iter().enumerate() {
        let outcome = cache.get_or_evaluate(position).await;
        let score = outcome.evaluation().map(|eval| PositionScore {
            score: eval.score,
            best_move: eval.best_move.clone(),
        });
        tracing::debug!(worker_id, game_id = %game.id, ply, evaluated = score.is_some(), "Position done");
        scores.push(score);
    }

    let classified = classify_game(&positions, &scores, &game.clocks_ms);
    if classified.degraded_plies > 0 {
        tracing::warn!(
            worker_id,
            game_id = %game.id,
            degraded = classified.degraded_plies,
            "Some plies have no evaluation and are left out of accuracy"
        );
    }
    Ok(GameAnalysis::new(game, cache.evaluator_version(), classified))
}
