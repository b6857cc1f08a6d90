//! Whole-batch runs against a deterministic evaluator.

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use analysis::{GameAnalysis, MoveClassification, TacticalTagKind, TrendDirection, WeaknessCategory};
use chess::{AnalysisScore, GameRecord, GameResult, PieceColor, Position, Termination, TimeControlClass};
use engine::{EvaluationError, PositionEvaluation, PositionEvaluator};
use insights_pipeline::batch::{BatchOutcome, BatchRunner};
use insights_pipeline::cache::EvaluationCache;
use insights_pipeline::config::{PipelineConfig, RetryPolicy};
use insights_pipeline::persistence::{DataDir, HistoryStore, JsonStore};
use insights_pipeline::reference::NoReference;
use tokio::sync::watch;

/// Level at the start, then every position is 350 in favour of black:
/// white's first move is the only one that loses anything.
///
/// The first `fail_first` calls fail. With `cancel` set, the first call
/// cancels the batch.
struct LopsidedEvaluator {
    start: String,
    calls: AtomicUsize,
    fail_first: usize,
    cancel: Option<watch::Sender<bool>>,
}

impl LopsidedEvaluator {
    fn new() -> Self {
        Self {
            start: Position::start().fingerprint().to_string(),
            calls: AtomicUsize::new(0),
            fail_first: 0,
            cancel: None,
        }
    }

    fn failing(fail_first: usize) -> Self {
        Self {
            fail_first,
            ..Self::new()
        }
    }

    fn cancelling(cancel: watch::Sender<bool>) -> Self {
        Self {
            cancel: Some(cancel),
            ..Self::new()
        }
    }
}

impl PositionEvaluator for LopsidedEvaluator {
    fn version(&self) -> &str {
        "lopsided-1"
    }

    fn evaluate(
        &self,
        position: &Position,
    ) -> impl Future<Output = Result<PositionEvaluation, EvaluationError>> + Send {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(cancel) = &self.cancel {
            cancel.send_replace(true);
        }
        let cp = if position.fingerprint() == self.start {
            0
        } else if position.side_to_move() == PieceColor::White {
            -350
        } else {
            350
        };
        let result = if n < self.fail_first {
            Err(EvaluationError::Unavailable("engine down".into()))
        } else {
            Ok(PositionEvaluation {
                fingerprint: position.fingerprint().to_string(),
                score: AnalysisScore::Centipawns(cp),
                best_move: None,
                depth: Some(12),
            })
        };
        async move { result }
    }
}

/// 40 plies: 1. e4 e5, then the knights shuffle out and back.
fn forty_plies() -> Vec<String> {
    let mut moves = vec!["e4".to_string(), "e5".to_string()];
    for _ in 0..9 {
        moves.extend(["Nf3", "Nc6", "Ng1", "Nb8"].map(String::from));
    }
    moves.extend(["Nf3", "Nc6"].map(String::from));
    moves
}

fn lost_game(i: usize) -> GameRecord {
    GameRecord {
        id: format!("g{i}"),
        moves: forty_plies(),
        result: GameResult::BlackWins,
        termination: Termination::Resignation,
        player_color: PieceColor::White,
        opponent: Some("rival".into()),
        opening_code: None,
        timestamp: 1_700_000_000 + i as i64 * 3_600,
        time_control: TimeControlClass::Blitz,
        clocks_ms: Vec::new(),
        player_rating: None,
    }
}

/// Scholar's mate, with the player on the receiving end.
fn mated_game(i: usize) -> GameRecord {
    GameRecord {
        id: format!("m{i}"),
        moves: ["e4", "e5", "Qh5", "Nc6", "Bc4", "Nf6", "Qxf7#"].map(String::from).to_vec(),
        result: GameResult::WhiteWins,
        termination: Termination::Checkmate,
        player_color: PieceColor::Black,
        ..lost_game(i)
    }
}

fn stored_path(data: &DataDir, id: &str) -> std::path::PathBuf {
    JsonStore::<GameAnalysis>::new(data.analyses()).file_path(id)
}

fn config() -> PipelineConfig {
    config_with_workers(3)
}

fn config_with_workers(workers: usize) -> PipelineConfig {
    PipelineConfig {
        workers,
        retry: RetryPolicy {
            max_attempts: 2,
            timeout_ms: 1_000,
            initial_backoff_ms: 1,
            max_backoff_ms: 1,
        },
        ..Default::default()
    }
}

async fn run_with(
    data: &DataDir,
    evaluator: Arc<LopsidedEvaluator>,
    games: Vec<GameRecord>,
    config: PipelineConfig,
    cancel: watch::Receiver<bool>,
) -> BatchOutcome {
    let cache = Arc::new(EvaluationCache::new(evaluator, config.retry.clone()));
    let runner = BatchRunner::new(config, data.clone(), cache, cancel);
    runner.run(games, &NoReference).await.unwrap()
}

async fn run_batch(
    data: &DataDir,
    evaluator: Arc<LopsidedEvaluator>,
    games: Vec<GameRecord>,
    cancelled: bool,
) -> BatchOutcome {
    let (cancel_tx, cancel_rx) = watch::channel(cancelled);
    let outcome = run_with(data, evaluator, games, config(), cancel_rx).await;
    drop(cancel_tx);
    outcome
}

#[tokio::test]
async fn single_blunder_reaches_the_weakness_evidence() {
    let dir = tempfile::tempdir().unwrap();
    let data = DataDir::new(dir.path());
    let games: Vec<GameRecord> = (0..5).map(lost_game).collect();

    let outcome = run_batch(&data, Arc::new(LopsidedEvaluator::new()), games, false).await;
    assert_eq!(outcome.summary.analyzed, 5);
    assert!(outcome.summary.malformed.is_empty());

    for analysis in &outcome.analyses {
        assert_eq!(analysis.moves.len(), 40);
        let blunders: Vec<u32> = analysis
            .moves
            .iter()
            .filter(|m| m.classification == MoveClassification::Blunder)
            .map(|m| m.ply)
            .collect();
        assert_eq!(blunders, vec![1]);
        assert_eq!(analysis.moves[0].centipawn_loss, Some(350));
        assert!(analysis.moves.iter().skip(1).all(|m| m.centipawn_loss == Some(0)));
        assert!(analysis.player_accuracy().unwrap() < 100.0);
        assert_eq!(analysis.degraded_plies, 0);
    }

    let weaknesses = outcome.weaknesses.unwrap();
    let opening = weaknesses
        .entries
        .iter()
        .find(|e| matches!(e.category, WeaknessCategory::Opening { color: PieceColor::White, .. }))
        .expect("losing opening reported");
    assert_eq!(opening.sample, 5);
    assert_eq!(opening.evidence.len(), 5);
    assert!(opening.evidence.iter().all(|e| e.plies.contains(&1)));

    assert!(data.opening_report().exists());
    assert!(data.weakness_report().exists());
    assert!(data.batch_summary().exists());
    assert!(data.evaluation_cache().exists());
    assert!(data.history().exists());
    assert!(stored_path(&data, "g0").exists());
}

#[tokio::test]
async fn four_games_are_too_few_to_rank() {
    let dir = tempfile::tempdir().unwrap();
    let data = DataDir::new(dir.path());
    let games: Vec<GameRecord> = (0..4).map(lost_game).collect();

    let outcome = run_batch(&data, Arc::new(LopsidedEvaluator::new()), games, false).await;
    let weaknesses = outcome.weaknesses.unwrap();
    assert!(!weaknesses
        .entries
        .iter()
        .any(|e| matches!(e.category, WeaknessCategory::Opening { .. })));
    assert!(weaknesses.excluded.iter().any(|x| x.games == 4 && x.required == 5));

    // Still visible in the raw statistics.
    let openings = outcome.openings.unwrap();
    assert_eq!(openings.total_games, 4);
    assert_eq!(openings.buckets.len(), 1);
    assert_eq!(openings.buckets[0].counts.losses, 4);
}

#[tokio::test]
async fn shared_positions_are_evaluated_once() {
    let dir = tempfile::tempdir().unwrap();
    let data = DataDir::new(dir.path());
    let evaluator = Arc::new(LopsidedEvaluator::new());
    let games: Vec<GameRecord> = (0..5).map(lost_game).collect();

    let outcome = run_batch(&data, evaluator.clone(), games, false).await;
    let distinct: HashSet<String> = chess::replay(&forty_plies())
        .unwrap()
        .iter()
        .map(|p| p.fingerprint().to_string())
        .collect();
    let distinct = distinct.len();
    // The knight shuffle repeats positions within and across games.
    assert!(distinct < 41);
    assert_eq!(evaluator.calls.load(Ordering::SeqCst), distinct);
    assert_eq!(outcome.summary.cache.misses as usize, distinct);
    assert_eq!(outcome.summary.cache.hits as usize, 5 * 41 - distinct);
}

#[tokio::test]
async fn malformed_game_is_skipped_and_reported() {
    let dir = tempfile::tempdir().unwrap();
    let data = DataDir::new(dir.path());
    let mut games: Vec<GameRecord> = (0..5).map(lost_game).collect();
    let mut broken = lost_game(9);
    broken.id = "broken".into();
    broken.moves = vec!["e4".into(), "e5".into(), "Ke3".into()];
    games.push(broken);

    let outcome = run_batch(&data, Arc::new(LopsidedEvaluator::new()), games, false).await;
    assert_eq!(outcome.summary.analyzed, 5);
    assert_eq!(outcome.summary.malformed.len(), 1);
    assert_eq!(outcome.summary.malformed[0].game_id, "broken");
    assert_eq!(outcome.summary.malformed[0].ply, 3);
    assert_eq!(outcome.openings.unwrap().total_games, 5);
    assert!(!stored_path(&data, "broken").exists());
}

#[tokio::test]
async fn second_run_reuses_stored_analyses() {
    let dir = tempfile::tempdir().unwrap();
    let data = DataDir::new(dir.path());
    let games: Vec<GameRecord> = (0..5).map(lost_game).collect();
    run_batch(&data, Arc::new(LopsidedEvaluator::new()), games.clone(), false).await;

    let evaluator = Arc::new(LopsidedEvaluator::new());
    let outcome = run_batch(&data, evaluator.clone(), games, false).await;
    assert_eq!(outcome.summary.reused, 5);
    assert_eq!(outcome.summary.analyzed, 0);
    assert_eq!(evaluator.calls.load(Ordering::SeqCst), 0);
    assert_eq!(outcome.openings.unwrap().total_games, 5);
    assert!(outcome
        .weaknesses
        .unwrap()
        .entries
        .iter()
        .any(|e| matches!(e.category, WeaknessCategory::Opening { .. })));
}

#[tokio::test]
async fn cancelled_batch_leaves_aggregates_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let data = DataDir::new(dir.path());
    let games: Vec<GameRecord> = (0..5).map(lost_game).collect();

    let outcome = run_batch(&data, Arc::new(LopsidedEvaluator::new()), games, true).await;
    assert!(outcome.summary.cancelled);
    assert_eq!(outcome.summary.analyzed, 0);
    assert!(outcome.openings.is_none());
    assert!(outcome.weaknesses.is_none());
    assert!(!data.opening_report().exists());
    assert!(!data.weakness_report().exists());
    assert!(!data.batch_summary().exists());
}

#[tokio::test]
async fn degraded_analyses_are_redone_on_the_next_run() {
    let dir = tempfile::tempdir().unwrap();
    let data = DataDir::new(dir.path());
    let games: Vec<GameRecord> = (0..5).map(lost_game).collect();

    // Same evaluator version, but every call fails.
    let down = run_batch(&data, Arc::new(LopsidedEvaluator::failing(usize::MAX)), games.clone(), false).await;
    assert_eq!(down.summary.analyzed, 5);
    assert_eq!(down.summary.degraded_plies, 5 * 40);
    assert!(stored_path(&data, "g0").exists());

    let evaluator = Arc::new(LopsidedEvaluator::new());
    let outcome = run_batch(&data, evaluator.clone(), games, false).await;
    assert_eq!(outcome.summary.reused, 0);
    assert_eq!(outcome.summary.analyzed, 5);
    assert_eq!(outcome.summary.degraded_plies, 0);
    assert!(evaluator.calls.load(Ordering::SeqCst) > 0);
    for analysis in &outcome.analyses {
        assert_eq!(analysis.moves[0].classification, MoveClassification::Blunder);
    }
}

#[tokio::test]
async fn failed_positions_get_a_second_pass() {
    let dir = tempfile::tempdir().unwrap();
    let data = DataDir::new(dir.path());
    let games: Vec<GameRecord> = (0..5).map(lost_game).collect();

    // Both attempts on the start position fail; every game waits on that one
    // evaluation and comes back with ply 1 degraded.
    let evaluator = Arc::new(LopsidedEvaluator::failing(2));
    let outcome = run_batch(&data, evaluator, games, false).await;

    assert_eq!(outcome.summary.cache.unavailable, 1);
    assert_eq!(outcome.summary.retried, 5);
    assert_eq!(outcome.summary.degraded_plies, 0);
    for analysis in &outcome.analyses {
        assert_eq!(analysis.degraded_plies, 0);
        assert_eq!(analysis.moves[0].centipawn_loss, Some(350));
    }
    let stored = JsonStore::<GameAnalysis>::new(data.analyses());
    assert_eq!(stored.load("g0").unwrap().unwrap().degraded_plies, 0);
}

#[tokio::test]
async fn evaluator_outage_still_tags_tactics() {
    let dir = tempfile::tempdir().unwrap();
    let data = DataDir::new(dir.path());
    let games: Vec<GameRecord> = (0..5).map(mated_game).collect();

    let outcome = run_batch(&data, Arc::new(LopsidedEvaluator::failing(usize::MAX)), games, false).await;
    assert_eq!(outcome.summary.analyzed, 5);
    assert_eq!(outcome.summary.retried, 5);
    assert_eq!(outcome.summary.degraded_plies, 5 * 7);
    assert!(outcome.summary.cache.unavailable > 0);

    for analysis in &outcome.analyses {
        assert!(analysis
            .moves
            .iter()
            .all(|m| m.classification == MoveClassification::Unknown && m.centipawn_loss.is_none()));
        assert_eq!(analysis.white_accuracy, None);
        assert_eq!(analysis.black_accuracy, None);
        assert!(analysis.moves[6]
            .tactics
            .iter()
            .any(|t| t.kind == TacticalTagKind::Checkmate));
    }

    let weaknesses = outcome.weaknesses.unwrap();
    let mated = weaknesses
        .entries
        .iter()
        .find(|e| {
            e.category
                == WeaknessCategory::TacticalPattern {
                    motif: TacticalTagKind::Checkmate,
                }
        })
        .expect("checkmates suffered are reported");
    assert_eq!(mated.hits, 5);
    assert!(mated.evidence.iter().all(|e| e.plies == vec![7]));
    assert_eq!(
        weaknesses.tactical_patterns.get(TacticalTagKind::Checkmate).unwrap().against_player,
        5
    );
}

#[tokio::test]
async fn cancelling_mid_batch_keeps_finished_games_only() {
    let dir = tempfile::tempdir().unwrap();
    let data = DataDir::new(dir.path());
    let games: Vec<GameRecord> = (0..5).map(lost_game).collect();

    // One worker; the first evaluation requests cancellation, which is
    // honoured once the game in hand is finished.
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let evaluator = Arc::new(LopsidedEvaluator::cancelling(cancel_tx));
    let outcome = run_with(&data, evaluator, games, config_with_workers(1), cancel_rx).await;

    assert!(outcome.summary.cancelled);
    assert_eq!(outcome.summary.analyzed, 1);
    assert_eq!(outcome.analyses.len(), 1);
    assert_eq!(outcome.analyses[0].game_id, "g0");
    assert_eq!(outcome.analyses[0].moves.len(), 40);
    assert!(stored_path(&data, "g0").exists());
    assert!(!stored_path(&data, "g1").exists());

    assert!(outcome.openings.is_none());
    assert!(!data.opening_report().exists());
    assert!(!data.weakness_report().exists());
    assert!(!data.batch_summary().exists());
    assert!(!data.evaluation_cache().exists());
    assert!(!data.history().exists());
}

#[tokio::test]
async fn first_run_history_reaches_the_second_trend() {
    let dir = tempfile::tempdir().unwrap();
    let data = DataDir::new(dir.path());
    let first: Vec<GameRecord> = (0..5).map(lost_game).collect();
    run_batch(&data, Arc::new(LopsidedEvaluator::new()), first, false).await;

    let history = HistoryStore::new(data.history()).load().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].timestamp, lost_game(4).timestamp);

    // Two months on: four losses and a win in the same opening.
    let later: Vec<GameRecord> = (0..5)
        .map(|i| {
            let mut g = lost_game(10 + i);
            g.timestamp += 60 * 86_400;
            if i == 0 {
                g.result = GameResult::WhiteWins;
            }
            g
        })
        .collect();
    let outcome = run_batch(&data, Arc::new(LopsidedEvaluator::new()), later, false).await;

    let opening = outcome
        .weaknesses
        .unwrap()
        .entries
        .into_iter()
        .find(|e| matches!(e.category, WeaknessCategory::Opening { .. }))
        .expect("losing opening reported");
    assert_eq!(opening.trend.points.len(), 2);
    assert_eq!(opening.trend.points[0].sample, 0);
    assert_eq!(opening.trend.points[0].rate, 1.0);
    assert_eq!(opening.trend.direction, TrendDirection::Improving);
    assert_eq!(HistoryStore::new(data.history()).load().unwrap().len(), 2);
}
