//! `chess-insights`: analyse a player's games and write the per-game,
//! opening and weakness documents into the data directory.

use std::path::PathBuf;
use std::sync::Arc;

use analysis::ReferenceOpeningDatabase;
use clap::{Parser, Subcommand};
use engine::StockfishEvaluator;
use insights_pipeline::batch::BatchRunner;
use insights_pipeline::cache::EvaluationCache;
use insights_pipeline::config::{self, PipelineConfig, SourceSettings};
use insights_pipeline::persistence::DataDir;
use insights_pipeline::reference::{JsonReferenceDatabase, NoReference};
use insights_pipeline::source::{GameSource, JsonGameSource, PgnDirectorySource};
use tokio::sync::watch;

#[derive(Parser)]
#[command(name = "chess-insights", about = "Engine-backed analysis of a player's games")]
struct Cli {
    /// Data directory; overrides INSIGHTS_DATA_DIR.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Defaults to `run`.
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyse every game from the configured source.
    Run {
        /// Read games from this PGN directory instead of the configured source.
        #[arg(long, requires = "username")]
        pgn_dir: Option<PathBuf>,
        /// Player whose side the PGN games are seen from.
        #[arg(long)]
        username: Option<String>,
    },
    /// Delete the persisted evaluation cache, e.g. after a schema change.
    InvalidateCache,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use tracing_subscriber::fmt::format::FmtSpan;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_span_events(FmtSpan::CLOSE)
        .init();

    let cli = Cli::parse();
    let data = DataDir::new(cli.data_dir.unwrap_or_else(config::get_data_dir));
    tracing::info!("Using data directory: {}", data.root().display());

    match cli.command.unwrap_or(Commands::Run {
        pgn_dir: None,
        username: None,
    }) {
        Commands::InvalidateCache => invalidate_cache(&data),
        Commands::Run { pgn_dir, username } => {
            let mut config = PipelineConfig::load(data.root())?;
            if let (Some(dir), Some(username)) = (pgn_dir, username) {
                config.source = SourceSettings::PgnDir { dir, username };
            }
            run(config, data).await
        }
    }
}

fn invalidate_cache(data: &DataDir) -> anyhow::Result<()> {
    let path = data.evaluation_cache();
    match std::fs::remove_file(&path) {
        Ok(()) => tracing::info!(path = %path.display(), "Evaluation cache deleted"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!("No evaluation cache to delete")
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

async fn run(config: PipelineConfig, data: DataDir) -> anyhow::Result<()> {
    let source: Box<dyn GameSource> = match &config.source {
        SourceSettings::Json => Box::new(JsonGameSource::new(data.games())),
        SourceSettings::PgnDir { dir, username } => {
            Box::new(PgnDirectorySource::new(dir.clone(), username.clone()))
        }
    };
    let games = source.load_games()?;
    if games.is_empty() {
        tracing::warn!("No games to analyse");
        return Ok(());
    }

    let reference: Box<dyn ReferenceOpeningDatabase> = {
        let path = data.reference_openings();
        if !path.exists() {
            tracing::info!("No reference opening database, using colour baselines");
            Box::new(NoReference)
        } else {
            match JsonReferenceDatabase::load(&path) {
                Ok(db) => Box::new(db),
                Err(e) => {
                    tracing::warn!("Reference opening database unusable, using colour baselines: {}", e);
                    Box::new(NoReference)
                }
            }
        }
    };

    let evaluator = Arc::new(StockfishEvaluator::spawn((&config.engine).into()).await?);
    let cache = Arc::new(EvaluationCache::new(evaluator.clone(), config.retry.clone()));

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight games");
            let _ = cancel_tx.send(true);
        }
    });

    let runner = BatchRunner::new(config, data.clone(), cache, cancel_rx);
    let outcome = runner.run(games, reference.as_ref()).await?;
    drop(runner);

    let summary = &outcome.summary;
    println!(
        "{} analysed, {} reused, {} retried, {} malformed, {} degraded plies",
        summary.analyzed,
        summary.reused,
        summary.retried,
        summary.malformed.len(),
        summary.degraded_plies
    );
    if let Some(weaknesses) = &outcome.weaknesses {
        for entry in &weaknesses.entries {
            println!("[{:?}] {}", entry.severity, entry.description);
        }
        let patterns = &weaknesses.tactical_patterns;
        let common: Vec<String> = patterns
            .most_common(5)
            .iter()
            .map(|p| format!("{} x{}", p.motif, p.occurrences))
            .collect();
        println!(
            "{:.1} tactical motifs per game: {}",
            patterns.richness,
            common.join(", ")
        );
        println!("Reports written to {}", data.root().display());
    } else {
        println!("Cancelled; reports not updated");
    }

    if let Ok(engine) = Arc::try_unwrap(evaluator) {
        engine.shutdown().await;
    }
    Ok(())
}
