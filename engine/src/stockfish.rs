use crate::evaluator::{EvaluationError, PositionEvaluation, PositionEvaluator};
use crate::uci::{parse_uci_message, UciError, UciMessage};
use chess::{AnalysisScore, Position};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::Mutex;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for the Stockfish-backed evaluator.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Explicit binary; searched for in common locations when `None`.
    pub path: Option<PathBuf>,
    /// Fixed search depth for every evaluation.
    pub depth: u8,
    pub threads: Option<u32>,
    pub hash_mb: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: None,
            depth: 16,
            threads: None,
            hash_mb: None,
        }
    }
}

/// A running engine process speaking UCI over stdin/stdout.
struct UciProcess {
    child: Child,
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
}

impl UciProcess {
    async fn send(&mut self, cmd: &str) -> Result<(), UciError> {
        tracing::trace!("UCI >> {}", cmd);
        self.stdin.write_all(cmd.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;
        Ok(())
    }

    /// Next message the parser understands; unknown lines are skipped.
    async fn next_message(&mut self) -> Result<UciMessage, UciError> {
        loop {
            let Some(line) = self.lines.next_line().await? else {
                tracing::warn!("Stockfish stdout EOF - engine closed");
                return Err(UciError::Closed);
            };
            let trimmed = line.trim();
            tracing::trace!("UCI << {}", trimmed);
            match parse_uci_message(trimmed) {
                Ok(msg) => return Ok(msg),
                Err(e) => tracing::trace!("Ignoring UCI line: {}", e),
            }
        }
    }

    async fn wait_for(
        &mut self,
        expected: &'static str,
        matches: impl Fn(&UciMessage) -> bool,
    ) -> Result<(), UciError> {
        let wait = async {
            loop {
                let msg = self.next_message().await?;
                if matches(&msg) {
                    break;
                }
            }
            Ok::<(), UciError>(())
        };
        tokio::time::timeout(HANDSHAKE_TIMEOUT, wait)
            .await
            .map_err(|_| UciError::HandshakeTimeout(expected))?
    }

    /// Make sure no output from an earlier, abandoned search is pending.
    async fn sync(&mut self) -> Result<(), UciError> {
        self.send("stop").await?;
        self.send("isready").await?;
        self.wait_for("isready", |m| matches!(m, UciMessage::ReadyOk)).await
    }
}

/// Evaluates positions with a local Stockfish at a fixed depth.
///
/// One process per evaluator; concurrent calls queue on the process lock.
pub struct StockfishEvaluator {
    process: Mutex<UciProcess>,
    depth: u8,
    version: String,
}

impl StockfishEvaluator {
    #[tracing::instrument(level = "info")]
    pub async fn spawn(config: EngineConfig) -> Result<Self, UciError> {
        let path = match config.path.clone() {
            Some(path) => path,
            None => find_stockfish_path().ok_or(UciError::NotFound)?,
        };
        tracing::info!("Found Stockfish at: {:?}", path);

        let mut child = tokio::process::Command::new(&path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                tracing::error!("Failed to spawn Stockfish: {}", e);
                UciError::Io(e)
            })?;
        let stdin = child.stdin.take().ok_or(UciError::NoStdin)?;
        let stdout = child.stdout.take().ok_or(UciError::NoStdout)?;

        let mut process = UciProcess {
            child,
            stdin,
            lines: BufReader::new(stdout).lines(),
        };

        process.send("uci").await?;
        process
            .wait_for("uci", |m| matches!(m, UciMessage::UciOk))
            .await?;

        if let Some(threads) = config.threads {
            let threads = threads.clamp(1, 16);
            tracing::info!("Setting Threads to {}", threads);
            process
                .send(&format!("setoption name Threads value {}", threads))
                .await?;
        }
        if let Some(hash_mb) = config.hash_mb {
            let hash_mb = hash_mb.clamp(1, 2048);
            tracing::info!("Setting Hash to {} MB", hash_mb);
            process
                .send(&format!("setoption name Hash value {}", hash_mb))
                .await?;
        }
        process.send("ucinewgame").await?;
        process.sync().await?;

        tracing::info!(depth = config.depth, "Stockfish evaluator ready");
        Ok(Self {
            process: Mutex::new(process),
            depth: config.depth,
            version: format!("stockfish-d{}", config.depth),
        })
    }

    /// Search `fen` to the configured depth, returning the last reported
    /// score, the best move and the depth reached.
    async fn search(&self, fen: &str) -> Result<(AnalysisScore, Option<String>, Option<u8>), UciError> {
        let mut process = self.process.lock().await;
        process.sync().await?;
        process.send(&format!("position fen {}", fen)).await?;
        process.send(&format!("go depth {}", self.depth)).await?;

        let mut score = None;
        let mut depth = None;
        loop {
            match process.next_message().await? {
                UciMessage::Info(info) if info.multipv.unwrap_or(1) == 1 => {
                    if info.score.is_some() {
                        score = info.score;
                        depth = info.depth.or(depth);
                    }
                }
                UciMessage::BestMove { mv, .. } => {
                    tracing::debug!(best_move = ?mv, ?score, "search finished");
                    return Ok((score.ok_or(UciError::NoScore)?, mv, depth));
                }
                _ => {}
            }
        }
    }

    /// Shutdown the engine
    pub async fn shutdown(self) {
        let mut process = self.process.into_inner();
        let _ = process.send("quit").await;
        let _ = tokio::time::timeout(Duration::from_secs(1), process.child.wait()).await;
        let _ = process.child.kill().await;
    }
}

impl PositionEvaluator for StockfishEvaluator {
    fn version(&self) -> &str {
        &self.version
    }

    fn evaluate(
        &self,
        position: &Position,
    ) -> impl Future<Output = Result<PositionEvaluation, EvaluationError>> + Send {
        let fen = position.fen().to_string();
        let fingerprint = position.fingerprint().to_string();
        async move {
            let (score, best_move, depth) = self.search(&fen).await.map_err(|e| {
                tracing::warn!(%fingerprint, "Stockfish evaluation failed: {}", e);
                EvaluationError::Unavailable(e.to_string())
            })?;
            Ok(PositionEvaluation {
                fingerprint,
                score,
                best_move,
                depth,
            })
        }
    }
}

/// Find Stockfish executable in common locations
fn find_stockfish_path() -> Option<PathBuf> {
    let paths = [
        "/usr/local/bin/stockfish",
        "/usr/bin/stockfish",
        "/opt/homebrew/bin/stockfish",
        "/usr/games/stockfish",
        "stockfish", // In PATH
    ];

    for path_str in paths {
        let path = Path::new(path_str);
        if (path.exists() || path_str == "stockfish")
            && std::process::Command::new(path_str)
                .arg("--help")
                .output()
                .is_ok()
        {
            return Some(PathBuf::from(path_str));
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_searches_to_depth_sixteen() {
        let config = EngineConfig::default();
        assert_eq!(config.depth, 16);
        assert!(config.path.is_none());
    }

    #[tokio::test]
    #[ignore = "requires a stockfish binary"]
    async fn evaluates_the_start_position() {
        let engine = StockfishEvaluator::spawn(EngineConfig {
            depth: 8,
            ..Default::default()
        })
        .await
        .unwrap();
        assert_eq!(engine.version(), "stockfish-d8");

        let eval = engine.evaluate(&Position::start()).await.unwrap();
        assert!(eval.best_move.is_some());
        assert!(matches!(eval.score, AnalysisScore::Centipawns(cp) if cp.abs() < 150));
        engine.shutdown().await;
    }
}
