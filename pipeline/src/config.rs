//! Configuration for the insights pipeline
//!
//! Every tunable has a compiled-in default. An optional `config.json` in the
//! data directory overrides the defaults, and environment variables override
//! the file:
//!
//! - `INSIGHTS_DATA_DIR` (else `~/.config/chess-insights/data`, else `./data`)
//! - `INSIGHTS_WORKERS`
//! - `INSIGHTS_ENGINE_DEPTH`
//! - `INSIGHTS_EVAL_TIMEOUT_MS`
//! - `INSIGHTS_EVAL_ATTEMPTS`

use std::path::{Path, PathBuf};
use std::time::Duration;

use analysis::{RatingBand, WeaknessConfig};
use serde::{Deserialize, Serialize};

const DEFAULT_CONFIG_DIR: &str = ".config/chess-insights/data";
const DEV_DATA_DIR: &str = "./data";
pub const CONFIG_FILE: &str = "config.json";

/// Get the data directory for persistence.
///
/// Priority:
/// 1. INSIGHTS_DATA_DIR env variable if set
/// 2. $HOME/.config/chess-insights/data if HOME is set
/// 3. ./data as fallback
pub fn get_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("INSIGHTS_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(DEFAULT_CONFIG_DIR);
    }

    PathBuf::from(DEV_DATA_DIR)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Timeout and retry budget for evaluator calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub timeout_ms: u64,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout_ms: 10_000,
            initial_backoff_ms: 200,
            max_backoff_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Wait before retry number `retry` (1-based), doubling up to the cap.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64 << retry.saturating_sub(1).min(20);
        Duration::from_millis(
            self.initial_backoff_ms
                .saturating_mul(factor)
                .min(self.max_backoff_ms),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Explicit Stockfish binary.
    pub path: Option<PathBuf>,
    pub depth: u8,
    pub threads: Option<u32>,
    pub hash_mb: Option<u32>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            path: None,
            depth: 16,
            threads: Some(1),
            hash_mb: Some(64),
        }
    }
}

impl From<&EngineSettings> for engine::EngineConfig {
    fn from(settings: &EngineSettings) -> Self {
        engine::EngineConfig {
            path: settings.path.clone(),
            depth: settings.depth,
            threads: settings.threads,
            hash_mb: settings.hash_mb,
        }
    }
}

/// Where games come from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceSettings {
    /// `games.json` in the data directory.
    #[default]
    Json,
    /// Every `*.pgn` file in `dir`, seen from `username`'s side.
    PgnDir { dir: PathBuf, username: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub workers: usize,
    pub retry: RetryPolicy,
    pub engine: EngineSettings,
    pub weakness: WeaknessConfig,
    /// Reference band used when a game carries no player rating.
    pub rating_band: RatingBand,
    pub source: SourceSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            retry: RetryPolicy::default(),
            engine: EngineSettings::default(),
            weakness: WeaknessConfig::default(),
            rating_band: RatingBand::default(),
            source: SourceSettings::default(),
        }
    }
}

impl PipelineConfig {
    /// Defaults, then `config.json` in `data_dir` if present, then the
    /// process environment.
    pub fn load(data_dir: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(&data_dir.join(CONFIG_FILE))?;
        config.apply_env(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(v) = parse_env(&lookup, "INSIGHTS_WORKERS")? {
            self.workers = v;
        }
        if let Some(v) = parse_env(&lookup, "INSIGHTS_ENGINE_DEPTH")? {
            self.engine.depth = v;
        }
        if let Some(v) = parse_env(&lookup, "INSIGHTS_EVAL_TIMEOUT_MS")? {
            self.retry.timeout_ms = v;
        }
        if let Some(v) = parse_env(&lookup, "INSIGHTS_EVAL_ATTEMPTS")? {
            self.retry.max_attempts = v;
        }
        self.workers = self.workers.max(1);
        self.retry.max_attempts = self.retry.max_attempts.max(1);
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { var, value }),
    }
}
