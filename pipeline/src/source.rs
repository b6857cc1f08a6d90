//! Game Source adapters: where completed games come from.

use std::path::{Path, PathBuf};

use chess::{parse_pgn_games, GameRecord, PgnError};

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid games file {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid PGN in {path}: {source}")]
    Pgn { path: PathBuf, source: PgnError },
}

/// Supplies the player's games, oldest first.
pub trait GameSource: Send + Sync {
    fn load_games(&self) -> Result<Vec<GameRecord>, SourceError>;
}

impl GameSource for Vec<GameRecord> {
    fn load_games(&self) -> Result<Vec<GameRecord>, SourceError> {
        Ok(self.clone())
    }
}

fn read(path: &Path) -> Result<String, SourceError> {
    std::fs::read_to_string(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn sort_by_time(games: &mut [GameRecord]) {
    games.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
}

/// A JSON array of game records.
pub struct JsonGameSource {
    path: PathBuf,
}

impl JsonGameSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl GameSource for JsonGameSource {
    fn load_games(&self) -> Result<Vec<GameRecord>, SourceError> {
        if !self.path.exists() {
            tracing::warn!(path = %self.path.display(), "Games file not found, nothing to analyse");
            return Ok(Vec::new());
        }
        let mut games: Vec<GameRecord> =
            serde_json::from_str(&read(&self.path)?).map_err(|source| SourceError::Json {
                path: self.path.clone(),
                source,
            })?;
        sort_by_time(&mut games);
        Ok(games)
    }
}

/// Every `*.pgn` file in a directory, seen from one player's side. Games the
/// player did not take part in, or without a result, are skipped.
pub struct PgnDirectorySource {
    dir: PathBuf,
    username: String,
}

impl PgnDirectorySource {
    pub fn new(dir: PathBuf, username: impl Into<String>) -> Self {
        Self {
            dir,
            username: username.into(),
        }
    }
}

impl GameSource for PgnDirectorySource {
    fn load_games(&self) -> Result<Vec<GameRecord>, SourceError> {
        let io_err = |source| SourceError::Io {
            path: self.dir.clone(),
            source,
        };
        let mut files: Vec<PathBuf> = std::fs::read_dir(&self.dir)
            .map_err(io_err)?
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("pgn"))
            .collect();
        files.sort();

        let mut games = Vec::new();
        for path in files {
            let parsed = parse_pgn_games(&read(&path)?).map_err(|source| SourceError::Pgn {
                path: path.clone(),
                source,
            })?;
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("game")
                .to_string();
            for (index, pgn) in parsed.iter().enumerate() {
                let id = pgn
                    .tag("Link")
                    .or_else(|| pgn.tag("Site").filter(|s| s.starts_with("http")))
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{stem}-{}", index + 1));
                match GameRecord::from_pgn(&id, pgn, &self.username) {
                    Ok(game) => games.push(game),
                    Err(e) => tracing::warn!(file = %path.display(), index, "Skipping PGN game: {}", e),
                }
            }
        }
        sort_by_time(&mut games);
        Ok(games)
    }
}
