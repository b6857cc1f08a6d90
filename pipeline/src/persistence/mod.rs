mod history;
mod json_store;

pub use history::{HistoryDocument, HistoryStore, MAX_SNAPSHOTS};
pub use json_store::{JsonStore, Storable};

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use analysis::{decode_document, DocumentError, VersionedDocument};

/// Errors from the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Document error: {0}")]
    Document(#[from] DocumentError),
    #[error("{} has {kind} schema version {found}, expected {expected}; delete it to rebuild", path.display())]
    SchemaVersionMismatch {
        path: PathBuf,
        kind: &'static str,
        found: u32,
        expected: u32,
    },
}

/// File layout under the data directory.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn games(&self) -> PathBuf {
        self.root.join("games.json")
    }

    pub fn analyses(&self) -> PathBuf {
        self.root.join("analyses")
    }

    pub fn opening_report(&self) -> PathBuf {
        self.root.join("openings.json")
    }

    pub fn weakness_report(&self) -> PathBuf {
        self.root.join("weaknesses.json")
    }

    pub fn batch_summary(&self) -> PathBuf {
        self.root.join("batch_summary.json")
    }

    pub fn evaluation_cache(&self) -> PathBuf {
        self.root.join("evaluation_cache.json")
    }

    pub fn history(&self) -> PathBuf {
        self.root.join("history.json")
    }

    pub fn reference_openings(&self) -> PathBuf {
        self.root.join("reference_openings.json")
    }
}

/// Replace `path` with `contents` in one step: the data goes to a temporary
/// file in the same directory which is then renamed over the target.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), PersistenceError> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

pub fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), PersistenceError> {
    let json = serde_json::to_string_pretty(value)?;
    write_atomic(path, json.as_bytes())
}

pub fn write_document<T: VersionedDocument>(path: &Path, document: &T) -> Result<(), PersistenceError> {
    write_json(path, document)
}

/// Load a versioned document. `Ok(None)` when the file does not exist.
pub fn read_document<T: VersionedDocument>(path: &Path) -> Result<Option<T>, PersistenceError> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path)?;
    match decode_document(&contents) {
        Ok(document) => Ok(Some(document)),
        Err(DocumentError::SchemaVersionMismatch {
            kind,
            found,
            expected,
        }) => Err(PersistenceError::SchemaVersionMismatch {
            path: path.to_path_buf(),
            kind,
            found,
            expected,
        }),
        Err(e) => Err(e.into()),
    }
}

/// Get the current unix timestamp in seconds.
pub fn now_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
