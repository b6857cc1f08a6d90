use super::{read_document, write_document, PersistenceError};
use analysis::{HistorySnapshot, VersionedDocument, SCHEMA_VERSION};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Snapshots kept on disk; the oldest are dropped beyond this.
pub const MAX_SNAPSHOTS: usize = 120;

/// Persisted form of the history store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryDocument {
    pub schema_version: u32,
    /// Oldest first.
    pub snapshots: Vec<HistorySnapshot>,
}

impl VersionedDocument for HistoryDocument {
    const KIND: &'static str = "history";

    fn schema_version(&self) -> u32 {
        self.schema_version
    }
}

/// Timestamped weakness rates from earlier batches, oldest first.
pub struct HistoryStore {
    path: PathBuf,
    capacity: usize,
}

impl HistoryStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            capacity: MAX_SNAPSHOTS,
        }
    }

    pub fn with_capacity(path: PathBuf, capacity: usize) -> Self {
        Self {
            path,
            capacity: capacity.max(1),
        }
    }

    pub fn load(&self) -> Result<Vec<HistorySnapshot>, PersistenceError> {
        Ok(read_document::<HistoryDocument>(&self.path)?
            .map(|doc| doc.snapshots)
            .unwrap_or_default())
    }

    /// Add `snapshot`, replacing one recorded at the same timestamp.
    pub fn append(&self, snapshot: HistorySnapshot) -> Result<(), PersistenceError> {
        let mut snapshots = self.load()?;
        snapshots.retain(|s| s.timestamp != snapshot.timestamp);
        snapshots.push(snapshot);
        snapshots.sort_by_key(|s| s.timestamp);
        if snapshots.len() > self.capacity {
            let excess = snapshots.len() - self.capacity;
            snapshots.drain(..excess);
        }
        write_document(
            &self.path,
            &HistoryDocument {
                schema_version: SCHEMA_VERSION,
                snapshots,
            },
        )
    }
}
