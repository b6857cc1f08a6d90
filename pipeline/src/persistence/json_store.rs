use super::{write_document, PersistenceError};
use analysis::{decode_document, GameAnalysis, VersionedDocument};
use sha2::{Digest, Sha256};
use std::marker::PhantomData;
use std::path::PathBuf;

/// Long ids (game URLs) are cut here in file names; the digest tells them apart.
const MAX_READABLE_CHARS: usize = 64;

/// Trait for documents that can be persisted in a JsonStore.
pub trait Storable: VersionedDocument {
    fn id(&self) -> &str;
}

impl Storable for GameAnalysis {
    fn id(&self) -> &str {
        &self.game_id
    }
}

/// Generic JSON-file-per-record persistence store.
pub struct JsonStore<T> {
    dir: PathBuf,
    _phantom: PhantomData<T>,
}

impl<T: Storable> JsonStore<T> {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            _phantom: PhantomData,
        }
    }

    /// `<readable id>-<digest>.json`. The readable part keeps only
    /// `[A-Za-z0-9_-]`; the digest of the raw id keeps ids that sanitise
    /// alike on separate files.
    pub fn file_path(&self, id: &str) -> PathBuf {
        let readable: String = id
            .chars()
            .take(MAX_READABLE_CHARS)
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        let digest = Sha256::digest(id.as_bytes());
        self.dir.join(format!("{}-{}.json", readable, hex::encode(&digest[..8])))
    }

    /// Save a record atomically. Returns the id.
    pub fn save(&self, data: &T) -> Result<String, PersistenceError> {
        write_document(&self.file_path(data.id()), data)?;
        Ok(data.id().to_string())
    }

    /// Load a record by id. Returns None if not found, written under
    /// another schema version, or holding a different id.
    pub fn load(&self, id: &str) -> Result<Option<T>, PersistenceError> {
        let path = self.file_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)?;
        match decode_document::<T>(&contents) {
            Ok(data) if data.id() == id => Ok(Some(data)),
            Ok(data) => {
                tracing::warn!(id, found = data.id(), "Stored record belongs to another id");
                Ok(None)
            }
            Err(analysis::DocumentError::SchemaVersionMismatch { found, .. }) => {
                tracing::debug!(id, found, "Ignoring record with stale schema");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}
