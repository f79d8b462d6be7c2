//! Snapshot persistence.
//!
//! A whole [`SessionState`] is stored as one JSON record under a single
//! named key of a [`BlobStore`]. Loading is soft: anything unreadable is
//! logged, discarded and reported as "no save".

use crate::state::SessionState;
use async_trait::async_trait;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;

/// Key the snapshot is stored under.
pub const SAVE_KEY: &str = "noir_detective_save";

/// Current snapshot format version.
const SAVE_VERSION: u32 = 1;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

/// A get/set/delete store of string records keyed by name.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, PersistError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), PersistError>;

    /// Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), PersistError>;
}

/// One `<key>.json` file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    dir: PathBuf,
}

impl FileBlobStore {
    /// The directory is created on first write.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `key`. Anything but alphanumerics, `-` and `_` becomes `_`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let sanitized = key
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect::<String>();
        self.dir.join(format!("{sanitized}.json"))
    }
}

#[async_trait]
impl BlobStore for FileBlobStore {
    async fn get(&self, key: &str) -> Result<Option<String>, PersistError> {
        match fs::read_to_string(self.path_for(key)).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), PersistError> {
        fs::create_dir_all(&self.dir).await?;
        fs::write(self.path_for(key), value).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), PersistError> {
        match fs::remove_file(self.path_for(key)).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

/// In-process store, for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, key: &str) -> Result<Option<String>, PersistError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), PersistError> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), PersistError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

/// A stored snapshot of a case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedSession {
    /// Save format version for compatibility checking.
    pub version: u32,

    /// Human-readable local time of the save.
    pub saved_at: String,

    #[serde(flatten)]
    pub state: SessionState,
}

impl SavedSession {
    pub fn new(state: SessionState) -> Self {
        Self {
            version: SAVE_VERSION,
            saved_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            state,
        }
    }

    pub fn to_json(&self) -> Result<String, PersistError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse and version-check a record.
    pub fn from_json(content: &str) -> Result<Self, PersistError> {
        let saved: Self = serde_json::from_str(content)?;
        if saved.version != SAVE_VERSION {
            return Err(PersistError::VersionMismatch {
                expected: SAVE_VERSION,
                found: saved.version,
            });
        }
        Ok(saved)
    }
}

/// Write a snapshot of `state`. Returns the `saved_at` stamp.
pub async fn save_session(
    store: &dyn BlobStore,
    state: &SessionState,
) -> Result<String, PersistError> {
    let saved = SavedSession::new(state.clone());
    store.set(SAVE_KEY, &saved.to_json()?).await?;
    log::debug!("saved {} diary entries", state.transcript.len());
    Ok(saved.saved_at)
}

/// Read the snapshot, if there is a usable one.
///
/// Corrupt or incompatible records are deleted. Nothing here returns an
/// error to the caller.
pub async fn load_session(store: &dyn BlobStore) -> Option<SessionState> {
    let content = match store.get(SAVE_KEY).await {
        Ok(Some(content)) => content,
        Ok(None) => return None,
        Err(e) => {
            log::warn!("could not read save: {e}");
            return None;
        }
    };

    match SavedSession::from_json(&content) {
        Ok(saved) => Some(saved.state),
        Err(e) => {
            log::warn!("discarding unreadable save: {e}");
            if let Err(e) = store.delete(SAVE_KEY).await {
                log::warn!("could not delete unreadable save: {e}");
            }
            None
        }
    }
}

/// The `saved_at` stamp of the snapshot without loading the full state.
pub async fn peek_saved_at(store: &dyn BlobStore) -> Option<String> {
    // Parse just enough to get the stamp
    #[derive(Deserialize)]
    struct Partial {
        version: u32,
        saved_at: String,
    }

    let content = store.get(SAVE_KEY).await.ok()??;
    let partial: Partial = serde_json::from_str(&content).ok()?;
    (partial.version == SAVE_VERSION).then_some(partial.saved_at)
}

/// Remove the snapshot.
pub async fn clear_session(store: &dyn BlobStore) -> Result<(), PersistError> {
    store.delete(SAVE_KEY).await
}
