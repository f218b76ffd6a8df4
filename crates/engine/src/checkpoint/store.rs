//! Key-value storage and the checkpoint slot on top of it.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use thiserror::Error;
use tracing::debug;

use super::types::JobState;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("corrupt value at '{key}': {reason}")]
    Corrupt { key: String, reason: String },
}

/// Durable string key-value storage.
///
/// Every `put` must be durable once it returns; a crash after `put` returns
/// never loses the value.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;
    /// Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<(), StoreError>;
}

impl<S> KeyValueStore for Arc<S>
where
    S: KeyValueStore + ?Sized,
{
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).put(key, value)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete(key)
    }
}

/// In-memory store (for tests/dev).
#[derive(Debug, Default)]
pub struct InMemoryKeyValueStore {
    entries: RwLock<HashMap<String, String>>,
    writes: RwLock<u64>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of `put` calls so far.
    pub fn writes(&self) -> u64 {
        self.writes.read().map(|w| *w).unwrap_or(0)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .read()
            .map(|e| e.contains_key(key))
            .unwrap_or(false)
    }
}

impl KeyValueStore for InMemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))?;
        entries.insert(key.to_string(), value.to_string());
        if let Ok(mut writes) = self.writes.write() {
            *writes += 1;
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))?;
        entries.remove(key);
        Ok(())
    }
}

/// A JSON object file. Every write rewrites the file through a temp file and
/// an atomic rename, so readers see either the old or the new map.
///
/// Nothing is cached: another process sharing the file sees every committed
/// write.
#[derive(Debug)]
pub struct FileKeyValueStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileKeyValueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<BTreeMap<String, String>, StoreError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(StoreError::Storage(format!(
                    "failed to read {}: {e}",
                    self.path.display()
                )));
            }
        };
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt {
            key: self.path.display().to_string(),
            reason: e.to_string(),
        })
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let storage = |e: std::io::Error| {
            StoreError::Storage(format!("failed to write {}: {e}", self.path.display()))
        };
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir).map_err(storage)?;

        let body = serde_json::to_vec_pretty(map)
            .map_err(|e| StoreError::Storage(format!("failed to encode state: {e}")))?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(storage)?;
        tmp.write_all(&body).map_err(storage)?;
        tmp.as_file().sync_all().map_err(storage)?;
        tmp.persist(&self.path).map_err(|e| storage(e.error))?;
        Ok(())
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))?;
        Ok(self.read_map()?.remove(key))
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))?;
        let mut map = self.read_map()?;
        map.insert(key.to_string(), value.to_string());
        self.write_map(&map)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))?;
        let mut map = self.read_map()?;
        if map.remove(key).is_none() {
            return Ok(());
        }
        self.write_map(&map)
    }
}

/// Default slot holding the job state.
pub const JOB_STATE_KEY: &str = "geobatch.job_state";

/// Reads and writes the single `JobState` record.
///
/// An absent record reads as `JobState::idle()`. Saving an idle state removes
/// the record.
#[derive(Clone)]
pub struct CheckpointStore {
    kv: Arc<dyn KeyValueStore>,
}

impl CheckpointStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    pub fn load(&self) -> Result<JobState, StoreError> {
        let Some(raw) = self.kv.get(JOB_STATE_KEY)? else {
            return Ok(JobState::idle());
        };
        let state: JobState = serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt {
            key: JOB_STATE_KEY.to_string(),
            reason: e.to_string(),
        })?;
        state.validate().map_err(|reason| StoreError::Corrupt {
            key: JOB_STATE_KEY.to_string(),
            reason,
        })?;
        Ok(state)
    }

    pub fn save(&self, state: &JobState) -> Result<(), StoreError> {
        if !state.is_active() {
            return self.clear();
        }
        let raw = serde_json::to_string(state)
            .map_err(|e| StoreError::Storage(format!("failed to encode job state: {e}")))?;
        self.kv.put(JOB_STATE_KEY, &raw)?;
        debug!(
            job_id = ?state.job_id,
            current_row = state.current_row,
            total_rows = state.total_rows,
            "checkpoint saved"
        );
        Ok(())
    }

    /// Back to idle. Idempotent.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.kv.delete(JOB_STATE_KEY)
    }
}

impl std::fmt::Debug for CheckpointStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointStore")
            .field("key", &JOB_STATE_KEY)
            .finish_non_exhaustive()
    }
}
