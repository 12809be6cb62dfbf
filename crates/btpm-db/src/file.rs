//! Single-file JSON snapshot store.
//!
//! The file holds one JSON object mapping link keys to their last-known
//! status. Each write replaces the file through a temp file + rename, so a
//! crash mid-write leaves either the old or the new content on disk.
//!
//! A corrupt file fails reads. The next write moves it aside to
//! `<name>.corrupt` and starts from an empty record set, so persistence
//! recovers instead of failing for the life of the process.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use btpm_links::{LinkStatus, SnapshotStore, StoreError};

type Records = BTreeMap<String, LinkStatus>;

enum LoadError {
    Io(String),
    Corrupt(String),
}

impl LoadError {
    fn into_message(self) -> String {
        match self {
            LoadError::Io(msg) | LoadError::Corrupt(msg) => msg,
        }
    }
}

#[derive(Debug)]
pub struct FileSnapshotStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Records, LoadError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(Records::new()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                LoadError::Corrupt(format!("{} is not a snapshot file: {e}", self.path.display()))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Records::new()),
            Err(e) => Err(LoadError::Io(format!("read {}: {e}", self.path.display()))),
        }
    }

    /// Records to write over: the current file, or nothing once a corrupt
    /// file has been moved aside.
    async fn load_for_write(&self) -> Result<Records, StoreError> {
        match self.load().await {
            Ok(records) => Ok(records),
            Err(LoadError::Io(msg)) => Err(StoreError::Write(msg)),
            Err(LoadError::Corrupt(msg)) => {
                let aside = self.sibling_path(".corrupt");
                tokio::fs::rename(&self.path, &aside).await.map_err(|e| {
                    StoreError::Write(format!("quarantine {}: {e}", self.path.display()))
                })?;
                warn!(path = %self.path().display(), moved_to = %aside.display(), %msg,
                    "corrupt snapshot file moved aside; starting empty");
                Ok(Records::new())
            }
        }
    }

    fn sibling_path(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(suffix);
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn get(&self, key: &str) -> Result<Option<LinkStatus>, StoreError> {
        let records = self
            .load()
            .await
            .map_err(|e| StoreError::Read(e.into_message()))?;
        Ok(records.get(key).cloned())
    }

    async fn set(&self, key: &str, status: &LinkStatus) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;

        let mut records = self.load_for_write().await?;
        records.insert(key.to_string(), status.clone());

        let bytes = serde_json::to_vec_pretty(&records).map_err(|e| StoreError::Write(e.to_string()))?;
        let tmp = self.sibling_path(".tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| StoreError::Write(format!("write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StoreError::Write(format!("rename into {}: {e}", self.path.display())))?;

        debug!(key, state = %status.state, path = %self.path.display(), "snapshot persisted");
        Ok(())
    }
}
