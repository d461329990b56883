//! File-based history store: one JSON document per session.
//!
//! Each session key maps to `<dir>/<key>.json` holding the snapshot pair
//! `[token_counts, messages]`. Writes go to a temporary file first and are
//! renamed into place, so a crash never leaves a half-written history.
//!
//! Missing, unreadable-as-JSON, or inconsistent files load as an empty
//! history; only real I/O failures surface as errors.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use steward_core::error::HistoryError;
use steward_core::history::{HistorySnapshot, HistoryStore};
use tracing::{debug, warn};

/// A directory of per-session JSON history files.
pub struct FileHistoryStore {
    dir: PathBuf,
}

impl FileHistoryStore {
    /// Create a store rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding `key`'s history.
    pub fn path_for(&self, key: &str) -> Result<PathBuf, HistoryError> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{key}.json")))
    }

    /// Keys with a stored history, sorted.
    pub async fn keys(&self) -> Result<Vec<String>, HistoryError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(HistoryError::Storage(format!(
                    "Failed to list history directory: {e}"
                )));
            }
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| HistoryError::Storage(format!("Failed to list history directory: {e}")))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    keys.push(stem.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Keys become file names, so they must not escape the directory.
fn validate_key(key: &str) -> Result<(), HistoryError> {
    if key.is_empty()
        || key == "."
        || key == ".."
        || key.contains(['/', '\\', '\0'])
    {
        return Err(HistoryError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[async_trait]
impl HistoryStore for FileHistoryStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn save(&self, key: &str, snapshot: &HistorySnapshot) -> Result<(), HistoryError> {
        let path = self.path_for(key)?;

        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            HistoryError::Storage(format!("Failed to create history directory: {e}"))
        })?;

        let content = serde_json::to_vec(snapshot)
            .map_err(|e| HistoryError::Storage(format!("Failed to serialize history: {e}")))?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &content)
            .await
            .map_err(|e| HistoryError::Storage(format!("Failed to write history file: {e}")))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| HistoryError::Storage(format!("Failed to replace history file: {e}")))?;

        debug!(key, path = %path.display(), messages = snapshot.1.len(), "History saved");
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<HistorySnapshot, HistoryError> {
        let path = self.path_for(key)?;

        let content = match tokio::fs::read(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(HistorySnapshot::default());
            }
            Err(e) => {
                return Err(HistoryError::Storage(format!(
                    "Failed to read history file: {e}"
                )));
            }
        };

        match serde_json::from_slice::<HistorySnapshot>(&content) {
            Ok(snapshot) if snapshot.0.len() == snapshot.1.len() => {
                debug!(key, messages = snapshot.1.len(), "History loaded");
                Ok(snapshot)
            }
            Ok(snapshot) => {
                warn!(
                    key,
                    counts = snapshot.0.len(),
                    messages = snapshot.1.len(),
                    "History arrays disagree in length, starting fresh"
                );
                Ok(HistorySnapshot::default())
            }
            Err(e) => {
                warn!(key, error = %e, "Skipping corrupted history file");
                Ok(HistorySnapshot::default())
            }
        }
    }
}
