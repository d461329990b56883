//! In-memory history store: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use steward_core::error::HistoryError;
use steward_core::history::{HistorySnapshot, HistoryStore};
use tokio::sync::RwLock;

/// Keeps snapshots in a map for the lifetime of the process.
#[derive(Clone, Default)]
pub struct InMemoryHistoryStore {
    snapshots: Arc<RwLock<HashMap<String, HistorySnapshot>>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys that have been saved at least once.
    pub async fn len(&self) -> usize {
        self.snapshots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.snapshots.read().await.is_empty()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    fn name(&self) -> &str { "in_memory" }

    async fn save(&self, key: &str, snapshot: &HistorySnapshot) -> Result<(), HistoryError> {
        self.snapshots
            .write()
            .await
            .insert(key.to_string(), snapshot.clone());
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<HistorySnapshot, HistoryError> {
        Ok(self
            .snapshots
            .read()
            .await
            .get(key)
            .cloned()
            .unwrap_or_default())
    }
}
