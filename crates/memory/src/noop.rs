//! No-op history store: disables persistence entirely.

use async_trait::async_trait;
use steward_core::error::HistoryError;
use steward_core::history::{HistorySnapshot, HistoryStore};

/// A history store that keeps nothing; every session starts fresh.
pub struct NoopHistoryStore;

#[async_trait]
impl HistoryStore for NoopHistoryStore {
    fn name(&self) -> &str { "none" }

    async fn save(&self, _key: &str, _snapshot: &HistorySnapshot) -> Result<(), HistoryError> {
        Ok(())
    }

    async fn load(&self, _key: &str) -> Result<HistorySnapshot, HistoryError> {
        Ok(HistorySnapshot::default())
    }
}
