//! HistoryStore trait: durable per-session transcript storage.
//!
//! A session's history is persisted as a snapshot pair of parallel arrays:
//! the token-count cache (with `-1` for "not yet counted") and the message
//! list. Implementations: JSON files, in-memory (for testing), none (no-op).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::HistoryError;
use crate::message::{ConversationHistory, Message};

/// Sentinel for a message whose token count has not been computed.
pub const UNCOUNTED: i64 = -1;

/// Persisted form of a [`ConversationHistory`].
///
/// Serializes as a two-element JSON array `[token_counts, messages]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistorySnapshot(pub Vec<i64>, pub Vec<Message>);

impl HistorySnapshot {
    pub fn is_empty(&self) -> bool {
        self.1.is_empty()
    }
}

impl From<&ConversationHistory> for HistorySnapshot {
    fn from(history: &ConversationHistory) -> Self {
        let counts = history
            .token_cache()
            .iter()
            .map(|slot| slot.map_or(UNCOUNTED, |n| n as i64))
            .collect();
        HistorySnapshot(counts, history.messages().to_vec())
    }
}

impl HistorySnapshot {
    /// Rebuild a history from this snapshot.
    ///
    /// Mismatched array lengths yield an empty history. Negative counts are
    /// treated as uncounted.
    pub fn into_history(self) -> ConversationHistory {
        let HistorySnapshot(counts, messages) = self;
        let cache = counts
            .into_iter()
            .map(|n| usize::try_from(n).ok())
            .collect();
        ConversationHistory::from_parts(cache, messages).unwrap_or_default()
    }
}

/// The core HistoryStore trait.
///
/// `load` must never fail on a missing or malformed record: both yield an
/// empty snapshot. Errors are reserved for real storage failures.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// The backend name (e.g., "file", "memory", "none").
    fn name(&self) -> &str;

    /// Persist the snapshot under `key`, replacing any previous one.
    async fn save(&self, key: &str, snapshot: &HistorySnapshot) -> std::result::Result<(), HistoryError>;

    /// Load the snapshot stored under `key`.
    async fn load(&self, key: &str) -> std::result::Result<HistorySnapshot, HistoryError>;
}
