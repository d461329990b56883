//! Conversation history stores for Steward.

pub mod noop;
pub mod in_memory;
pub mod file_backend;

pub use noop::NoopHistoryStore;
pub use in_memory::InMemoryHistoryStore;
pub use file_backend::FileHistoryStore;
