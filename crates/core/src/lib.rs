//! # Steward Core
//!
//! Domain types, traits, and error definitions for the Steward conversational
//! agent runtime. This crate has **zero framework dependencies**; it defines
//! the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator of the session engine is a trait here: the generative
//! backend, the transport channel, the reply capability handed to functions,
//! and the history store. Implementations live in their respective crates.
//! This enables:
//! - Swapping implementations via configuration
//! - Easy testing with scripted/recording implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod message;
pub mod provider;
pub mod channel;
pub mod reply;
pub mod function;
pub mod history;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use message::{ConversationHistory, FunctionCall, Message, Role};
pub use provider::{AssistantReply, Provider, ProviderRequest, ProviderResponse, TimeoutNotifier};
pub use channel::{Channel, InboundKind, InboundMessage, OutboundKind, OutboundMessage};
pub use reply::{CallerContext, ReplyChannel};
pub use function::{FunctionArgs, FunctionHandler, FunctionRegistry, FunctionSpec, Parameter};
pub use history::{HistorySnapshot, HistoryStore};
