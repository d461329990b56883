//! Session layer for Steward.
//!
//! Sits between a transport [`Channel`](steward_core::Channel) and the
//! conversation agent:
//!
//! - [`SessionRouter`] maps chat ids to sessions and handles the non-turn
//!   envelope types (clear, timezone offset, image)
//! - [`SessionActor`] answers one chat's turns strictly in order, binding the
//!   reply target around each turn and persisting history after it
//! - [`SessionContext`] is the reply capability the agent and the function
//!   handlers talk through
//!
//! Sessions never share mutable state; the provider and the function
//! registry are shared read-only.

pub mod context;
pub mod router;
pub mod session;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use context::{ReplyTarget, SessionContext, SessionState};
pub use router::{SessionRouter, TZ_OFFSET_RANGE, history_store_for};
pub use session::{SESSION_APOLOGY, SessionActor};
