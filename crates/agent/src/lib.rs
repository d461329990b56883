//! The conversation agent: the turn protocol of Steward.
//!
//! For every user turn the agent:
//!
//! 1. **Builds context** (role prompt + local time + history window + input)
//! 2. **Sends it** to the configured provider, waiting out rate limits
//! 3. **Classifies** the reply as plain content or a function call,
//!    repairing sloppy function arguments once
//! 4. **Commits** the exchange to history and replies, or dispatches the
//!    function through the registry and records its result
//!
//! A turn is attempted up to three times before the user gets an apology.

pub mod context;
pub mod conversation;
pub mod repair;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use context::{ContextWindow, ContextWindowBuilder, WindowInput};
pub use conversation::{AgentSettings, ConversationAgent, TurnOutcome};
pub use repair::parse_arguments;
