//! Transports for Steward.
//!
//! A channel carries envelopes between users and the session router. The
//! router never knows which platform it is talking to; it only calls
//! [`steward_core::channel::Channel::emit`].
//!
//! Available channels:
//! - **CLI**: interactive terminal chat (stdin/stdout)

pub mod cli;

pub use cli::{CLI_CHAT_ID, CLI_USER_ID, CliChannel, LineInput, parse_line};
