//! Context window assembly.
//!
//! Selects as much recent history as fits the token budget, after a fixed
//! preamble and before the new user input.

pub mod window;

pub use window::{ContextWindow, ContextWindowBuilder, WindowInput};
