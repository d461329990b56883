//! Generative backend implementations for Steward.
//!
//! All providers implement the `steward_core::Provider` trait.
//! [`build_from_config`] assembles the configured backend.

pub mod builder;
pub mod openai_compat;
pub mod retrying;

pub use builder::build_from_config;
pub use openai_compat::OpenAiCompatProvider;
pub use retrying::RetryingProvider;
