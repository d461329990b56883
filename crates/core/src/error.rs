//! Error types for the Steward domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Steward operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Generative backend errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Reply channel errors ---
    #[error("Reply error: {0}")]
    Reply(#[from] ReplyError),

    // --- Transport errors ---
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    // --- History persistence errors ---
    #[error("History error: {0}")]
    History(#[from] HistoryError),

    // --- Function errors ---
    #[error("Function error: {0}")]
    Function(#[from] FunctionError),

    // --- Model output that could not be classified ---
    #[error("Malformed reply: {0}")]
    MalformedReply(String),

    // --- Context window bookkeeping went negative ---
    #[error("Context overflow: {used} tokens used against a limit of {limit}")]
    ContextOverflow { used: usize, limit: usize },

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this is the "no active reply target" condition.
    pub fn is_reset(&self) -> bool {
        matches!(self, Error::Reply(ReplyError::Reset))
    }

    /// Errors that must abort a turn instead of triggering another attempt.
    pub fn is_fatal(&self) -> bool {
        self.is_reset() || matches!(self, Error::ContextOverflow { .. })
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Transient gateway failures the transport layer may retry.
    pub fn is_bad_gateway(&self) -> bool {
        matches!(self, ProviderError::ApiError { status_code: 502, .. })
    }
}

/// Failures of the per-turn reply capability.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplyError {
    /// A reply operation was attempted while no turn was being answered.
    #[error("Reset: no active reply target")]
    Reset,

    #[error("Reply delivery failed: {0}")]
    DeliveryFailed(String),
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Channel not configured: {0}")]
    NotConfigured(String),

    #[error("Message delivery failed to {channel}: {reason}")]
    DeliveryFailed { channel: String, reason: String },

    #[error("Channel connection lost: {0}")]
    ConnectionLost(String),

    #[error("Invalid envelope: {0}")]
    InvalidPayload(String),
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid history key: {0}")]
    InvalidKey(String),
}

/// Errors raised by function handlers.
///
/// `Domain` is an intentional, user-explainable failure; everything else is
/// unexpected. Both are contained by [`crate::FunctionRegistry::dispatch`].
#[derive(Debug, Error)]
pub enum FunctionError {
    #[error("{message} (code {code})")]
    Domain { code: i32, message: String },

    #[error(transparent)]
    Reply(#[from] ReplyError),

    #[error("{0}")]
    Unexpected(String),
}

impl FunctionError {
    pub const EC_UNKNOWN_ERROR: i32 = -1;
    pub const EC_RESET: i32 = 1;
    pub const EC_DECODE_JSON_ERROR: i32 = 100;

    /// Shorthand for a domain error.
    pub fn domain(code: i32, message: impl Into<String>) -> Self {
        FunctionError::Domain {
            code,
            message: message.into(),
        }
    }

    /// Domain error for missing or ill-typed arguments.
    pub fn bad_argument(message: impl Into<String>) -> Self {
        Self::domain(Self::EC_DECODE_JSON_ERROR, message)
    }
}
