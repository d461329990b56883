//! Provider trait: the abstraction over generative backends.
//!
//! A Provider knows how to send a conversation plus a function catalog to an
//! LLM and get back exactly one of two things: plain content, or a request to
//! call one of the catalogued functions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::ProviderError;
use crate::message::{FunctionCall, Message};

/// Configuration for a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "gpt-3.5-turbo-0613")
    pub model: String,

    /// The conversation messages
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic)
    #[serde(default)]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Functions the model may ask to call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub functions: Vec<FunctionDefinition>,
}

/// A function definition sent to the LLM so it knows what it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,

    /// JSON Schema describing the parameters
    pub parameters: serde_json::Value,
}

/// What the model answered with.
#[derive(Debug, Clone, PartialEq)]
pub enum AssistantReply {
    Content(String),
    FunctionCall(FunctionCall),
}

/// A complete response from a provider.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub reply: AssistantReply,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

/// Token usage information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Observer told about request timeouts while a provider is still working.
#[async_trait]
pub trait TimeoutNotifier: Send + Sync {
    /// Called once per timed-out request; `will_retry` is false on the last one.
    async fn on_request_timeout(&self, will_retry: bool);
}

/// The core Provider trait.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(
        &self,
        request: ProviderRequest,
        notifier: Option<&dyn TimeoutNotifier>,
    ) -> std::result::Result<ProviderResponse, ProviderError>;

    /// Count the prompt tokens the given messages would cost for `model`.
    fn count_tokens(&self, messages: &[Message], _model: &str) -> usize {
        estimate_messages_tokens(messages)
    }

    /// Health check: can we reach the provider?
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}

// --- Token estimation ---
//
// Character heuristic: 1 token ≈ 4 characters, rounded up. Each message adds
// 4 tokens of framing and the reply is primed with 3 more.

const TOKENS_PER_MESSAGE: usize = 4;
const REPLY_PRIMING_TOKENS: usize = 3;

/// Estimate the token count for a string.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Estimate tokens for a single message, framing included.
pub fn estimate_message_tokens(message: &Message) -> usize {
    let mut tokens = TOKENS_PER_MESSAGE + estimate_tokens(message.text());
    if let Some(name) = &message.name {
        tokens += estimate_tokens(name);
    }
    if let Some(call) = &message.function_call {
        tokens += estimate_tokens(&call.name) + estimate_tokens(&call.arguments);
    }
    tokens
}

/// Estimate tokens for a message list, reply priming included.
pub fn estimate_messages_tokens(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message_tokens).sum::<usize>() + REPLY_PRIMING_TOKENS
}
