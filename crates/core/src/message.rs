//! Message and conversation history domain types.
//!
//! These are the core value objects that flow through the entire system:
//! User sends a turn → Session queues it → Agent builds a context window from
//! the history → Provider replies → History records the exchange.

use serde::{Deserialize, Serialize};

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions (role prompt, current time)
    System,
    /// The end user
    User,
    /// The AI assistant
    Assistant,
    /// Function execution result
    Function,
}

/// A function call requested by the model, with its raw argument payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Name of the function to invoke
    pub name: String,

    /// Arguments exactly as the model produced them (expected to be JSON)
    #[serde(default)]
    pub arguments: String,
}

/// A single message in a conversation.
///
/// The serialized form is the chat-completion wire shape, which is also what
/// the history store persists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Who sent this message
    pub role: Role,

    /// The text content; `None` for assistant entries carrying a function call
    pub content: Option<String>,

    /// Function name for `function` role entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Function call requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
}

impl Message {
    fn with_content(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            name: None,
            function_call: None,
        }
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_content(Role::System, content)
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_content(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_content(Role::Assistant, content)
    }

    /// Create an assistant message that carries a function call instead of text.
    pub fn assistant_function_call(call: FunctionCall) -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            name: None,
            function_call: Some(call),
        }
    }

    /// Create a function result message.
    pub fn function_result(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Function,
            content: Some(content.into()),
            name: Some(name.into()),
            function_call: None,
        }
    }

    /// The text content, or an empty string for function-call entries.
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

/// The ordered transcript of one session, with a parallel token-count cache.
///
/// Both sequences are private so their lengths can never diverge: every
/// message gets an "uncounted" cache slot when it is pushed, and clearing
/// empties both.
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    messages: Vec<Message>,
    token_cache: Vec<Option<usize>>,
}

impl ConversationHistory {
    /// Create a new empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a history from parallel vectors. Returns `None` when the
    /// lengths disagree.
    pub fn from_parts(token_cache: Vec<Option<usize>>, messages: Vec<Message>) -> Option<Self> {
        if token_cache.len() != messages.len() {
            return None;
        }
        Some(Self {
            messages,
            token_cache,
        })
    }

    /// Append a message with an uncounted token slot.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
        self.token_cache.push(None);
    }

    /// Drop every message.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.token_cache.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn get(&self, index: usize) -> Option<&Message> {
        self.messages.get(index)
    }

    pub fn token_cache(&self) -> &[Option<usize>] {
        &self.token_cache
    }

    /// Cached token count of the message at `index`, if it was counted.
    pub fn cached_tokens(&self, index: usize) -> Option<usize> {
        self.token_cache.get(index).copied().flatten()
    }

    /// Record the token count of the message at `index`.
    pub fn cache_tokens(&mut self, index: usize, tokens: usize) {
        if let Some(slot) = self.token_cache.get_mut(index) {
            *slot = Some(tokens);
        }
    }
}
