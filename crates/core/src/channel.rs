//! Channel trait: the abstraction over transports.
//!
//! A Channel carries envelopes between users and the runtime. Every message,
//! in either direction, uses the same JSON envelope:
//!
//! ```json
//! {"user": {"id": ..}, "chat": {"id": ..}, "message": {"type": .., "content": .., "id": ..}}
//! ```
//!
//! Ids may arrive as JSON strings or numbers; they are normalized to strings.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use crate::error::ChannelError;

/// Kinds of inbound message a transport can deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InboundKind {
    /// A conversational turn
    Text,
    /// Wipe the session's history
    Clear,
    /// Set the session's UTC offset in hours
    #[serde(rename = "set_ts_offset")]
    SetTzOffset,
    /// Base64-encoded image made available to functions
    Image,
}

/// Kinds of outbound message the runtime emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboundKind {
    Text,
    Markdown,
    Notification,
    Image,
    /// End-of-turn marker
    End,
}

/// A parsed inbound envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub user_id: String,
    pub chat_id: String,
    pub kind: InboundKind,
    pub content: String,
    pub message_id: Option<String>,
}

impl InboundMessage {
    /// Convenience constructor for a text turn.
    pub fn text(
        user_id: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
        message_id: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            chat_id: chat_id.into(),
            kind: InboundKind::Text,
            content: content.into(),
            message_id: Some(message_id.into()),
        }
    }

    /// Parse an envelope from raw JSON text.
    pub fn parse(raw: &str) -> std::result::Result<Self, ChannelError> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| ChannelError::InvalidPayload(e.to_string()))?;
        Self::from_envelope(&value)
    }

    /// Parse an already-decoded envelope.
    pub fn from_envelope(value: &Value) -> std::result::Result<Self, ChannelError> {
        let user_id = id_at(value, "user")?;
        let chat_id = id_at(value, "chat")?;
        let message = value
            .get("message")
            .ok_or_else(|| ChannelError::InvalidPayload("missing message".into()))?;

        let kind = message
            .get("type")
            .cloned()
            .ok_or_else(|| ChannelError::InvalidPayload("missing message type".into()))
            .and_then(|t| {
                serde_json::from_value::<InboundKind>(t)
                    .map_err(|e| ChannelError::InvalidPayload(e.to_string()))
            })?;

        let content = match message.get("content") {
            None | Some(Value::Null) => String::new(),
            Some(other) => id_to_string(other),
        };
        let message_id = message
            .get("id")
            .filter(|v| !v.is_null())
            .map(id_to_string);

        Ok(Self {
            user_id,
            chat_id,
            kind,
            content,
            message_id,
        })
    }
}

/// A message to be delivered through a channel.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub user_id: String,
    pub chat_id: String,
    pub kind: OutboundKind,
    pub content: String,
    /// Id of the inbound turn this answers
    pub message_id: Option<String>,
}

impl OutboundMessage {
    /// Render as the wire envelope.
    pub fn to_envelope(&self) -> Value {
        serde_json::json!({
            "user": { "id": self.user_id },
            "chat": { "id": self.chat_id },
            "message": {
                "type": self.kind,
                "content": self.content,
                "id": self.message_id,
            },
        })
    }
}

fn id_at(value: &Value, field: &str) -> std::result::Result<String, ChannelError> {
    value
        .get(field)
        .and_then(|peer| peer.get("id"))
        .filter(|id| !id.is_null())
        .map(id_to_string)
        .ok_or_else(|| ChannelError::InvalidPayload(format!("missing {field}.id")))
}

fn id_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The core Channel trait.
///
/// Implementations own the platform connection; the runtime only ever hands
/// them fully addressed outbound messages.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Human-readable channel name (e.g., "cli", "websocket").
    fn name(&self) -> &str;

    /// Deliver one outbound message.
    async fn emit(&self, message: OutboundMessage) -> std::result::Result<(), ChannelError>;

    /// Health check: is the channel connected and operational?
    async fn health_check(&self) -> std::result::Result<bool, ChannelError> {
        Ok(true)
    }
}
