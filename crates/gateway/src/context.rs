//! Per-session state shared between the transport side and the session task,
//! and the reply capability built on top of it.
//!
//! The reply target is bound by the session loop for exactly as long as a
//! turn is being answered. Every reply operation resolves the target at call
//! time, so a reply attempted after the turn ended (or after a `clear`) fails
//! with [`ReplyError::Reset`] instead of reaching the user.

use async_trait::async_trait;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use steward_core::channel::{Channel, InboundMessage, OutboundKind, OutboundMessage};
use steward_core::error::ReplyError;
use steward_core::reply::{CallerContext, ReplyChannel};
use tracing::debug;

/// Where replies for the current turn go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyTarget {
    pub user_id: String,
    pub chat_id: String,
    /// Id of the turn being answered
    pub message_id: Option<String>,
}

impl From<&InboundMessage> for ReplyTarget {
    fn from(message: &InboundMessage) -> Self {
        Self {
            user_id: message.user_id.clone(),
            chat_id: message.chat_id.clone(),
            message_id: message.message_id.clone(),
        }
    }
}

/// Session metadata reachable from both sides of the queue.
pub struct SessionState {
    id: String,
    channel: RwLock<Arc<dyn Channel>>,
    target: Mutex<Option<ReplyTarget>>,
    tz_offset: AtomicI32,
    last_image: Mutex<Option<String>>,
}

impl SessionState {
    pub fn new(id: impl Into<String>, channel: Arc<dyn Channel>) -> Self {
        Self {
            id: id.into(),
            channel: RwLock::new(channel),
            target: Mutex::new(None),
            tz_offset: AtomicI32::new(0),
            last_image: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn channel(&self) -> Arc<dyn Channel> {
        match self.channel.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn set_channel(&self, channel: Arc<dyn Channel>) {
        match self.channel.write() {
            Ok(mut guard) => *guard = channel,
            Err(poisoned) => *poisoned.into_inner() = channel,
        }
    }

    pub fn target(&self) -> Option<ReplyTarget> {
        self.lock_target().clone()
    }

    pub fn is_bound(&self) -> bool {
        self.lock_target().is_some()
    }

    pub fn bind(&self, target: ReplyTarget) {
        *self.lock_target() = Some(target);
    }

    pub fn unbind(&self) {
        *self.lock_target() = None;
    }

    pub fn tz_offset(&self) -> i32 {
        self.tz_offset.load(Ordering::Relaxed)
    }

    pub fn set_tz_offset(&self, hours: i32) {
        self.tz_offset.store(hours, Ordering::Relaxed);
    }

    pub fn last_image(&self) -> Option<String> {
        match self.last_image.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn set_last_image(&self, base64: String) {
        match self.last_image.lock() {
            Ok(mut guard) => *guard = Some(base64),
            Err(poisoned) => *poisoned.into_inner() = Some(base64),
        }
    }

    fn lock_target(&self) -> std::sync::MutexGuard<'_, Option<ReplyTarget>> {
        // A panicking turn is contained by the session loop; the binding
        // itself is always a complete value.
        self.target.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// The reply capability handed to the agent and to function handlers.
#[derive(Clone)]
pub struct SessionContext {
    state: Arc<SessionState>,
}

impl SessionContext {
    pub fn new(state: Arc<SessionState>) -> Self {
        Self { state }
    }

    /// Send one message to the bound target.
    pub async fn emit(&self, kind: OutboundKind, content: &str) -> Result<(), ReplyError> {
        let Some(target) = self.state.target() else {
            return Err(ReplyError::Reset);
        };

        let message = OutboundMessage {
            user_id: target.user_id,
            chat_id: target.chat_id,
            kind,
            content: content.to_string(),
            message_id: target.message_id,
        };

        let channel = self.state.channel();
        debug!(session = %self.state.id(), channel = %channel.name(), ?kind, "Emitting reply");
        channel
            .emit(message)
            .await
            .map_err(|e| ReplyError::DeliveryFailed(e.to_string()))
    }
}

#[async_trait]
impl ReplyChannel for SessionContext {
    async fn reply_text(&self, text: &str) -> Result<(), ReplyError> {
        self.emit(OutboundKind::Text, text).await
    }

    async fn reply_markdown(&self, markdown: &str) -> Result<(), ReplyError> {
        self.emit(OutboundKind::Markdown, markdown).await
    }

    async fn reply_image(&self, base64: &str) -> Result<(), ReplyError> {
        self.emit(OutboundKind::Image, base64).await
    }

    async fn push_notification(&self, text: &str) -> Result<(), ReplyError> {
        self.emit(OutboundKind::Notification, text).await
    }
}

impl CallerContext for SessionContext {
    fn tz_offset(&self) -> i32 {
        self.state.tz_offset()
    }

    fn last_image(&self) -> Option<String> {
        self.state.last_image()
    }
}
