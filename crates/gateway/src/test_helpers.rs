//! Shared test helpers for session and router tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use steward_core::channel::{Channel, InboundMessage, OutboundKind, OutboundMessage};
use steward_core::error::{ChannelError, ProviderError};
use steward_core::message::FunctionCall;
use steward_core::provider::{
    AssistantReply, Provider, ProviderRequest, ProviderResponse, TimeoutNotifier,
};
use tokio::sync::Notify;

fn response(reply: AssistantReply) -> ProviderResponse {
    ProviderResponse {
        reply,
        usage: None,
        model: "mock-model".into(),
    }
}

/// Plays back scripted replies; fails once they run out.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<AssistantReply>>,
    requests: Mutex<Vec<ProviderRequest>>,
    panic_first: Mutex<bool>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<AssistantReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
            panic_first: Mutex::new(false),
        }
    }

    /// Content replies, in order.
    pub fn answering(texts: &[&str]) -> Self {
        Self::new(
            texts
                .iter()
                .map(|t| AssistantReply::Content(t.to_string()))
                .collect(),
        )
    }

    /// Panics on the first call, then answers like [`Self::answering`].
    pub fn panicking_once(texts: &[&str]) -> Self {
        let provider = Self::answering(texts);
        *provider.panic_first.lock().unwrap() = true;
        provider
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        request: ProviderRequest,
        _notifier: Option<&dyn TimeoutNotifier>,
    ) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);

        let panic_now = std::mem::replace(&mut *self.panic_first.lock().unwrap(), false);
        if panic_now {
            panic!("scripted provider blew up");
        }

        let reply = self.replies.lock().unwrap().pop_front();
        reply
            .map(response)
            .ok_or_else(|| ProviderError::InvalidResponse("script exhausted".into()))
    }
}

pub fn function_call_reply(name: &str, arguments: &str) -> AssistantReply {
    AssistantReply::FunctionCall(FunctionCall {
        name: name.into(),
        arguments: arguments.into(),
    })
}

/// Blocks inside `complete` until released.
#[derive(Default)]
pub struct GatedProvider {
    pub entered: Notify,
    pub release: Notify,
    calls: Mutex<usize>,
}

impl GatedProvider {
    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl Provider for GatedProvider {
    fn name(&self) -> &str {
        "gated"
    }

    async fn complete(
        &self,
        _request: ProviderRequest,
        _notifier: Option<&dyn TimeoutNotifier>,
    ) -> Result<ProviderResponse, ProviderError> {
        *self.calls.lock().unwrap() += 1;
        self.entered.notify_one();
        self.release.notified().await;
        Ok(response(AssistantReply::Content("done".into())))
    }
}

/// Captures everything emitted through it.
#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<OutboundMessage>>,
    fail: bool,
}

impl RecordingChannel {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Yield to the session tasks until `count` messages arrived.
    pub async fn wait_for(&self, count: usize) {
        for _ in 0..10_000 {
            if self.sent.lock().unwrap().len() >= count {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("expected {count} messages, got {}", self.sent().len());
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    async fn emit(&self, message: OutboundMessage) -> Result<(), ChannelError> {
        if self.fail {
            return Err(ChannelError::DeliveryFailed {
                channel: "recording".into(),
                reason: "offline".into(),
            });
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

pub fn turn(content: &str, id: &str) -> InboundMessage {
    InboundMessage::text("u1", "chat-1", content, id)
}

pub fn kinds(sent: &[OutboundMessage]) -> Vec<OutboundKind> {
    sent.iter().map(|m| m.kind).collect()
}
