//! End-to-end integration tests for the Steward runtime.
//!
//! These tests exercise the full pipeline from an inbound envelope to the
//! replies on the transport: routing, the session queue, context assembly,
//! reply classification, function dispatch and history persistence.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use steward_agent::conversation::GIVE_UP_APOLOGY;
use steward_config::{AppConfig, HistoryConfig};
use steward_core::channel::{Channel, InboundMessage, OutboundKind, OutboundMessage};
use steward_core::error::{ChannelError, ProviderError};
use steward_core::history::HistoryStore;
use steward_core::message::{FunctionCall, Role};
use steward_core::provider::{
    AssistantReply, Provider, ProviderRequest, ProviderResponse, TimeoutNotifier,
};
use steward_functions::default_registry;
use steward_gateway::{SessionRouter, history_store_for};
use tokio::sync::mpsc;

// ── Mock Provider ────────────────────────────────────────────────────────

/// A mock provider that returns scripted replies in sequence.
struct ScriptedProvider {
    replies: Mutex<VecDeque<AssistantReply>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn new(replies: Vec<AssistantReply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
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
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::InvalidResponse("script exhausted".into()))?;
        Ok(ProviderResponse {
            reply,
            usage: None,
            model: "scripted-model".into(),
        })
    }
}

fn content(text: &str) -> AssistantReply {
    AssistantReply::Content(text.into())
}

fn call(name: &str, arguments: &str) -> AssistantReply {
    AssistantReply::FunctionCall(FunctionCall {
        name: name.into(),
        arguments: arguments.into(),
    })
}

// ── Transport ────────────────────────────────────────────────────────────

/// Forwards everything emitted to the test.
struct ForwardingChannel {
    tx: mpsc::UnboundedSender<OutboundMessage>,
}

#[async_trait::async_trait]
impl Channel for ForwardingChannel {
    fn name(&self) -> &str {
        "forwarding"
    }

    async fn emit(&self, message: OutboundMessage) -> Result<(), ChannelError> {
        self.tx
            .send(message)
            .map_err(|e| ChannelError::ConnectionLost(e.to_string()))
    }
}

fn forwarding() -> (Arc<ForwardingChannel>, mpsc::UnboundedReceiver<OutboundMessage>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(ForwardingChannel { tx }), rx)
}

/// Collect one turn's replies, up to and including its end marker.
async fn until_end(rx: &mut mpsc::UnboundedReceiver<OutboundMessage>) -> Vec<OutboundMessage> {
    let mut turn = Vec::new();
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("turn did not finish")
            .expect("channel closed");
        let done = message.kind == OutboundKind::End;
        turn.push(message);
        if done {
            return turn;
        }
    }
}

fn kinds(turn: &[OutboundMessage]) -> Vec<OutboundKind> {
    turn.iter().map(|m| m.kind).collect()
}

fn turn(content: &str, id: &str) -> InboundMessage {
    InboundMessage::text("u1", "chat-1", content, id)
}

fn envelope(kind: &str, content: &str, id: u64) -> String {
    serde_json::json!({
        "user": {"id": "u1"},
        "chat": {"id": "chat-1"},
        "message": {"type": kind, "content": content, "id": id},
    })
    .to_string()
}

fn config_with_history(dir: &std::path::Path) -> AppConfig {
    AppConfig {
        history: HistoryConfig {
            dir: Some(dir.to_path_buf()),
        },
        ..AppConfig::default()
    }
}

fn router(
    config: &AppConfig,
    provider: Arc<ScriptedProvider>,
    channel: Arc<ForwardingChannel>,
) -> SessionRouter {
    SessionRouter::from_config(config, provider, Arc::new(default_registry()), channel)
}

/// User and assistant texts of a request, in order.
fn dialogue(request: &ProviderRequest) -> Vec<(Role, String)> {
    request
        .messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| {
            let text = match &m.function_call {
                Some(call) => format!("call:{}", call.name),
                None => m.content.clone().unwrap_or_default(),
            };
            (m.role, text)
        })
        .collect()
}

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn function_turn_then_followup_sees_the_exchange() {
    let dir = tempfile::tempdir().unwrap();
    let provider = ScriptedProvider::new(vec![
        call("toggle_light", r#"{"room": "kitchen", "on": true}"#),
        content("You're welcome!"),
    ]);
    let (channel, mut rx) = forwarding();
    let router = router(&config_with_history(dir.path()), provider.clone(), channel);

    router.handle(turn("Turn on the kitchen light", "1")).await;
    let first = until_end(&mut rx).await;
    assert_eq!(
        kinds(&first),
        vec![OutboundKind::Notification, OutboundKind::Text, OutboundKind::End]
    );
    assert!(first[0].content.starts_with("Executing function: toggle_light("));
    assert_eq!(first[1].content, "The light in kitchen has turn on");
    assert!(first.iter().all(|m| m.message_id.as_deref() == Some("1")));

    router.handle(turn("Thanks", "2")).await;
    let second = until_end(&mut rx).await;
    assert_eq!(second[0].content, "You're welcome!");

    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(
        dialogue(&requests[1]),
        vec![
            (Role::User, "Turn on the kitchen light".to_string()),
            (Role::Assistant, "call:toggle_light".to_string()),
            (Role::Function, "Success".to_string()),
            (Role::User, "Thanks".to_string()),
        ]
    );
    assert_eq!(requests[1].functions.len(), 3);
}

#[tokio::test]
async fn history_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_with_history(dir.path());

    let provider = ScriptedProvider::new(vec![content("Hello, Ada.")]);
    let (channel, mut rx) = forwarding();
    let first = router(&config, provider, channel);
    first.handle(turn("My name is Ada", "1")).await;
    until_end(&mut rx).await;
    first.shutdown().await;

    let stored = history_store_for(Some(dir.path()), "scripted")
        .load("chat-1")
        .await
        .unwrap();
    assert_eq!(stored.into_history().len(), 2);
    assert!(dir.path().join("scripted").join("chat-1.json").exists());

    let provider = ScriptedProvider::new(vec![content("You are Ada.")]);
    let (channel, mut rx) = forwarding();
    let second = router(&config, provider.clone(), channel);
    second.handle(turn("Who am I?", "2")).await;
    until_end(&mut rx).await;

    assert_eq!(
        dialogue(&provider.requests()[0]),
        vec![
            (Role::User, "My name is Ada".to_string()),
            (Role::Assistant, "Hello, Ada.".to_string()),
            (Role::User, "Who am I?".to_string()),
        ]
    );
    second.shutdown().await;
}

#[tokio::test]
async fn sloppy_arguments_are_repaired() {
    let provider = ScriptedProvider::new(vec![call(
        "toggle_light",
        "```json\n{'room': 'hall', 'on': False,}\n```",
    )]);
    let (channel, mut rx) = forwarding();
    let router = router(&AppConfig::default(), provider.clone(), channel);

    router.handle(turn("Lights off in the hall", "1")).await;
    let replies = until_end(&mut rx).await;

    assert_eq!(replies[1].content, "The light in hall has turn off");
    assert_eq!(provider.requests().len(), 1);
}

#[tokio::test]
async fn bad_arguments_are_apologized_for() {
    let provider = ScriptedProvider::new(vec![call("toggle_light", r#"{"on": true}"#)]);
    let (channel, mut rx) = forwarding();
    let router = router(&AppConfig::default(), provider, channel);

    router.handle(turn("Light on", "1")).await;
    let replies = until_end(&mut rx).await;

    assert_eq!(
        kinds(&replies),
        vec![OutboundKind::Notification, OutboundKind::Text, OutboundKind::End]
    );
    assert!(replies[1].content.starts_with("Sorry, failed to do the job"));
}

#[tokio::test]
async fn gives_up_after_unusable_replies() {
    let provider = ScriptedProvider::new(vec![
        call("", "{}"),
        call("toggle_light", "not json at all"),
        call("", "{}"),
    ]);
    let (channel, mut rx) = forwarding();
    let router = router(&AppConfig::default(), provider.clone(), channel);

    router.handle(turn("Do the thing", "1")).await;
    let replies = until_end(&mut rx).await;

    assert_eq!(replies[0].content, GIVE_UP_APOLOGY);
    let requests = provider.requests();
    assert_eq!(requests.len(), 3);
    let last_user = dialogue(&requests[2]).pop().unwrap();
    assert!(last_user.1.starts_with("Do the thing Remember to reply"));
}

#[tokio::test]
async fn clear_envelope_forgets_the_conversation() {
    let provider = ScriptedProvider::new(vec![content("Noted."), content("Fresh start.")]);
    let (channel, mut rx) = forwarding();
    let router = router(&AppConfig::default(), provider.clone(), channel);

    router.handle_raw(&envelope("text", "Remember 42", 1)).await;
    until_end(&mut rx).await;
    router.handle_raw(&envelope("clear", "", 2)).await;
    router.handle_raw(&envelope("text", "What number?", 3)).await;
    until_end(&mut rx).await;

    assert_eq!(
        dialogue(&provider.requests()[1]),
        vec![(Role::User, "What number?".to_string())]
    );
}

#[tokio::test]
async fn offset_and_garbage_envelopes() {
    let provider = ScriptedProvider::new(vec![content("It is late.")]);
    let (channel, mut rx) = forwarding();
    let router = router(&AppConfig::default(), provider.clone(), channel);

    router.handle_raw("this is not an envelope").await;
    assert_eq!(router.session_count().await, 0);

    router.handle_raw(&envelope("set_ts_offset", "8", 1)).await;
    router.handle_raw(&envelope("set_ts_offset", "13", 2)).await;
    let session = router.session("chat-1").await.unwrap();
    assert_eq!(session.timezone_offset(), 8);

    router.handle_raw(&envelope("text", "What time is it?", 3)).await;
    until_end(&mut rx).await;

    let request = &provider.requests()[0];
    let time = request.messages[1].content.clone().unwrap_or_default();
    assert!(time.starts_with("The current time and date is"));
}
