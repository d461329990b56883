//! Inbound routing: one session per chat.
//!
//! The router owns the map of live sessions. The first envelope seen for a
//! chat creates its session, loading any stored history; later envelopes are
//! dispatched by type:
//!
//! | Type | Effect |
//! |------|--------|
//! | `text` | queue a turn |
//! | `clear` | wipe the session's history |
//! | `set_ts_offset` | set the session's UTC offset (-12..=12 hours) |
//! | `image` | remember the image for function handlers |

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use steward_agent::{AgentSettings, ConversationAgent};
use steward_config::AppConfig;
use steward_core::channel::{Channel, InboundKind, InboundMessage};
use steward_core::function::FunctionRegistry;
use steward_core::history::HistoryStore;
use steward_core::provider::Provider;
use steward_memory::{FileHistoryStore, NoopHistoryStore};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::session::SessionActor;

/// Valid session UTC offsets, in hours.
pub const TZ_OFFSET_RANGE: std::ops::RangeInclusive<i32> = -12..=12;

/// Routes inbound envelopes to per-chat sessions.
pub struct SessionRouter {
    provider: Arc<dyn Provider>,
    registry: Arc<FunctionRegistry>,
    store: Arc<dyn HistoryStore>,
    settings: AgentSettings,
    system_prompt: Option<String>,
    channel: RwLock<Arc<dyn Channel>>,
    sessions: Mutex<HashMap<String, Arc<SessionActor>>>,
}

impl SessionRouter {
    pub fn new(
        provider: Arc<dyn Provider>,
        registry: Arc<FunctionRegistry>,
        store: Arc<dyn HistoryStore>,
        channel: Arc<dyn Channel>,
        settings: AgentSettings,
    ) -> Self {
        Self {
            provider,
            registry,
            store,
            settings,
            system_prompt: None,
            channel: RwLock::new(channel),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Build a router with settings, role prompt and history store taken
    /// from `config`.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        registry: Arc<FunctionRegistry>,
        channel: Arc<dyn Channel>,
    ) -> Self {
        let store = history_store_for(config.history.dir.as_deref(), provider.name());
        let mut router = Self::new(
            provider,
            registry,
            store,
            channel,
            AgentSettings::from_config(config),
        );
        router.system_prompt = config.agent.system_prompt.clone();
        router
    }

    /// Override the agents' role prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn store(&self) -> &Arc<dyn HistoryStore> {
        &self.store
    }

    /// Parse a raw envelope and route it. Unparseable envelopes are dropped.
    pub async fn handle_raw(&self, raw: &str) {
        match InboundMessage::parse(raw) {
            Ok(message) => self.handle(message).await,
            Err(e) => debug!(error = %e, "Dropping unparseable envelope"),
        }
    }

    /// Route one inbound message to its session.
    pub async fn handle(&self, message: InboundMessage) {
        let session = self.session_for(&message.chat_id).await;

        match message.kind {
            InboundKind::Text => {
                session.enqueue(message);
            }
            InboundKind::Clear => session.clear(),
            InboundKind::SetTzOffset => match message.content.trim().parse::<i32>() {
                Ok(hours) if TZ_OFFSET_RANGE.contains(&hours) => {
                    debug!(session = %session.id(), hours, "Timezone offset set");
                    session.set_timezone_offset(hours);
                }
                Ok(hours) => {
                    error!(session = %session.id(), hours, "Timezone offset out of range");
                }
                Err(e) => {
                    error!(session = %session.id(), content = %message.content, error = %e, "Invalid timezone offset");
                }
            },
            InboundKind::Image => {
                debug!(session = %session.id(), bytes = message.content.len(), "Image received");
                session.set_last_image(message.content);
            }
        }
    }

    /// The live session for `chat_id`, if any.
    pub async fn session(&self, chat_id: &str) -> Option<Arc<SessionActor>> {
        self.sessions.lock().await.get(chat_id).cloned()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Point every session, and every session created later, at a new
    /// transport connection.
    pub async fn set_channel(&self, channel: Arc<dyn Channel>) {
        match self.channel.write() {
            Ok(mut guard) => *guard = channel.clone(),
            Err(poisoned) => *poisoned.into_inner() = channel.clone(),
        }
        for session in self.sessions.lock().await.values() {
            session.set_channel(channel.clone());
        }
        info!(channel = %channel.name(), "Channel rebound");
    }

    /// Stop and forget one session.
    pub async fn close(&self, chat_id: &str) -> bool {
        let session = self.sessions.lock().await.remove(chat_id);
        match session {
            Some(session) => {
                session.stop().await;
                true
            }
            None => false,
        }
    }

    /// Stop every session. Each finishes the turn in flight; queued turns
    /// are dropped.
    pub async fn shutdown(&self) {
        let sessions: Vec<_> = self.sessions.lock().await.drain().map(|(_, s)| s).collect();
        info!(sessions = sessions.len(), "Shutting down sessions");
        for session in sessions {
            session.stop().await;
        }
    }

    async fn session_for(&self, chat_id: &str) -> Arc<SessionActor> {
        if let Some(session) = self.sessions.lock().await.get(chat_id) {
            return session.clone();
        }

        // The map lock is not held across the store read.
        let history = match self.store.load(chat_id).await {
            Ok(snapshot) => snapshot.into_history(),
            Err(e) => {
                warn!(session = %chat_id, error = %e, "Failed to load history, starting fresh");
                Default::default()
            }
        };

        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get(chat_id) {
            return session.clone();
        }
        debug!(session = %chat_id, messages = history.len(), "History loaded");

        let mut agent = ConversationAgent::new(
            self.provider.clone(),
            self.registry.clone(),
            self.settings.clone(),
        )
        .with_history(history);
        if let Some(prompt) = &self.system_prompt {
            agent = agent.with_system_prompt(prompt.clone());
        }

        let session = Arc::new(SessionActor::spawn(
            chat_id,
            agent,
            self.store.clone(),
            self.current_channel(),
        ));
        sessions.insert(chat_id.to_string(), session.clone());
        session
    }

    fn current_channel(&self) -> Arc<dyn Channel> {
        match self.channel.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// Histories live under `<dir>/<backend>/`; without a directory nothing is
/// persisted.
pub fn history_store_for(dir: Option<&Path>, backend: &str) -> Arc<dyn HistoryStore> {
    match dir {
        Some(dir) => Arc::new(FileHistoryStore::new(dir.join(backend))),
        None => Arc::new(NoopHistoryStore),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use steward_core::channel::OutboundKind;
    use steward_core::error::FunctionError;
    use steward_core::function::{FunctionArgs, FunctionHandler, FunctionSpec};
    use steward_core::reply::CallerContext;
    use std::time::Duration;
    use steward_core::error::HistoryError;
    use steward_core::history::HistorySnapshot;
    use steward_core::message::Message;
    use steward_memory::InMemoryHistoryStore;

    fn router_with(
        provider: Arc<ScriptedProvider>,
        store: Arc<InMemoryHistoryStore>,
        channel: Arc<RecordingChannel>,
    ) -> SessionRouter {
        SessionRouter::new(
            provider,
            Arc::new(FunctionRegistry::new()),
            store,
            channel,
            AgentSettings::default(),
        )
    }

    fn envelope(chat: &str, kind: &str, content: &str, id: &str) -> String {
        serde_json::json!({
            "user": {"id": 42},
            "chat": {"id": chat},
            "message": {"type": kind, "content": content, "id": id},
        })
        .to_string()
    }

    #[tokio::test]
    async fn sessions_are_created_per_chat() {
        let provider = Arc::new(ScriptedProvider::answering(&["a", "b"]));
        let channel = Arc::new(RecordingChannel::default());
        let router = router_with(provider.clone(), Arc::new(InMemoryHistoryStore::new()), channel.clone());

        router.handle_raw(&envelope("c1", "text", "hi", "1")).await;
        router.handle_raw(&envelope("c2", "text", "hi", "1")).await;
        assert_eq!(router.session_count().await, 2);

        channel.wait_for(4).await;
        router.shutdown().await;
        assert_eq!(router.session_count().await, 0);
        assert_eq!(provider.call_count(), 2);

        let mut chats: Vec<String> = channel
            .sent()
            .into_iter()
            .filter(|m| m.kind == OutboundKind::End)
            .map(|m| m.chat_id)
            .collect();
        chats.sort();
        assert_eq!(chats, vec!["c1", "c2"]);
    }

    #[tokio::test]
    async fn stored_history_is_loaded_on_first_sight() {
        let provider = Arc::new(ScriptedProvider::answering(&["welcome back"]));
        let store = Arc::new(InMemoryHistoryStore::new());
        store
            .save(
                "c1",
                &HistorySnapshot(
                    vec![-1, -1],
                    vec![Message::user("remember me"), Message::assistant("sure")],
                ),
            )
            .await
            .unwrap();
        let channel = Arc::new(RecordingChannel::default());
        let router = router_with(provider.clone(), store.clone(), channel.clone());

        router.handle_raw(&envelope("c1", "text", "hello again", "9")).await;
        channel.wait_for(2).await;
        router.shutdown().await;

        let request = &provider.requests()[0];
        assert!(request.messages.iter().any(|m| m.text() == "remember me"));
        assert_eq!(store.load("c1").await.unwrap().1.len(), 4);
    }

    #[tokio::test]
    async fn timezone_offsets_are_validated() {
        let router = router_with(
            Arc::new(ScriptedProvider::answering(&[])),
            Arc::new(InMemoryHistoryStore::new()),
            Arc::new(RecordingChannel::default()),
        );

        router.handle_raw(&envelope("c1", "set_ts_offset", "8", "1")).await;
        let session = router.session("c1").await.unwrap();
        assert_eq!(session.timezone_offset(), 8);

        router.handle_raw(&envelope("c1", "set_ts_offset", "13", "2")).await;
        router.handle_raw(&envelope("c1", "set_ts_offset", "east", "3")).await;
        assert_eq!(session.timezone_offset(), 8);

        router.handle_raw(&envelope("c1", "set_ts_offset", "-12", "4")).await;
        assert_eq!(session.timezone_offset(), -12);
        router.shutdown().await;
    }

    #[tokio::test]
    async fn clear_wipes_persisted_history() {
        let provider = Arc::new(ScriptedProvider::answering(&["noted"]));
        let store = Arc::new(InMemoryHistoryStore::new());
        let router = router_with(provider, store.clone(), Arc::new(RecordingChannel::default()));

        router.handle_raw(&envelope("c1", "text", "remember this", "1")).await;
        router.handle_raw(&envelope("c1", "clear", "", "2")).await;
        router.shutdown().await;

        assert!(store.load("c1").await.unwrap().is_empty());
    }

    /// Sends the session's last image back to the user.
    struct EchoImage;

    #[async_trait::async_trait]
    impl FunctionHandler for EchoImage {
        async fn call(
            &self,
            ctx: &dyn CallerContext,
            _args: FunctionArgs,
        ) -> Result<Option<String>, FunctionError> {
            let image = ctx
                .last_image()
                .ok_or_else(|| FunctionError::domain(2, "no image"))?;
            ctx.reply_image(&image).await?;
            Ok(Some("Success".into()))
        }
    }

    #[tokio::test]
    async fn images_are_kept_for_functions() {
        let provider = Arc::new(ScriptedProvider::new(vec![function_call_reply("echo_image", "{}")]));
        let channel = Arc::new(RecordingChannel::default());
        let mut registry = FunctionRegistry::new();
        registry.register(FunctionSpec::new("echo_image", "Show the last image"), Arc::new(EchoImage));
        let router = SessionRouter::new(
            provider,
            Arc::new(registry),
            Arc::new(InMemoryHistoryStore::new()),
            channel.clone(),
            AgentSettings::default(),
        );

        router.handle_raw(&envelope("c1", "image", "aW1hZ2U=", "1")).await;
        router.handle_raw(&envelope("c1", "text", "what did I send?", "2")).await;
        channel.wait_for(3).await;
        router.shutdown().await;

        let sent = channel.sent();
        assert_eq!(
            kinds(&sent),
            vec![OutboundKind::Notification, OutboundKind::Image, OutboundKind::End]
        );
        assert_eq!(sent[1].content, "aW1hZ2U=");
    }

    #[tokio::test]
    async fn garbage_is_dropped() {
        let router = router_with(
            Arc::new(ScriptedProvider::answering(&[])),
            Arc::new(InMemoryHistoryStore::new()),
            Arc::new(RecordingChannel::default()),
        );

        router.handle_raw("not json at all").await;
        router.handle_raw(r#"{"user": {"id": 1}, "message": {"type": "text"}}"#).await;
        assert_eq!(router.session_count().await, 0);
    }

    #[tokio::test]
    async fn replies_follow_a_rebound_channel() {
        let provider = Arc::new(ScriptedProvider::answering(&["one", "two"]));
        let first = Arc::new(RecordingChannel::default());
        let second = Arc::new(RecordingChannel::default());
        let router = router_with(provider, Arc::new(InMemoryHistoryStore::new()), first.clone());

        router.handle_raw(&envelope("c1", "text", "hi", "1")).await;
        first.wait_for(2).await;

        router.set_channel(second.clone()).await;
        router.handle_raw(&envelope("c1", "text", "hi again", "2")).await;
        second.wait_for(2).await;
        router.shutdown().await;

        assert_eq!(first.sent().len(), 2);
        assert_eq!(second.sent().len(), 2);
        assert_eq!(second.sent()[0].content, "two");
    }

    #[tokio::test]
    async fn closed_session_is_replaced_on_next_turn() {
        let provider = Arc::new(ScriptedProvider::answering(&["one", "two"]));
        let store = Arc::new(InMemoryHistoryStore::new());
        let channel = Arc::new(RecordingChannel::default());
        let router = router_with(provider, store.clone(), channel.clone());

        router.handle_raw(&envelope("c1", "text", "hi", "1")).await;
        channel.wait_for(2).await;
        let session = router.session("c1").await.unwrap();
        assert!(router.close("c1").await);
        assert!(!router.close("c1").await);
        assert!(!session.is_running());
        assert_eq!(store.load("c1").await.unwrap().1.len(), 2);

        router.handle_raw(&envelope("c1", "text", "hi again", "2")).await;
        channel.wait_for(4).await;
        router.shutdown().await;
        assert_eq!(store.load("c1").await.unwrap().1.len(), 4);
    }

    /// Blocks `load` for one key until released.
    struct SlowStore {
        slow_key: &'static str,
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
        inner: InMemoryHistoryStore,
    }

    #[async_trait::async_trait]
    impl HistoryStore for SlowStore {
        fn name(&self) -> &str {
            "slow"
        }

        async fn save(&self, key: &str, snapshot: &HistorySnapshot) -> Result<(), HistoryError> {
            self.inner.save(key, snapshot).await
        }

        async fn load(&self, key: &str) -> Result<HistorySnapshot, HistoryError> {
            if key == self.slow_key {
                self.entered.notify_one();
                self.release.notified().await;
            }
            self.inner.load(key).await
        }
    }

    #[tokio::test]
    async fn slow_history_read_does_not_stall_other_chats() {
        let store = Arc::new(SlowStore {
            slow_key: "slow",
            entered: tokio::sync::Notify::new(),
            release: tokio::sync::Notify::new(),
            inner: InMemoryHistoryStore::new(),
        });
        let router = Arc::new(SessionRouter::new(
            Arc::new(ScriptedProvider::answering(&[])),
            Arc::new(FunctionRegistry::new()),
            store.clone(),
            Arc::new(RecordingChannel::default()),
            AgentSettings::default(),
        ));

        let pending = tokio::spawn({
            let router = router.clone();
            async move { router.handle_raw(&envelope("slow", "set_ts_offset", "1", "1")).await }
        });
        store.entered.notified().await;

        tokio::time::timeout(
            Duration::from_secs(1),
            router.handle_raw(&envelope("fast", "set_ts_offset", "2", "1")),
        )
        .await
        .expect("routing waited for another chat's history");
        assert_eq!(router.session_count().await, 1);

        store.release.notify_one();
        pending.await.unwrap();
        assert_eq!(router.session_count().await, 2);
        assert_eq!(router.session("slow").await.unwrap().timezone_offset(), 1);
        router.shutdown().await;
    }

    #[test]
    fn history_store_follows_config() {
        assert_eq!(history_store_for(None, "openai").name(), "none");
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(history_store_for(Some(dir.path()), "openai").name(), "file");
    }
}
