//! The session actor: one task per conversation.
//!
//! Turns are queued without bound and answered strictly one at a time. For
//! each turn the loop binds the reply target, runs the agent, and then no
//! matter how the turn went: emits the end-of-turn marker (if still bound),
//! persists history, and unbinds. Errors and panics of a turn end there; the
//! loop keeps serving the next one.
//!
//! `stop` is cooperative: the turn in flight finishes, turns still queued
//! are dropped, and the loop exits.
//!
//! Flood risk: the queue is unbounded, a client that never waits for `end`
//! can grow it without limit.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use steward_agent::ConversationAgent;
use steward_core::channel::{Channel, InboundMessage, OutboundKind};
use steward_core::history::{HistorySnapshot, HistoryStore};
use steward_core::reply::ReplyChannel;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::context::{ReplyTarget, SessionContext, SessionState};

/// Sent when a turn failed in a way the agent did not handle itself.
pub const SESSION_APOLOGY: &str = "Sorry, failed to response your previous request";

enum QueueItem {
    Turn { epoch: u64, message: InboundMessage },
    Clear,
    Shutdown,
}

/// Handle to a running session.
pub struct SessionActor {
    state: Arc<SessionState>,
    queue: mpsc::UnboundedSender<QueueItem>,
    running: Arc<AtomicBool>,
    /// Bumped by `clear`; turns queued under an older epoch are dropped.
    epoch: Arc<AtomicU64>,
    last_seen_id: Mutex<Option<String>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionActor {
    /// Start the session loop for `id`. `agent` should already carry the
    /// session's stored history.
    pub fn spawn(
        id: impl Into<String>,
        agent: ConversationAgent,
        store: Arc<dyn HistoryStore>,
        channel: Arc<dyn Channel>,
    ) -> Self {
        let state = Arc::new(SessionState::new(id, channel));
        let epoch = Arc::new(AtomicU64::new(0));
        let running = Arc::new(AtomicBool::new(true));
        let (queue, rx) = mpsc::unbounded_channel();

        let worker = SessionLoop {
            state: state.clone(),
            agent,
            store,
            epoch: epoch.clone(),
            running: running.clone(),
        };
        let task = tokio::spawn(worker.run(rx));

        info!(session = %state.id(), "Session started");
        Self {
            state,
            queue,
            running,
            epoch,
            last_seen_id: Mutex::new(None),
            task: Mutex::new(Some(task)),
        }
    }

    pub fn id(&self) -> &str {
        self.state.id()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Queue a turn. A turn carrying the same id as the previous one is a
    /// duplicate delivery and is dropped. Returns whether it was queued.
    pub fn enqueue(&self, message: InboundMessage) -> bool {
        if !self.is_running() {
            debug!(session = %self.id(), "Session stopped, dropping turn");
            return false;
        }

        if let Some(id) = &message.message_id {
            let mut last = self
                .last_seen_id
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if last.as_ref() == Some(id) {
                debug!(session = %self.id(), message_id = %id, "Duplicate turn dropped");
                return false;
            }
            *last = Some(id.clone());
        }

        let epoch = self.epoch.load(Ordering::SeqCst);
        self.queue.send(QueueItem::Turn { epoch, message }).is_ok()
    }

    /// Forget the conversation: drop queued turns, unbind the reply target,
    /// and have the loop wipe and persist the history once the turn in
    /// flight (if any) is over.
    pub fn clear(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.state.unbind();
        if self.queue.send(QueueItem::Clear).is_err() {
            debug!(session = %self.id(), "Session loop gone, nothing to clear");
        }
        info!(session = %self.id(), "Session cleared");
    }

    /// Stop after the current turn (at once if idle) and wait for the loop
    /// to exit. Turns still queued are dropped.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        // A closed queue means the loop already exited.
        let _ = self.queue.send(QueueItem::Shutdown);

        let task = self
            .task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(session = %self.id(), error = %e, "Session task failed");
            }
        }
        info!(session = %self.id(), "Session stopped");
    }

    pub fn set_timezone_offset(&self, hours: i32) {
        self.state.set_tz_offset(hours);
    }

    pub fn timezone_offset(&self) -> i32 {
        self.state.tz_offset()
    }

    pub fn set_last_image(&self, base64: String) {
        self.state.set_last_image(base64);
    }

    pub fn set_channel(&self, channel: Arc<dyn Channel>) {
        self.state.set_channel(channel);
    }
}

/// The single consumer of a session's queue.
struct SessionLoop {
    state: Arc<SessionState>,
    agent: ConversationAgent,
    store: Arc<dyn HistoryStore>,
    epoch: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
}

impl SessionLoop {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<QueueItem>) {
        while let Some(item) = rx.recv().await {
            match item {
                QueueItem::Shutdown => break,
                QueueItem::Clear => {
                    self.agent.clear_history();
                    self.state.unbind();
                    self.persist().await;
                }
                QueueItem::Turn { message, .. } if !self.running.load(Ordering::SeqCst) => {
                    debug!(session = %self.state.id(), message_id = ?message.message_id, "Session stopping, dropping queued turn");
                }
                QueueItem::Turn { epoch, message } => {
                    if epoch != self.epoch.load(Ordering::SeqCst) {
                        debug!(session = %self.state.id(), "Dropping turn queued before clear");
                        continue;
                    }
                    self.process(message).await;
                }
            }
        }
        debug!(session = %self.state.id(), "Session loop exited");
    }

    async fn process(&mut self, message: InboundMessage) {
        let session = self.state.id().to_string();
        debug!(session = %session, message_id = ?message.message_id, "Processing turn");

        self.state.bind(ReplyTarget::from(&message));
        let ctx = SessionContext::new(self.state.clone());

        let outcome = AssertUnwindSafe(self.agent.handle(&message.content, &ctx))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(outcome)) => debug!(session = %session, ?outcome, "Turn finished"),
            Ok(Err(e)) if e.is_reset() && !self.state.is_bound() => {
                debug!(session = %session, "Reply attempted with no active target");
            }
            Ok(Err(e)) => {
                error!(session = %session, error = %e, "Turn failed");
                apologize(&ctx, &session).await;
            }
            Err(panic) => {
                error!(session = %session, panic = %panic_message(&*panic), "Turn panicked");
                apologize(&ctx, &session).await;
            }
        }

        if self.state.is_bound() {
            if let Err(e) = ctx.emit(OutboundKind::End, "").await {
                warn!(session = %session, error = %e, "End of turn not delivered");
            }
        }
        self.persist().await;
        self.state.unbind();
    }

    async fn persist(&self) {
        let snapshot = HistorySnapshot::from(self.agent.history());
        if let Err(e) = self.store.save(self.state.id(), &snapshot).await {
            warn!(session = %self.state.id(), store = %self.store.name(), error = %e, "Failed to save history");
        }
    }
}

async fn apologize(ctx: &SessionContext, session: &str) {
    if let Err(e) = ctx.reply_text(SESSION_APOLOGY).await {
        debug!(session, error = %e, "Apology not delivered");
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
