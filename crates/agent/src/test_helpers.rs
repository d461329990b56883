//! Shared test helpers for agent tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use steward_core::error::{ProviderError, ReplyError};
use steward_core::message::FunctionCall;
use steward_core::provider::{
    AssistantReply, Provider, ProviderRequest, ProviderResponse, TimeoutNotifier, Usage,
};
use steward_core::reply::{CallerContext, ReplyChannel};

/// One scripted provider outcome.
pub enum Step {
    Reply(AssistantReply),
    Fail(ProviderError),
    /// Report a timeout to the notifier, then play the next step.
    Timeout { will_retry: bool },
}

/// A mock provider that plays back scripted outcomes and records every
/// request it sees. Once the script runs out every call fails.
pub struct SequentialMockProvider {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(
        &self,
        request: ProviderRequest,
        notifier: Option<&dyn TimeoutNotifier>,
    ) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        loop {
            let step = self.steps.lock().unwrap().pop_front();
            match step {
                Some(Step::Reply(reply)) => {
                    return Ok(ProviderResponse {
                        reply,
                        usage: Some(Usage {
                            prompt_tokens: 10,
                            completion_tokens: 5,
                            total_tokens: 15,
                        }),
                        model: "mock-model".into(),
                    });
                }
                Some(Step::Fail(e)) => return Err(e),
                Some(Step::Timeout { will_retry }) => {
                    if let Some(notifier) = notifier {
                        notifier.on_request_timeout(will_retry).await;
                    }
                    if !will_retry {
                        return Err(ProviderError::Timeout("scripted".into()));
                    }
                }
                None => return Err(ProviderError::InvalidResponse("script exhausted".into())),
            }
        }
    }
}

pub fn content(text: &str) -> Step {
    Step::Reply(AssistantReply::Content(text.into()))
}

pub fn function_call(name: &str, arguments: &str) -> Step {
    Step::Reply(AssistantReply::FunctionCall(FunctionCall {
        name: name.into(),
        arguments: arguments.into(),
    }))
}

pub fn server_error() -> Step {
    Step::Fail(ProviderError::ApiError {
        status_code: 500,
        message: "internal".into(),
    })
}

/// Records replies and notifications; optionally behaves as if no turn
/// were active.
#[derive(Default)]
pub struct RecordingContext {
    pub texts: Mutex<Vec<String>>,
    pub notifications: Mutex<Vec<String>>,
    pub unbound: bool,
}

impl RecordingContext {
    pub fn unbound() -> Self {
        Self {
            unbound: true,
            ..Self::default()
        }
    }

    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }

    pub fn notifications(&self) -> Vec<String> {
        self.notifications.lock().unwrap().clone()
    }

    fn check(&self) -> Result<(), ReplyError> {
        if self.unbound {
            Err(ReplyError::Reset)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ReplyChannel for RecordingContext {
    async fn reply_text(&self, text: &str) -> Result<(), ReplyError> {
        self.check()?;
        self.texts.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn reply_markdown(&self, markdown: &str) -> Result<(), ReplyError> {
        self.reply_text(markdown).await
    }

    async fn reply_image(&self, _base64: &str) -> Result<(), ReplyError> {
        self.check()
    }

    async fn push_notification(&self, text: &str) -> Result<(), ReplyError> {
        self.check()?;
        self.notifications.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

impl CallerContext for RecordingContext {
    fn tz_offset(&self) -> i32 {
        0
    }

    fn last_image(&self) -> Option<String> {
        None
    }
}
