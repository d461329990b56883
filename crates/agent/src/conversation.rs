//! The conversation agent: one turn against the generative backend.
//!
//! 1. **Build context** (role prompt + local time + history window + input)
//! 2. **Send to the backend**, waiting out rate limits
//! 3. **Classify** the reply as content or a function call
//! 4. **Commit** the exchange to history, then reply or dispatch the function
//!
//! Steps 1-3 are retried as a whole, up to `max_attempts` times, before the
//! turn gives up with an apology. History is only touched once a reply has
//! been classified, so a failed turn leaves no trace in it.
//!
//! With `prompt_catalog` set, the function catalog is listed in the role
//! prompt instead of being sent as definitions, and every reply is expected
//! to be a JSON object in the [`JSON_REPLY_FORMAT`].

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use steward_config::AppConfig;
use steward_core::error::{Error, ProviderError, Result};
use steward_core::function::{FunctionArgs, FunctionRegistry};
use steward_core::message::{ConversationHistory, FunctionCall, Message};
use steward_core::provider::{AssistantReply, Provider, ProviderRequest, TimeoutNotifier};
use steward_core::reply::CallerContext;
use tracing::{debug, info, warn};

use crate::context::{ContextWindowBuilder, WindowInput};
use crate::repair::parse_arguments;

/// Appended to the prompt from the second attempt on.
pub const RETRY_SUFFIX: &str =
    " Remember to reply with plain content or a call to one of the listed functions.";

/// Retry reminder used when the catalog is listed in the role prompt.
pub const JSON_RETRY_SUFFIX: &str = " Remember to reply using the specified JSON form.";

/// Reply format put in front of the role prompt in prompt-catalog mode.
pub const JSON_REPLY_FORMAT: &str = r#"From now on, every reply must be a JSON object in this format:
```
{
    "thoughts": {
        "text": "<your thought>",
        "reasoning": "<your reasoning>",
        "speak": "<what you want to say to me>"
    },
    "function": {
        "name": "<one of the listed functions, or empty to only speak>",
        "args": {
            "arg name": "<value>"
        }
    }
}
```"#;

/// Sent once when every attempt of a turn failed.
pub const GIVE_UP_APOLOGY: &str = "Sorry, but I don't understand what you want me to do.";

/// Function result recorded when a handler returned nothing.
pub const NO_RESULT: &str = "Unable to execute function";

/// The role prompt used when configuration does not override it.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"I will ask you questions or ask you to do something. You should:
First, decide whether you know the answer to the question or can accomplish the task directly.
If so, respond directly.
If not, try to complete the task by calling one of the listed functions.
If you can't accomplish the task yourself and no function is able to, say "Sorry, I'm not able to do that."

Your setup:
```
{
    "name": "Steward"
}
```"#;

/// Tunables of the turn protocol.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSettings {
    pub model: String,
    pub temperature: f32,
    pub token_limit: usize,
    pub reserved_response_tokens: usize,
    /// Attempts per turn before giving up.
    pub max_attempts: u32,
    /// Fixed wait after the backend reports rate limiting.
    pub rate_limit_backoff: Duration,
    /// Rate-limit retries per attempt; 0 retries forever.
    pub rate_limit_max_retries: u32,
    /// List functions in the role prompt and parse JSON replies.
    pub prompt_catalog: bool,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            model: "gpt-3.5-turbo-0613".into(),
            temperature: 0.0,
            token_limit: 4000,
            reserved_response_tokens: 1000,
            max_attempts: 3,
            rate_limit_backoff: Duration::from_secs(10),
            rate_limit_max_retries: 30,
            prompt_catalog: false,
        }
    }
}

impl AgentSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            token_limit: config.agent.token_limit,
            reserved_response_tokens: config.agent.reserved_response_tokens,
            max_attempts: config.agent.max_attempts,
            rate_limit_backoff: Duration::from_secs(config.transport.rate_limit_backoff_secs),
            rate_limit_max_retries: config.transport.rate_limit_max_retries,
            prompt_catalog: config.agent.prompt_catalog,
        }
    }
}

/// How a turn ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// The model answered with text, which was sent to the user.
    Replied(String),
    /// The model called a function; `result` is what went into history.
    FunctionCalled { name: String, result: String },
    /// Every attempt failed; the user got the apology.
    GaveUp,
}

/// A reply that is ready to be committed.
enum Classified {
    Content(String),
    FunctionCall {
        call: FunctionCall,
        args: FunctionArgs,
        /// Said to the user before the function runs.
        speak: Option<String>,
    },
}

/// Owns the role prompt and transcript of one session and runs its turns.
pub struct ConversationAgent {
    provider: Arc<dyn Provider>,
    registry: Arc<FunctionRegistry>,
    settings: AgentSettings,
    window: ContextWindowBuilder,
    system_prompt: String,
    history: ConversationHistory,
}

impl ConversationAgent {
    pub fn new(
        provider: Arc<dyn Provider>,
        registry: Arc<FunctionRegistry>,
        settings: AgentSettings,
    ) -> Self {
        let window = ContextWindowBuilder::new(settings.token_limit, settings.reserved_response_tokens);
        Self {
            provider,
            registry,
            settings,
            window,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            history: ConversationHistory::new(),
        }
    }

    /// Replace the role prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Start from a previously saved transcript.
    pub fn with_history(mut self, history: ConversationHistory) -> Self {
        self.history = history;
        self
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// The role prompt as sent, with the reply format and function listing
    /// in prompt-catalog mode.
    pub fn effective_system_prompt(&self) -> String {
        if !self.settings.prompt_catalog {
            return self.system_prompt.clone();
        }
        format!(
            "{JSON_REPLY_FORMAT}\n\n{}\n\nAvailable functions:\n```\n{}\n```",
            self.system_prompt,
            self.registry.to_prompt()
        )
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn replace_history(&mut self, history: ConversationHistory) {
        self.history = history;
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Run one turn for `prompt`, answering through `ctx`.
    ///
    /// Fatal errors (no active reply target, context overflow) abort the turn
    /// and are returned; every other failure triggers another attempt.
    pub async fn handle(&mut self, prompt: &str, ctx: &dyn CallerContext) -> Result<TurnOutcome> {
        debug!(prompt, "Handling turn");

        let attempts = self.settings.max_attempts.max(1);
        let suffix = if self.settings.prompt_catalog {
            JSON_RETRY_SUFFIX
        } else {
            RETRY_SUFFIX
        };
        let mut classified = None;
        for attempt in 1..=attempts {
            let input = if attempt == 1 {
                prompt.to_string()
            } else {
                format!("{prompt}{suffix}")
            };

            match self.round_trip(&input, ctx).await {
                Ok(reply) => {
                    classified = Some(reply);
                    break;
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    debug!(attempt, error = %e, "Failed to get a usable reply, trying again");
                }
            }
        }

        let Some(classified) = classified else {
            warn!(attempts, "Giving up on turn");
            ctx.reply_text(GIVE_UP_APOLOGY).await?;
            return Ok(TurnOutcome::GaveUp);
        };

        self.commit(prompt, classified, ctx).await
    }

    /// Build the window, call the backend and classify its reply.
    async fn round_trip(&mut self, input: &str, ctx: &dyn CallerContext) -> Result<Classified> {
        let catalog = if self.settings.prompt_catalog {
            Vec::new()
        } else {
            self.registry.to_json_schema()
        };
        let system_prompt = self.effective_system_prompt();
        let notice = TimeoutNotice { ctx };
        let mut throttled = 0u32;

        loop {
            let provider = &self.provider;
            let model = &self.settings.model;
            let window = self.window.build(
                &mut self.history,
                &WindowInput {
                    system_prompt: &system_prompt,
                    user_input: input,
                    tz_offset: ctx.tz_offset(),
                    now: Utc::now(),
                    catalog: &catalog,
                },
                |messages| provider.count_tokens(messages, model),
            )?;

            let request = ProviderRequest {
                model: model.clone(),
                messages: window.messages,
                temperature: self.settings.temperature,
                max_tokens: Some(u32::try_from(window.max_tokens).unwrap_or(u32::MAX)),
                functions: catalog.clone(),
            };

            match self.provider.complete(request, Some(&notice)).await {
                Ok(response) => {
                    if let Some(usage) = &response.usage {
                        debug!(
                            model = %response.model,
                            prompt_tokens = usage.prompt_tokens,
                            completion_tokens = usage.completion_tokens,
                            estimated = window.tokens_used,
                            "Backend replied"
                        );
                    }
                    return if self.settings.prompt_catalog {
                        classify_json(response.reply)
                    } else {
                        classify(response.reply)
                    };
                }
                Err(ProviderError::RateLimited { retry_after_secs }) => {
                    throttled += 1;
                    let cap = self.settings.rate_limit_max_retries;
                    if cap != 0 && throttled > cap {
                        warn!(retries = cap, "Rate limit retries exhausted");
                        return Err(ProviderError::RateLimited { retry_after_secs }.into());
                    }
                    warn!(
                        retry = throttled,
                        backoff_secs = self.settings.rate_limit_backoff.as_secs(),
                        "API rate limit reached, waiting"
                    );
                    tokio::time::sleep(self.settings.rate_limit_backoff).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Record the exchange and act on it.
    async fn commit(
        &mut self,
        prompt: &str,
        classified: Classified,
        ctx: &dyn CallerContext,
    ) -> Result<TurnOutcome> {
        match classified {
            Classified::Content(text) => {
                self.history.push(Message::user(prompt));
                self.history.push(Message::assistant(text.clone()));
                ctx.reply_text(&text).await?;
                Ok(TurnOutcome::Replied(text))
            }
            Classified::FunctionCall { call, args, speak } => {
                let name = call.name.clone();
                self.history.push(Message::user(prompt));
                self.history.push(Message::assistant_function_call(call));

                if let Some(speak) = speak {
                    ctx.reply_text(&speak).await?;
                }

                let rendered = Value::Object(args.clone()).to_string();
                info!(function = %name, args = %rendered, "Executing function");
                if let Err(e) = ctx
                    .push_notification(&format!("Executing function: {name}({rendered})"))
                    .await
                {
                    debug!(function = %name, error = %e, "Notification not delivered");
                }

                let result = self
                    .registry
                    .dispatch(ctx, &name, args)
                    .await
                    .unwrap_or_else(|| NO_RESULT.to_string());
                debug!(function = %name, result = %result, "Function finished");

                self.history
                    .push(Message::function_result(name.clone(), result.clone()));
                Ok(TurnOutcome::FunctionCalled { name, result })
            }
        }
    }
}

/// Sort a backend reply into content or a parsed function call.
fn classify(reply: AssistantReply) -> Result<Classified> {
    match reply {
        AssistantReply::Content(text) => Ok(Classified::Content(text)),
        AssistantReply::FunctionCall(call) => {
            if call.name.trim().is_empty() {
                return Err(Error::MalformedReply("Function call without a name".into()));
            }
            let args = parse_arguments(&call.arguments)?;
            Ok(Classified::FunctionCall {
                call,
                args,
                speak: None,
            })
        }
    }
}

/// Sort a reply written in the [`JSON_REPLY_FORMAT`].
///
/// A named function makes a call, with `thoughts.speak` said first. Without
/// one, the speech alone is the reply. A reply with neither is malformed.
fn classify_json(reply: AssistantReply) -> Result<Classified> {
    let text = match reply {
        AssistantReply::Content(text) => text,
        native @ AssistantReply::FunctionCall(_) => return classify(native),
    };

    let object = parse_arguments(&text)
        .map_err(|_| Error::MalformedReply(format!("Reply is not in the JSON format: {text}")))?;

    let speak = object
        .get("thoughts")
        .and_then(|thoughts| thoughts.get("speak"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|speak| !speak.is_empty())
        .map(String::from);

    let function = object.get("function");
    let name = function
        .and_then(|f| f.get("name"))
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();

    if name.is_empty() {
        return speak
            .map(Classified::Content)
            .ok_or_else(|| Error::MalformedReply(format!("Reply has no speech and no function: {text}")));
    }

    let args = match function.and_then(|f| f.get("args")) {
        None | Some(Value::Null) => FunctionArgs::new(),
        Some(Value::Object(args)) => args.clone(),
        Some(_) => {
            return Err(Error::MalformedReply(format!(
                "Function args must be a JSON object: {text}"
            )));
        }
    };

    let call = FunctionCall {
        name: name.to_string(),
        arguments: Value::Object(args.clone()).to_string(),
    };
    Ok(Classified::FunctionCall { call, args, speak })
}

/// Tells the user when the backend is slow.
struct TimeoutNotice<'a> {
    ctx: &'a dyn CallerContext,
}

#[async_trait]
impl TimeoutNotifier for TimeoutNotice<'_> {
    async fn on_request_timeout(&self, will_retry: bool) {
        let text = if will_retry {
            "Thinking timeout, retry."
        } else {
            "Thinking timeout, give up."
        };
        if let Err(e) = self.ctx.push_notification(text).await {
            debug!(error = %e, "Timeout notice not delivered");
        }
    }
}
