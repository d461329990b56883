//! Token-budgeted context window assembly.
//!
//! A request to the backend is laid out as:
//!
//! | Part | Source | Trim Strategy |
//! |------|--------|---------------|
//! | 1. Role prompt | Agent settings | Never trimmed |
//! | 2. Current time | UTC + session offset | Never trimmed |
//! | 3. History | Session transcript | Oldest dropped first |
//! | 4. User input | This turn | Never trimmed |
//!
//! The function catalog travels beside the messages but is still charged
//! against the budget, costed as if it were one extra message. That charge
//! is larger than what the backend really bills for function definitions.

use chrono::{DateTime, Duration, Utc};
use steward_core::error::{Error, Result};
use steward_core::message::{ConversationHistory, Message};
use steward_core::provider::FunctionDefinition;
use tracing::debug;

/// Everything about one turn the builder needs besides the history.
pub struct WindowInput<'a> {
    /// The agent's role prompt.
    pub system_prompt: &'a str,
    /// The new user input, sent last.
    pub user_input: &'a str,
    /// Session UTC offset in hours.
    pub tz_offset: i32,
    /// Wall clock used for the time preamble.
    pub now: DateTime<Utc>,
    /// Function catalog sent with the request.
    pub catalog: &'a [FunctionDefinition],
}

/// The assembled request messages and their accounting.
#[derive(Debug, Clone)]
pub struct ContextWindow {
    /// Preamble, selected history in chronological order, then the user input.
    pub messages: Vec<Message>,
    /// Estimated prompt cost, catalog included.
    pub tokens_used: usize,
    /// What is left of the token limit for the reply.
    pub max_tokens: usize,
    /// How many history entries made it into the window.
    pub history_included: usize,
}

/// Builds context windows under a fixed token limit. Stateless apart from
/// its limits; one instance serves every turn of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextWindowBuilder {
    token_limit: usize,
    reserved_response_tokens: usize,
}

impl ContextWindowBuilder {
    pub fn new(token_limit: usize, reserved_response_tokens: usize) -> Self {
        Self {
            token_limit,
            reserved_response_tokens,
        }
    }

    pub fn token_limit(&self) -> usize {
        self.token_limit
    }

    /// Tokens the request itself may spend.
    pub fn send_budget(&self) -> usize {
        self.token_limit.saturating_sub(self.reserved_response_tokens)
    }

    /// The system message stating the user's local time.
    pub fn time_message(now: DateTime<Utc>, tz_offset: i32) -> Message {
        let local = now + Duration::hours(i64::from(tz_offset));
        Message::system(format!("The current time and date is {}", local.format("%c")))
    }

    /// Assemble the window for one turn.
    ///
    /// `count` prices a list of messages (normally the provider's
    /// `count_tokens`). Costs of history entries are cached in `history` so
    /// each entry is priced once for its lifetime.
    ///
    /// # Algorithm
    ///
    /// 1. Price the preamble, the user input and the catalog
    /// 2. Walk history newest → oldest, stop at the first entry that would
    ///    push the total past the send budget
    /// 3. Splice accepted entries after the preamble, keeping their order
    /// 4. Fail with [`Error::ContextOverflow`] if the total tops the limit
    pub fn build<F>(
        &self,
        history: &mut ConversationHistory,
        input: &WindowInput<'_>,
        count: F,
    ) -> Result<ContextWindow>
    where
        F: Fn(&[Message]) -> usize,
    {
        let send_budget = self.send_budget();

        let preamble = vec![
            Message::system(input.system_prompt),
            Self::time_message(input.now, input.tz_offset),
        ];
        let mut used = count(&preamble);

        let user_message = Message::user(input.user_input);
        used += count(std::slice::from_ref(&user_message));

        let catalog_json = serde_json::to_string(input.catalog)?;
        used += count(&[Message::system(catalog_json)]);

        // Newest first; reversed below to restore chronological order.
        let mut selected = Vec::new();
        for index in (0..history.len()).rev() {
            let cost = match history.cached_tokens(index) {
                Some(cost) => cost,
                None => {
                    let Some(message) = history.get(index) else {
                        break;
                    };
                    let cost = count(std::slice::from_ref(message));
                    history.cache_tokens(index, cost);
                    cost
                }
            };

            if used + cost > send_budget {
                break;
            }
            if let Some(message) = history.get(index) {
                selected.push(message.clone());
                used += cost;
            }
        }
        selected.reverse();

        let Some(max_tokens) = self.token_limit.checked_sub(used) else {
            return Err(Error::ContextOverflow {
                used,
                limit: self.token_limit,
            });
        };

        let history_included = selected.len();
        let mut messages = preamble;
        messages.extend(selected);
        messages.push(user_message);

        debug!(
            tokens_used = used,
            send_budget,
            max_tokens,
            history_included,
            history_total = history.len(),
            "Context window built"
        );

        Ok(ContextWindow {
            messages,
            tokens_used: used,
            max_tokens,
            history_included,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
