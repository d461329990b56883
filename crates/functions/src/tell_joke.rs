//! `tell_joke`: replies with a joke from a built-in collection.

use async_trait::async_trait;
use rand::seq::IndexedRandom;
use steward_core::error::FunctionError;
use steward_core::function::{FunctionArgs, FunctionHandler, FunctionSpec};
use steward_core::reply::CallerContext;
use tracing::debug;

const JOKES: &[&str] = &[
    "Why do programmers prefer dark mode? Because light attracts bugs.",
    "I told my computer I needed a break, and it said: \"No problem, I'll go to sleep.\"",
    "Why did the developer go broke? Because he used up all his cache.",
    "There are 10 kinds of people in the world: those who understand binary and those who don't.",
    "Why was the function sad after the party? It didn't get any arguments.",
    "A SQL query walks into a bar, walks up to two tables and asks: \"Can I join you?\"",
    "Why don't skeletons fight each other? They don't have the guts.",
    "I would tell you a UDP joke, but you might not get it.",
];

pub fn spec() -> FunctionSpec {
    FunctionSpec::new(
        "tell_joke",
        "Tell a joke. DO NOT come up with a joke if you call this function, this module will tell one.",
    )
}

pub struct TellJoke;

#[async_trait]
impl FunctionHandler for TellJoke {
    async fn call(
        &self,
        ctx: &dyn CallerContext,
        _args: FunctionArgs,
    ) -> Result<Option<String>, FunctionError> {
        let joke = JOKES
            .choose(&mut rand::rng())
            .copied()
            .ok_or_else(|| FunctionError::Unexpected("joke collection is empty".into()))?;
        debug!(joke, "Telling a joke");
        ctx.reply_text(joke).await?;
        Ok(Some(joke.to_string()))
    }
}
