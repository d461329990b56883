//! `toggle_light`: switches the light in a room.
//!
//! There is no hardware behind it yet; the handler validates its arguments
//! and confirms the change to the user.

use async_trait::async_trait;
use serde_json::Value;
use steward_core::error::FunctionError;
use steward_core::function::{FunctionArgs, FunctionHandler, FunctionSpec, Parameter};
use steward_core::reply::CallerContext;
use tracing::info;

pub fn spec() -> FunctionSpec {
    FunctionSpec::new("toggle_light", "Turn on/off the light.")
        .with_parameter(Parameter::new("room", "string", "The room name"))
        .with_parameter(Parameter::new("on", "boolean", "Turn on or off"))
}

pub struct ToggleLight;

#[async_trait]
impl FunctionHandler for ToggleLight {
    async fn call(
        &self,
        ctx: &dyn CallerContext,
        args: FunctionArgs,
    ) -> Result<Option<String>, FunctionError> {
        let room = args
            .get("room")
            .and_then(Value::as_str)
            .filter(|r| !r.trim().is_empty())
            .ok_or_else(|| FunctionError::bad_argument("missing room name"))?;
        let on = args
            .get("on")
            .and_then(Value::as_bool)
            .ok_or_else(|| FunctionError::bad_argument("'on' must be true or false"))?;

        info!(room, on, "Toggling light");
        let state = if on { "on" } else { "off" };
        ctx.reply_text(&format!("The light in {room} has turn {state}"))
            .await?;
        Ok(Some("Success".into()))
    }
}
