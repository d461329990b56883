//! Function registry: the capabilities the model may ask to invoke.
//!
//! Each function has a [`FunctionSpec`] (what the model is told) and a
//! [`FunctionHandler`] (what actually runs). The registry renders the catalog
//! both as a JSON-schema list for the backend and as a numbered text listing
//! for the system prompt, and dispatches calls with full error containment:
//! a handler can fail or even panic without taking down its session.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::error::FunctionError;
use crate::provider::FunctionDefinition;
use crate::reply::CallerContext;

/// Result string for a call to an unregistered function.
pub const MODULE_NOT_FOUND: &str = "(Module Not Found)";

/// Result string for a call whose handler failed.
pub const FAILED: &str = "Failed";

/// Arguments of a function call, decoded from the model's JSON object.
pub type FunctionArgs = Map<String, Value>;

/// One named argument of a function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,

    /// JSON Schema type name ("string", "boolean", "integer", ...)
    #[serde(rename = "type")]
    pub kind: String,

    pub description: String,

    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl Parameter {
    /// A required parameter.
    pub fn new(name: impl Into<String>, kind: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            description: description.into(),
            required: true,
        }
    }

    /// Mark this parameter as optional.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// Name, description and signature of a function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
}

impl FunctionSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// JSON Schema definition sent to the backend. Properties keep the
    /// order the parameters were declared in.
    pub fn to_definition(&self) -> FunctionDefinition {
        let properties: Map<String, Value> = self
            .parameters
            .iter()
            .map(|p| {
                (
                    p.name.clone(),
                    serde_json::json!({ "type": p.kind, "description": p.description }),
                )
            })
            .collect();
        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        FunctionDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": properties,
                "required": required,
            }),
        }
    }

    fn prompt_line(&self, index: usize) -> String {
        if self.parameters.is_empty() {
            format!("{index}. {}: {}, don't need argument", self.name, self.description)
        } else {
            let args = self
                .parameters
                .iter()
                .map(|p| format!("{}: <{}>", p.name, p.description))
                .collect::<Vec<_>>()
                .join(", ");
            format!("{index}. {}: {}, args: {args}", self.name, self.description)
        }
    }
}

/// The code that runs when the model calls a function.
///
/// `Ok(None)` means the handler finished without anything to report back.
#[async_trait]
pub trait FunctionHandler: Send + Sync {
    async fn call(
        &self,
        ctx: &dyn CallerContext,
        args: FunctionArgs,
    ) -> std::result::Result<Option<String>, FunctionError>;
}

struct RegisteredFunction {
    spec: FunctionSpec,
    handler: Arc<dyn FunctionHandler>,
}

/// A registry of available functions, ordered by name.
///
/// Built once at startup and shared read-only across sessions.
pub struct FunctionRegistry {
    functions: BTreeMap<String, RegisteredFunction>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self {
            functions: BTreeMap::new(),
        }
    }

    /// Register a function. Replaces any existing function with the same name.
    pub fn register(&mut self, spec: FunctionSpec, handler: Arc<dyn FunctionHandler>) {
        if self.functions.contains_key(&spec.name) {
            warn!(function = %spec.name, "Replacing previously registered function");
        }
        debug!(function = %spec.name, "Registering function");
        self.functions
            .insert(spec.name.clone(), RegisteredFunction { spec, handler });
    }

    /// Get a function spec by name.
    pub fn get(&self, name: &str) -> Option<&FunctionSpec> {
        self.functions.get(name).map(|f| &f.spec)
    }

    /// All registered specs, sorted by name.
    pub fn specs(&self) -> impl Iterator<Item = &FunctionSpec> {
        self.functions.values().map(|f| &f.spec)
    }

    pub fn names(&self) -> Vec<&str> {
        self.functions.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Function definitions for the backend, sorted by name.
    pub fn to_json_schema(&self) -> Vec<FunctionDefinition> {
        self.specs().map(FunctionSpec::to_definition).collect()
    }

    /// Numbered catalog listing for the system prompt. No trailing newline.
    pub fn to_prompt(&self) -> String {
        self.specs()
            .enumerate()
            .map(|(i, spec)| spec.prompt_line(i + 1))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Invoke a function by name.
    ///
    /// Never fails: unknown names yield [`MODULE_NOT_FOUND`]; handler errors
    /// and panics are logged, apologized for through `ctx`, and yield
    /// [`FAILED`].
    pub async fn dispatch(
        &self,
        ctx: &dyn CallerContext,
        name: &str,
        args: FunctionArgs,
    ) -> Option<String> {
        let Some(function) = self.functions.get(name) else {
            warn!(function = %name, "Call to unknown function");
            return Some(MODULE_NOT_FOUND.to_string());
        };

        let outcome = AssertUnwindSafe(function.handler.call(ctx, args))
            .catch_unwind()
            .await;

        let apology = match outcome {
            Ok(Ok(result)) => return result,
            Ok(Err(FunctionError::Domain { code, message })) => {
                error!(function = %name, code, error = %message, "Function failed");
                format!("Sorry, failed to do the job: {message}")
            }
            Ok(Err(FunctionError::Reply(e))) => {
                error!(function = %name, error = %e, "Function could not reply");
                format!("Sorry, failed to do the job: {e}")
            }
            Ok(Err(FunctionError::Unexpected(message))) => {
                error!(function = %name, error = %message, "Function raised an unexpected error");
                "Sorry, an unknown error occurred during doing the job".to_string()
            }
            Err(panic) => {
                error!(function = %name, panic = %panic_message(&*panic), "Function panicked");
                "Sorry, an unknown error occurred during doing the job".to_string()
            }
        };

        if let Err(e) = ctx.reply_text(&apology).await {
            debug!(function = %name, error = %e, "Apology not delivered");
        }
        Some(FAILED.to_string())
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
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
