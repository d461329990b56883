//! Built-in function modules for Steward.
//!
//! Functions are what the model can do besides talking: each module exposes
//! its [`FunctionSpec`](steward_core::FunctionSpec) and a handler, and
//! [`default_registry`] is the static manifest wiring them together.

pub mod do_nothing;
pub mod tell_joke;
pub mod toggle_light;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;
use steward_core::function::FunctionRegistry;

/// Create a registry with every built-in function.
pub fn default_registry() -> FunctionRegistry {
    let mut registry = FunctionRegistry::new();
    registry.register(do_nothing::spec(), Arc::new(do_nothing::DoNothing));
    registry.register(tell_joke::spec(), Arc::new(tell_joke::TellJoke));
    registry.register(toggle_light::spec(), Arc::new(toggle_light::ToggleLight));
    registry
}
