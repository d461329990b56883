//! Provider construction from configuration.

use std::sync::Arc;
use std::time::Duration;
use steward_config::AppConfig;
use steward_core::error::ProviderError;
use steward_core::provider::Provider;
use tracing::info;
use crate::openai_compat::OpenAiCompatProvider;
use crate::retrying::RetryingProvider;

/// Build the generative backend described by `config`, wrapped in the
/// transport retry policy.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let api_key = match (&config.api_key, needs_api_key(&config.provider)) {
        (Some(key), _) => key.clone(),
        (None, false) => String::new(),
        (None, true) => {
            return Err(ProviderError::NotConfigured(format!(
                "No API key for provider '{}'; set STEWARD_API_KEY or api_key in config.toml",
                config.provider
            )));
        }
    };

    let base_url = config
        .api_url
        .clone()
        .unwrap_or_else(|| default_base_url(&config.provider));

    info!(provider = %config.provider, url = %base_url, model = %config.model, "Building provider");

    let inner = Arc::new(OpenAiCompatProvider::new(&config.provider, &base_url, api_key)?);
    Ok(Arc::new(
        RetryingProvider::new(inner)
            .with_timeout(Duration::from_secs(config.transport.request_timeout_secs))
            .with_attempts(config.transport.attempts),
    ))
}

/// Local servers accept any key.
fn needs_api_key(provider_name: &str) -> bool {
    !matches!(provider_name, "ollama" | "vllm" | "llamacpp" | "llama.cpp")
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openai" => "https://api.openai.com/v1".into(),
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1".into(),
        _ => "https://api.openai.com/v1".into(),
    }
}
