//! Configuration loading, validation, and management for Steward.
//!
//! Loads configuration from `~/.steward/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.steward/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the generative backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Generative backend name ("openai" or any OpenAI-compatible endpoint)
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Base URL override for the backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Model used for conversation turns
    #[serde(default = "default_model")]
    pub model: String,

    /// Cheaper model for auxiliary work
    #[serde(default = "default_model")]
    pub small_model: String,

    /// Sampling temperature
    #[serde(default)]
    pub temperature: f32,

    /// Turn handling and context budgeting
    #[serde(default)]
    pub agent: AgentConfig,

    /// Backend request timeouts and retries
    #[serde(default)]
    pub transport: TransportConfig,

    /// Conversation history persistence
    #[serde(default)]
    pub history: HistoryConfig,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-3.5-turbo-0613".into()
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("provider", &self.provider)
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("small_model", &self.small_model)
            .field("temperature", &self.temperature)
            .field("agent", &self.agent)
            .field("transport", &self.transport)
            .field("history", &self.history)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Total token budget of one request (prompt + reply)
    #[serde(default = "default_token_limit")]
    pub token_limit: usize,

    /// Tokens held back from the prompt for the reply
    #[serde(default = "default_reserved_response_tokens")]
    pub reserved_response_tokens: usize,

    /// Attempts per turn before apologizing
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Replaces the built-in role prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// List the functions in the role prompt and expect JSON replies instead
    /// of using the backend's native function calling
    #[serde(default)]
    pub prompt_catalog: bool,
}

fn default_token_limit() -> usize {
    4000
}
fn default_reserved_response_tokens() -> usize {
    1000
}
fn default_max_attempts() -> u32 {
    3
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            token_limit: default_token_limit(),
            reserved_response_tokens: default_reserved_response_tokens(),
            max_attempts: default_max_attempts(),
            system_prompt: None,
            prompt_catalog: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Request attempts when the backend times out or answers 502
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    /// Sleep between rate-limited round trips, in seconds
    #[serde(default = "default_rate_limit_backoff_secs")]
    pub rate_limit_backoff_secs: u64,

    /// Rate-limited round trips tolerated per attempt (0 = unbounded)
    #[serde(default = "default_rate_limit_max_retries")]
    pub rate_limit_max_retries: u32,
}

fn default_request_timeout_secs() -> u64 {
    40
}
fn default_attempts() -> u32 {
    3
}
fn default_rate_limit_backoff_secs() -> u64 {
    10
}
fn default_rate_limit_max_retries() -> u32 {
    30
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            attempts: default_attempts(),
            rate_limit_backoff_secs: default_rate_limit_backoff_secs(),
            rate_limit_max_retries: default_rate_limit_max_retries(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Root directory for history files; no persistence when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.steward/config.toml).
    ///
    /// Environment variables override the file:
    /// - `STEWARD_API_KEY` (highest priority), then `OPENAI_API_KEY`
    /// - `STEWARD_PROVIDER`, `STEWARD_API_URL`, `STEWARD_MODEL`
    /// - `STEWARD_TOKEN_LIMIT`, `STEWARD_TEMPERATURE`, `STEWARD_HISTORY_DIR`
    /// - `STEWARD_PROMPT_CATALOG` (`true`/`false`)
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("STEWARD_API_KEY").or_else(|| lookup("OPENAI_API_KEY")) {
            self.api_key = Some(key);
        }
        if let Some(provider) = lookup("STEWARD_PROVIDER") {
            self.provider = provider;
        }
        if let Some(url) = lookup("STEWARD_API_URL") {
            self.api_url = Some(url);
        }
        if let Some(model) = lookup("STEWARD_MODEL") {
            self.model = model;
        }
        if let Some(limit) = lookup("STEWARD_TOKEN_LIMIT") {
            self.agent.token_limit = parse_var("STEWARD_TOKEN_LIMIT", &limit)?;
        }
        if let Some(temperature) = lookup("STEWARD_TEMPERATURE") {
            self.temperature = parse_var("STEWARD_TEMPERATURE", &temperature)?;
        }
        if let Some(dir) = lookup("STEWARD_HISTORY_DIR") {
            self.history.dir = Some(PathBuf::from(dir));
        }
        if let Some(flag) = lookup("STEWARD_PROMPT_CATALOG") {
            self.agent.prompt_catalog = parse_var("STEWARD_PROMPT_CATALOG", &flag)?;
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".steward")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.reserved_response_tokens >= self.agent.token_limit {
            return Err(ConfigError::ValidationError(format!(
                "reserved_response_tokens ({}) must be below token_limit ({})",
                self.agent.reserved_response_tokens, self.agent.token_limit
            )));
        }

        if self.agent.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "max_attempts must be at least 1".into(),
            ));
        }

        if self.transport.attempts == 0 {
            return Err(ConfigError::ValidationError(
                "transport attempts must be at least 1".into(),
            ));
        }

        if self.transport.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "request_timeout_secs must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for the `doctor` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            provider: default_provider(),
            api_url: None,
            model: default_model(),
            small_model: default_model(),
            temperature: 0.0,
            agent: AgentConfig::default(),
            transport: TransportConfig::default(),
            history: HistoryConfig::default(),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| {
        ConfigError::ValidationError(format!("{name} has an invalid value: {value:?}"))
    })
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
