//! OpenAI-compatible provider implementation.
//!
//! Works with OpenAI and any endpoint exposing the same
//! `/chat/completions` API with function calling (`functions` catalog in,
//! `function_call` out).

use async_trait::async_trait;
use serde::Deserialize;
use steward_core::error::ProviderError;
use steward_core::message::FunctionCall;
use steward_core::provider::*;
use tracing::{debug, warn};

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request_body(request: &ProviderRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": request.messages,
            "temperature": request.temperature,
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.functions.is_empty() {
            body["functions"] = serde_json::json!(request.functions);
        }

        body
    }
}

/// Turn the first choice of a completion into a reply.
///
/// A non-empty `function_call` wins over content; a choice with neither is
/// an invalid response.
fn classify(message: ApiMessage) -> Result<AssistantReply, ProviderError> {
    match (message.content, message.function_call) {
        (None, Some(call)) => Ok(AssistantReply::FunctionCall(FunctionCall {
            name: call.name,
            arguments: call.arguments,
        })),
        (Some(content), Some(call)) if content.trim().is_empty() => {
            Ok(AssistantReply::FunctionCall(FunctionCall {
                name: call.name,
                arguments: call.arguments,
            }))
        }
        (Some(content), _) => Ok(AssistantReply::Content(content)),
        (None, None) => Err(ProviderError::InvalidResponse(
            "Choice has neither content nor function_call".into(),
        )),
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
        _notifier: Option<&dyn TimeoutNotifier>,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::request_body(&request);

        debug!(
            provider = %self.name,
            model = %request.model,
            messages = request.messages.len(),
            functions = request.functions.len(),
            "Sending completion request"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();

        if status == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(0);
            return Err(ProviderError::RateLimited { retry_after_secs });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".into()))?;

        let reply = classify(choice.message)?;

        let usage = api_response.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(ProviderResponse {
            reply,
            usage,
            model: api_response.model,
        })
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    function_call: Option<ApiFunctionCall>,
}

#[derive(Debug, Deserialize)]
struct ApiFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use steward_core::message::Message;

    #[test]
    fn openai_constructor() {
        let p = OpenAiCompatProvider::openai("sk-test").unwrap();
        assert_eq!(p.name(), "openai");
        assert_eq!(p.base_url(), "https://api.openai.com/v1");
    }

    #[test]
    fn trailing_slash_trimmed() {
        let p = OpenAiCompatProvider::new("local", "http://localhost:8000/v1/", "").unwrap();
        assert_eq!(p.base_url(), "http://localhost:8000/v1");
    }

    #[test]
    fn request_body_carries_functions_and_budget() {
        let request = ProviderRequest {
            model: "gpt-3.5-turbo-0613".into(),
            messages: vec![Message::system("be brief"), Message::user("hi")],
            temperature: 0.0,
            max_tokens: Some(1200),
            functions: vec![FunctionDefinition {
                name: "do_nothing".into(),
                description: "Do nothing".into(),
                parameters: serde_json::json!({"type": "object", "properties": {}, "required": []}),
            }],
        };
        let body = OpenAiCompatProvider::request_body(&request);
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["max_tokens"], 1200);
        assert_eq!(body["functions"][0]["name"], "do_nothing");
    }

    #[test]
    fn request_body_omits_empty_catalog() {
        let request = ProviderRequest {
            model: "m".into(),
            messages: vec![],
            temperature: 0.0,
            max_tokens: None,
            functions: vec![],
        };
        let body = OpenAiCompatProvider::request_body(&request);
        assert!(body.get("functions").is_none());
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn parse_content_reply() {
        let json = r#"{"model": "gpt-3.5-turbo-0613",
            "choices": [{"message": {"role": "assistant", "content": "Hello!"}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 2, "total_tokens": 12}}"#;
        let resp: ApiResponse = serde_json::from_str(json).unwrap();
        let message = resp.choices.into_iter().next().unwrap().message;
        assert_eq!(classify(message).unwrap(), AssistantReply::Content("Hello!".into()));
    }

    #[test]
    fn parse_function_call_reply() {
        let json = r#"{"model": "gpt-3.5-turbo-0613",
            "choices": [{"message": {"role": "assistant", "content": null,
                "function_call": {"name": "toggle_light",
                                  "arguments": "{\"room\": \"kitchen\", \"on\": true}"}}}]}"#;
        let resp: ApiResponse = serde_json::from_str(json).unwrap();
        let message = resp.choices.into_iter().next().unwrap().message;
        match classify(message).unwrap() {
            AssistantReply::FunctionCall(call) => {
                assert_eq!(call.name, "toggle_light");
                assert!(call.arguments.contains("kitchen"));
            }
            other => panic!("Expected a function call, got {other:?}"),
        }
    }

    #[test]
    fn empty_choice_is_invalid() {
        let message = ApiMessage {
            content: None,
            function_call: None,
        };
        assert!(matches!(classify(message), Err(ProviderError::InvalidResponse(_))));
    }
}
