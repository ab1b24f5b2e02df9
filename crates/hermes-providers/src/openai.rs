//! OpenAI-compatible chat completions provider.
//!
//! Talks to any endpoint that implements `POST {base_url}/chat/completions`
//! with bearer authentication. This covers OpenAI itself, Gemini's
//! OpenAI-compatibility endpoint, Anthropic-fronting gateways, and local
//! servers such as llama.cpp or vLLM.
//!
//! Only non-streaming completions are implemented: every workflow stage waits
//! for the whole reply before parsing it.
//!
//! # Usage
//!
//! ```rust,no_run
//! use hermes_providers::{CompletionRequest, LLMProvider, Message, OpenAiCompatibleProvider};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let provider = OpenAiCompatibleProvider::new(
//!         "your-api-key".to_string(),
//!         Some("gpt-4o-mini".to_string()),
//!         None, // base_url (defaults to api.openai.com)
//!         Some(1024),
//!         Some(0.7),
//!     )?;
//!
//!     let request = CompletionRequest {
//!         messages: vec![
//!             Message::system("You are a travel assistant."),
//!             Message::user("Is 'a weekend in Lisbon' a travel request?"),
//!         ],
//!         ..Default::default()
//!     };
//!
//!     let response = provider.complete(request).await?;
//!     println!("Response: {}", response.content);
//!     Ok(())
//! }
//! ```

use anyhow::Result;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::{
    CompletionRequest, CompletionResponse, LLMProvider, Message, MessageRole, ProviderError,
    Usage,
};

/// Default base URL for the OpenAI API
pub const OPENAI_DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default model when none is configured
pub const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default HTTP timeout for one completion
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Provider for OpenAI-compatible `chat/completions` endpoints.
#[derive(Clone)]
pub struct OpenAiCompatibleProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    name: String,
}

impl OpenAiCompatibleProvider {
    /// Create a provider named `openai` with the default request timeout.
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Result<Self> {
        Self::new_with_name(
            "openai".to_string(),
            api_key,
            model,
            base_url,
            max_tokens,
            temperature,
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )
    }

    /// Create a provider with a custom name (e.g. `gemini`, `local`).
    #[allow(clippy::too_many_arguments)]
    pub fn new_with_name(
        name: String,
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
        timeout_secs: u64,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ProviderError::Transport {
                provider: name.clone(),
                reason: format!("failed to create HTTP client: {}", e),
            })?;

        let model = model.unwrap_or_else(|| OPENAI_DEFAULT_MODEL.to_string());
        let base_url = base_url
            .unwrap_or_else(|| OPENAI_DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        debug!(
            "Initialized provider '{}' with model: {}, base_url: {}",
            name, model, base_url
        );

        Ok(Self {
            client,
            api_key,
            model,
            base_url,
            max_tokens,
            temperature,
            name,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// Create the request body for the chat completions API.
    fn create_request_body(
        &self,
        messages: &[Message],
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> serde_json::Value {
        let mut body = json!({
            "model": self.model,
            "messages": convert_messages(messages),
            "stream": false,
        });

        if let Some(max_tokens) = max_tokens.or(self.max_tokens) {
            body["max_tokens"] = json!(max_tokens);
        }

        if let Some(temperature) = temperature.or(self.temperature) {
            body["temperature"] = json!(temperature);
        }

        body
    }
}

#[async_trait::async_trait]
impl LLMProvider for OpenAiCompatibleProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        debug!(
            "Processing {} completion request with {} messages",
            self.name,
            request.messages.len()
        );

        let body =
            self.create_request_body(&request.messages, request.max_tokens, request.temperature);

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport {
                provider: self.name.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ProviderError::Api {
                provider: self.name.clone(),
                status: status.as_u16(),
                body: error_text,
            }
            .into());
        }

        let chat_response: ChatResponse =
            response
                .json()
                .await
                .map_err(|e| ProviderError::InvalidResponse {
                    provider: self.name.clone(),
                    reason: e.to_string(),
                })?;

        let content = chat_response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .unwrap_or_default();

        let usage = chat_response
            .usage
            .map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        debug!(
            "{} completion successful: {} tokens generated",
            self.name, usage.completion_tokens
        );

        Ok(CompletionResponse {
            content,
            usage,
            model: chat_response.model.unwrap_or_else(|| self.model.clone()),
        })
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn max_tokens(&self) -> Option<u32> {
        self.max_tokens
    }

    fn temperature(&self) -> f32 {
        self.temperature.unwrap_or(0.7)
    }
}

/// Convert messages to the OpenAI wire format.
fn convert_messages(messages: &[Message]) -> Vec<serde_json::Value> {
    messages
        .iter()
        .map(|msg| {
            json!({
                "role": match msg.role {
                    MessageRole::System => "system",
                    MessageRole::User => "user",
                    MessageRole::Assistant => "assistant",
                },
                "content": msg.content,
            })
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// API Response Structures
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> OpenAiCompatibleProvider {
        OpenAiCompatibleProvider::new(
            "test-api-key".to_string(),
            Some("gpt-4o".to_string()),
            None,
            Some(2048),
            Some(0.2),
        )
        .unwrap()
    }

    #[test]
    fn test_provider_creation() {
        let provider = provider();

        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.model(), "gpt-4o");
        assert_eq!(provider.max_tokens(), Some(2048));
        assert_eq!(provider.temperature(), 0.2);
        assert_eq!(
            provider.endpoint(),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_provider_with_custom_name_and_base_url() {
        let provider = OpenAiCompatibleProvider::new_with_name(
            "gemini".to_string(),
            "key".to_string(),
            None,
            Some("https://generativelanguage.googleapis.com/v1beta/openai/".to_string()),
            None,
            None,
            30,
        )
        .unwrap();

        assert_eq!(provider.name(), "gemini");
        assert_eq!(provider.model(), OPENAI_DEFAULT_MODEL);
        assert_eq!(
            provider.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions"
        );
        assert_eq!(provider.temperature(), 0.7);
    }

    #[test]
    fn test_message_conversion() {
        let messages = vec![
            Message::system("You are a travel agent."),
            Message::user("Plan a trip"),
            Message::new(MessageRole::Assistant, "Sure".to_string()),
        ];

        let converted = convert_messages(&messages);

        assert_eq!(converted.len(), 3);
        assert_eq!(converted[0]["role"], "system");
        assert_eq!(converted[0]["content"], "You are a travel agent.");
        assert_eq!(converted[1]["role"], "user");
        assert_eq!(converted[2]["role"], "assistant");
    }

    #[test]
    fn test_request_body_uses_configured_defaults() {
        let provider = provider();
        let body = provider.create_request_body(&[Message::user("hi")], None, None);

        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["stream"], false);
        assert_eq!(body["max_tokens"], 2048);
        assert!((body["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_request_body_per_request_overrides() {
        let provider = provider();
        let body = provider.create_request_body(&[Message::user("hi")], Some(10), Some(1.0));

        assert_eq!(body["max_tokens"], 10);
        assert_eq!(body["temperature"], 1.0);
    }

    #[test]
    fn test_request_body_omits_unset_limits() {
        let provider =
            OpenAiCompatibleProvider::new("k".to_string(), None, None, None, None).unwrap();
        let body = provider.create_request_body(&[Message::user("hi")], None, None);

        assert!(body.get("max_tokens").is_none());
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn test_response_deserialization() {
        let raw = r#"{
            "id": "chatcmpl-1",
            "model": "gpt-4o",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "{\"score\": 0.9}"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 5, "total_tokens": 17}
        }"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();

        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some("{\"score\": 0.9}")
        );
        assert_eq!(parsed.usage.unwrap().total_tokens, 17);
    }

    #[test]
    fn test_response_without_usage_or_content() {
        let raw = r#"{"choices": [{"message": {"content": null}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();

        assert!(parsed.usage.is_none());
        assert!(parsed.model.is_none());
        assert!(parsed.choices[0].message.content.is_none());
    }
}
