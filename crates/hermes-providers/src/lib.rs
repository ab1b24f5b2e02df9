//! LLM provider abstractions for Hermes.
//!
//! The workflow engine never talks to a model directly. It goes through the
//! [`LLMProvider`] trait defined here, which takes a list of chat messages and
//! returns the completion text. One concrete implementation ships with the
//! crate: [`OpenAiCompatibleProvider`], which speaks the `chat/completions`
//! dialect that OpenAI, Gemini's compatibility endpoint, and most local
//! inference servers accept.
//!
//! Enable the `test-support` feature to get [`MockProvider`], a scripted
//! provider for tests in downstream crates.

pub mod openai;

#[cfg(any(test, feature = "test-support"))]
pub mod mock;

#[cfg(any(test, feature = "test-support"))]
pub use mock::MockProvider;
pub use openai::OpenAiCompatibleProvider;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn new(role: MessageRole, content: String) -> Self {
        Self { role, content }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content.into())
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content.into())
    }
}

/// A non-streaming completion request.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    /// Overrides the provider's configured limit when set.
    pub max_tokens: Option<u32>,
    /// Overrides the provider's configured temperature when set.
    pub temperature: Option<f32>,
}

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// The provider's reply.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub usage: Usage,
    pub model: String,
}

/// Failures at the provider boundary.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("API key environment variable '{0}' is not set")]
    MissingApiKey(String),

    #[error("Failed to send request to {provider}: {reason}")]
    Transport { provider: String, reason: String },

    #[error("{provider} API error {status}: {body}")]
    Api {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("Failed to parse {provider} response: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// A language model that can complete a conversation.
#[async_trait::async_trait]
pub trait LLMProvider: Send + Sync {
    /// Run a single completion and return the full reply.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Configured provider name (e.g. `openai`, `gemini`).
    fn name(&self) -> &str;

    /// Model identifier sent with each request.
    fn model(&self) -> &str;

    fn max_tokens(&self) -> Option<u32> {
        None
    }

    fn temperature(&self) -> f32 {
        0.7
    }
}
