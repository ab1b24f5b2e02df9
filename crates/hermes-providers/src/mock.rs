//! Scripted provider for tests.

use anyhow::{anyhow, Result};
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::{CompletionRequest, CompletionResponse, LLMProvider, Usage};

/// Replays queued replies in order and records every request it receives.
pub struct MockProvider {
    name: String,
    model: String,
    replies: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            model: "mock-model".to_string(),
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a successful reply.
    pub fn with_reply(self, content: impl Into<String>) -> Self {
        self.push(Ok(content.into()));
        self
    }

    /// Queue a failed call.
    pub fn with_error(self, message: impl Into<String>) -> Self {
        self.push(Err(message.into()));
        self
    }

    fn push(&self, reply: Result<String, String>) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
    }

    /// Requests seen so far, oldest first.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl LLMProvider for MockProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }

        let next = self
            .replies
            .lock()
            .map_err(|_| anyhow!("MockProvider reply queue poisoned"))?
            .pop_front()
            .ok_or_else(|| anyhow!("MockProvider has no scripted replies left"))?;

        match next {
            Ok(content) => Ok(CompletionResponse {
                content,
                usage: Usage::default(),
                model: self.model.clone(),
            }),
            Err(message) => Err(anyhow!(message)),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }
}
