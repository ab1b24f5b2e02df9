//! The boundary between the workflow engine and a language model.
//!
//! The engine only ever hands over a [`TaskSpec`] and gets plain text back.
//! Everything provider-specific (message framing, response shape) stays on
//! this side of the boundary.

use anyhow::{Context, Result};
use async_trait::async_trait;
use hermes_providers::{CompletionRequest, LLMProvider, Message};
use std::sync::Arc;
use tracing::{debug, info};

use crate::agents::AgentRegistry;
use crate::prompts::PromptLibrary;
use crate::tasks::TaskSpec;

/// Executes one task against a model and returns its raw text.
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    async fn invoke(&self, task: &TaskSpec) -> Result<String>;
}

#[async_trait]
impl<T: ModelInvoker + ?Sized> ModelInvoker for Arc<T> {
    async fn invoke(&self, task: &TaskSpec) -> Result<String> {
        (**self).invoke(task).await
    }
}

/// [`ModelInvoker`] backed by an [`LLMProvider`].
pub struct ProviderInvoker<P: LLMProvider> {
    provider: P,
    agents: AgentRegistry,
    prompts: PromptLibrary,
}

impl<P: LLMProvider> ProviderInvoker<P> {
    pub fn new(provider: P, prompts: PromptLibrary) -> Self {
        Self {
            provider,
            agents: AgentRegistry::builtin(),
            prompts,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Frame a task as a system message (persona + template) and a user
    /// message (instructions, inputs, expected output).
    pub fn render_messages(&self, task: &TaskSpec) -> Vec<Message> {
        let mut system = String::new();
        if let Some(profile) = self.agents.get(task.role) {
            system.push_str(&format!(
                "You are {}, the crew's {}.\nGoal: {}\nBackstory: {}\n",
                profile.display_name, profile.title, profile.goal, profile.backstory
            ));
        }
        if let Some(template) = self.prompts.render(task.role.prompt_key(), &task.inputs) {
            system.push('\n');
            system.push_str(&template);
        }

        let inputs = serde_json::to_string_pretty(&task.inputs).unwrap_or_else(|_| "{}".into());
        let mut user = format!("{}\n\nInputs:\n{}\n", task.description, inputs);
        if !task.context.is_empty() {
            user.push_str(&format!("\nBuilds on: {}\n", task.context.join(", ")));
        }
        user.push_str(&format!(
            "\nExpected output: {}\nRespond with the JSON only.",
            task.expected_output
        ));

        vec![Message::system(system.trim_end()), Message::user(user)]
    }
}

#[async_trait]
impl<P: LLMProvider> ModelInvoker for ProviderInvoker<P> {
    async fn invoke(&self, task: &TaskSpec) -> Result<String> {
        info!(
            "Invoking {} for task '{}' ({})",
            self.provider.name(),
            task.id,
            task.role
        );

        let request = CompletionRequest {
            messages: self.render_messages(task),
            max_tokens: self.provider.max_tokens(),
            temperature: Some(self.provider.temperature()),
        };

        let response = self
            .provider
            .complete(request)
            .await
            .with_context(|| format!("Model call for task '{}' failed", task.id))?;

        debug!(
            "Task '{}' returned {} chars ({} tokens)",
            task.id,
            response.content.len(),
            response.usage.total_tokens
        );

        Ok(normalize_response(&response.content))
    }
}

/// Reduce a model reply to plain text.
///
/// Trims whitespace, drops a leading byte-order mark and unwraps a single
/// Markdown code fence that encloses the whole reply.
pub fn normalize_response(raw: &str) -> String {
    let text = raw.trim_start_matches('\u{feff}').trim();

    if let Some(inner) = text.strip_prefix("```") {
        if let Some(body) = inner.strip_suffix("```") {
            // Drop the info string (e.g. `json`) on the opening line.
            let body = match body.find('\n') {
                Some(newline) if !body[..newline].contains('{') => &body[newline + 1..],
                _ => body,
            };
            if !body.contains("```") {
                return body.trim().to_string();
            }
        }
    }

    text.to_string()
}
