//! Workflow node definitions.
//!
//! A node binds a graph position to the stage it runs. The agent role is
//! derived from the stage.

use hermes_core::AgentRole;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::stages::Stage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub stage: Stage,
    /// Overrides the executor's stage timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Node {
    pub fn new(id: impl Into<String>, stage: Stage) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            stage,
            timeout_secs: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = Some(timeout_secs);
        self
    }

    pub fn agent_role(&self) -> AgentRole {
        self.stage.role()
    }

    /// Effective timeout given the executor default.
    pub fn timeout(&self, default: Duration) -> Duration {
        self.timeout_secs.map(Duration::from_secs).unwrap_or(default)
    }
}
