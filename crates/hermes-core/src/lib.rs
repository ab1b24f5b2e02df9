//! Core building blocks shared by the Hermes workflow engine.
//!
//! - [`agents`]: the fixed roster of specialist roles
//! - [`prompts`]: prompt templates keyed by agent, with file overrides
//! - [`tasks`]: immutable units of work handed to the model
//! - [`invoker`]: the narrow boundary through which a task reaches a model

pub mod agents;
pub mod invoker;
pub mod prompts;
pub mod tasks;

pub use agents::{AgentProfile, AgentRegistry, AgentRole};
pub use invoker::{normalize_response, ModelInvoker, ProviderInvoker};
pub use prompts::{PromptError, PromptLibrary};
pub use tasks::{TaskFactory, TaskSpec};
