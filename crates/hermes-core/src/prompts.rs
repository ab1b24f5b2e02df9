//! Prompt templates keyed by agent.
//!
//! The built-in templates are compiled in. A JSON library of the form
//! `{"<key>": {"prompt": "..."}}` can replace any subset of them. Templates
//! may reference task inputs with `{name}` placeholders.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

const CONFIDENCE_PROMPT: &str = "Decide whether the user's request is about planning travel. \
Return a JSON object {\"score\": <number between 0 and 1>, \"prompt\": <the original request>}. \
Request: {query}";

const ORCHESTRATOR_PROMPT: &str = "You coordinate a crew of travel specialists. When asked to \
break a request down, return a JSON object with destination, dates, travelers, budget, \
preferences, locations, expected_expenses and activities. When asked to synthesize, return a \
JSON object with the sections overview, itinerary, safety and finance.";

const INFO_PROMPT: &str = "Research the destination {destination}. Cover weather, local news, \
events and travel advisories relevant to: {activities}. Answer with a JSON object.";

const SAFETY_PROMPT: &str = "Assess traveler safety for {locations}. Include emergency contacts, \
risk areas and travel insurance advice. Answer with a JSON object.";

const EXPERIENCE_PROMPT: &str = "Recommend restaurants, attractions and local experiences in \
{locations} for a traveler with these preferences: {preferences}. Answer with a JSON object.";

const LOGISTICS_PROMPT: &str = "Plan flights, accommodation and local transport for {travelers} \
travelling to {locations} on {dates}. Answer with a JSON object.";

const FINANCE_PROMPT: &str = "Allocate a budget of {budget} across the trip, given the expected \
expenses {expected_expenses}. Flag anything over budget. Answer with a JSON object.";

/// Errors raised while loading a prompt library.
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("Failed to read prompt library {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse prompt library {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
struct PromptEntry {
    prompt: String,
}

#[derive(Debug, Clone)]
pub struct PromptLibrary {
    prompts: HashMap<String, String>,
}

impl PromptLibrary {
    pub fn builtin() -> Self {
        let prompts = [
            ("confidence_agent", CONFIDENCE_PROMPT),
            ("orchestrator_agent", ORCHESTRATOR_PROMPT),
            ("info_crew", INFO_PROMPT),
            ("safety_crew", SAFETY_PROMPT),
            ("experience_crew", EXPERIENCE_PROMPT),
            ("logistic_crew", LOGISTICS_PROMPT),
            ("finance_agent", FINANCE_PROMPT),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self { prompts }
    }

    /// Built-in templates overridden by the entries of a JSON library file.
    pub fn with_overrides_from(path: &Path) -> Result<Self, PromptError> {
        let content = std::fs::read_to_string(path).map_err(|source| PromptError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut library = Self::builtin();
        library
            .merge_json(&content)
            .map_err(|source| PromptError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(library)
    }

    /// Merge a JSON library into this one. Returns the number of replaced or added keys.
    pub fn merge_json(&mut self, content: &str) -> Result<usize, serde_json::Error> {
        let entries: HashMap<String, PromptEntry> = serde_json::from_str(content)?;
        let count = entries.len();
        for (key, entry) in entries {
            debug!("Prompt override for '{}'", key);
            self.prompts.insert(key, entry.prompt);
        }
        Ok(count)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.prompts.get(key).map(String::as_str)
    }

    /// Look up `key` and fill its placeholders from `inputs`.
    pub fn render(&self, key: &str, inputs: &Map<String, Value>) -> Option<String> {
        self.get(key).map(|template| render_template(template, inputs))
    }
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Replace `{name}` placeholders with values from `inputs`.
///
/// String values are inserted as-is, anything else as compact JSON.
/// Placeholders without a matching input and braces that do not enclose an
/// identifier (such as literal JSON in the template) are left untouched.
pub fn render_template(template: &str, inputs: &Map<String, Value>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let name_len = after
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(after.len());
        let name = &after[..name_len];
        let closes = after[name_len..].starts_with('}');

        match inputs.get(name) {
            Some(value) if closes && !name.is_empty() => {
                match value {
                    Value::String(s) => out.push_str(s),
                    other => out.push_str(&other.to_string()),
                }
                rest = &after[name_len + 1..];
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}
