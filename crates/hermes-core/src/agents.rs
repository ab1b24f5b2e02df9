//! The specialist roster.
//!
//! Every agent is a thin wrapper around one prompt template plus the role
//! metadata that frames it. The set is fixed at compile time.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// One of the seven agents taking part in a planning run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Confidence,
    Orchestrator,
    Info,
    Safety,
    Experience,
    Logistics,
    Finance,
}

impl AgentRole {
    pub const ALL: [AgentRole; 7] = [
        AgentRole::Confidence,
        AgentRole::Orchestrator,
        AgentRole::Info,
        AgentRole::Safety,
        AgentRole::Experience,
        AgentRole::Logistics,
        AgentRole::Finance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Confidence => "confidence",
            AgentRole::Orchestrator => "orchestrator",
            AgentRole::Info => "info",
            AgentRole::Safety => "safety",
            AgentRole::Experience => "experience",
            AgentRole::Logistics => "logistics",
            AgentRole::Finance => "finance",
        }
    }

    /// Key of the role's template in the prompt library.
    pub fn prompt_key(&self) -> &'static str {
        match self {
            AgentRole::Confidence => "confidence_agent",
            AgentRole::Orchestrator => "orchestrator_agent",
            AgentRole::Info => "info_crew",
            AgentRole::Safety => "safety_crew",
            AgentRole::Experience => "experience_crew",
            AgentRole::Logistics => "logistic_crew",
            AgentRole::Finance => "finance_agent",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role metadata used to frame a prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub role: AgentRole,
    pub display_name: String,
    /// Short persona title, e.g. "Gatekeeper"
    pub title: String,
    pub goal: String,
    pub backstory: String,
}

impl AgentProfile {
    fn new(role: AgentRole, display_name: &str, title: &str, goal: &str, backstory: &str) -> Self {
        Self {
            role,
            display_name: display_name.to_string(),
            title: title.to_string(),
            goal: goal.to_string(),
            backstory: backstory.to_string(),
        }
    }

    pub fn prompt_key(&self) -> &'static str {
        self.role.prompt_key()
    }
}

/// Lookup table from role to profile.
#[derive(Debug, Clone)]
pub struct AgentRegistry {
    profiles: HashMap<AgentRole, AgentProfile>,
}

impl AgentRegistry {
    /// The built-in travel crew.
    pub fn builtin() -> Self {
        let profiles = [
            AgentProfile::new(
                AgentRole::Confidence,
                "Confidence Analyzer",
                "Gatekeeper",
                "Determine if queries are travel-related",
                "I analyze incoming queries to determine if they are relevant to travel planning.",
            ),
            AgentProfile::new(
                AgentRole::Orchestrator,
                "Orchestrator",
                "Conductor",
                "Break down travel requests and synthesize specialist findings",
                "I manage the crew and ensure a cohesive travel plan.",
            ),
            AgentProfile::new(
                AgentRole::Info,
                "Information Specialist",
                "Local Expert",
                "Gather real-time, location-specific information",
                "I provide weather forecasts, local news, and travel advisories for destinations.",
            ),
            AgentProfile::new(
                AgentRole::Safety,
                "Safety Guardian",
                "Guardian",
                "Ensure traveler safety",
                "I provide emergency contacts, identify risk areas, and suggest travel insurance.",
            ),
            AgentProfile::new(
                AgentRole::Experience,
                "Experience Curator",
                "Curator",
                "Personalize travel experiences",
                "I recommend restaurants, attractions, and local experiences based on preferences.",
            ),
            AgentProfile::new(
                AgentRole::Logistics,
                "Logistics Planner",
                "Planner",
                "Manage travel and accommodation logistics",
                "I find flight and hotel options and plan efficient routes.",
            ),
            AgentProfile::new(
                AgentRole::Finance,
                "Finance Manager",
                "Accountant",
                "Manage the trip budget",
                "I allocate funds, flag over-budget suggestions, and provide spending reports.",
            ),
        ];

        Self {
            profiles: profiles.into_iter().map(|p| (p.role, p)).collect(),
        }
    }

    pub fn get(&self, role: AgentRole) -> Option<&AgentProfile> {
        self.profiles.get(&role)
    }

    /// Profiles in roster order.
    pub fn profiles(&self) -> impl Iterator<Item = &AgentProfile> {
        AgentRole::ALL.iter().filter_map(|role| self.profiles.get(role))
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_covers_every_role() {
        let registry = AgentRegistry::builtin();
        for role in AgentRole::ALL {
            let profile = registry.get(role).unwrap();
            assert_eq!(profile.role, role);
            assert!(!profile.goal.is_empty());
        }
        assert_eq!(registry.profiles().count(), 7);
    }

    #[test]
    fn test_prompt_keys() {
        assert_eq!(AgentRole::Confidence.prompt_key(), "confidence_agent");
        assert_eq!(AgentRole::Logistics.prompt_key(), "logistic_crew");
        assert_eq!(AgentRole::Finance.prompt_key(), "finance_agent");
    }

    #[test]
    fn test_role_serialization() {
        let json = serde_json::to_string(&AgentRole::Logistics).unwrap();
        assert_eq!(json, "\"logistics\"");
        assert_eq!(AgentRole::Safety.to_string(), "safety");
    }
}
