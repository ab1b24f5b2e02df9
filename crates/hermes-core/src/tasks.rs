//! Units of work handed to the model.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::agents::AgentRole;

/// An immutable unit of work: who runs it, what to do, what to return, and
/// which upstream tasks feed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: String,
    pub role: AgentRole,
    pub description: String,
    pub expected_output: String,
    pub inputs: Map<String, Value>,
    /// Ids of upstream tasks whose outputs are part of `inputs`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,
}

impl TaskSpec {
    pub fn input(&self, key: &str) -> Option<&Value> {
        self.inputs.get(key)
    }
}

/// Builds the task for each stage of a planning run.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskFactory;

impl TaskFactory {
    pub const CONFIDENCE: &'static str = "confidence";
    pub const BREAKDOWN: &'static str = "breakdown";
    pub const INFO: &'static str = "info";
    pub const SAFETY: &'static str = "safety";
    pub const EXPERIENCE: &'static str = "experience";
    pub const LOGISTICS: &'static str = "logistics";
    pub const FINANCE: &'static str = "finance";
    pub const SYNTHESIS: &'static str = "synthesis";

    pub fn new() -> Self {
        Self
    }

    fn task(
        id: &str,
        role: AgentRole,
        description: &str,
        expected_output: &str,
        inputs: Value,
        context: &[&str],
    ) -> TaskSpec {
        TaskSpec {
            id: id.to_string(),
            role,
            description: description.to_string(),
            expected_output: expected_output.to_string(),
            inputs: match inputs {
                Value::Object(map) => map,
                _ => Map::new(),
            },
            context: context.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn confidence(&self, query: &str) -> TaskSpec {
        Self::task(
            Self::CONFIDENCE,
            AgentRole::Confidence,
            "Analyze the prompt and return a confidence score and the original prompt.",
            "A JSON object with 'score' and 'prompt'.",
            json!({ "query": query }),
            &[],
        )
    }

    pub fn breakdown(&self, query: &str) -> TaskSpec {
        Self::task(
            Self::BREAKDOWN,
            AgentRole::Orchestrator,
            "Break down the travel query into key components that need to be researched or \
             addressed by specialist agents.",
            "A JSON object with component parts of the travel request: destination, dates, \
             travelers, budget, preferences, locations, expected_expenses and activities.",
            json!({ "query": query }),
            &[],
        )
    }

    pub fn info(&self, query: &str, destination: Value, activities: Value) -> TaskSpec {
        Self::task(
            Self::INFO,
            AgentRole::Info,
            "Research and provide real-time, location-specific information including weather \
             forecasts, local events, and travel advisories.",
            "A JSON object with weather, local news, events, and advisories for the specified \
             location.",
            json!({ "query": query, "destination": destination, "activities": activities }),
            &[Self::BREAKDOWN],
        )
    }

    pub fn safety(&self, locations: Value) -> TaskSpec {
        Self::task(
            Self::SAFETY,
            AgentRole::Safety,
            "Provide safety information including emergency contacts, risk areas, and travel \
             insurance recommendations.",
            "A JSON object with emergency contacts, risk areas, and travel insurance \
             recommendations.",
            json!({ "locations": locations }),
            &[Self::BREAKDOWN],
        )
    }

    pub fn experience(&self, preferences: Value, locations: Value) -> TaskSpec {
        Self::task(
            Self::EXPERIENCE,
            AgentRole::Experience,
            "Recommend personalized experiences based on traveler preferences including \
             restaurants, attractions, and local activities.",
            "A JSON object with personalized recommendations for restaurants, attractions, and \
             activities.",
            json!({ "preferences": preferences, "locations": locations }),
            &[Self::BREAKDOWN],
        )
    }

    pub fn logistics(&self, dates: Value, locations: Value, travelers: Value) -> TaskSpec {
        Self::task(
            Self::LOGISTICS,
            AgentRole::Logistics,
            "Plan travel logistics including flight options, accommodations, and transportation \
             between destinations.",
            "A JSON object with flight options, accommodations, and transportation \
             recommendations.",
            json!({ "dates": dates, "locations": locations, "travelers": travelers }),
            &[Self::BREAKDOWN],
        )
    }

    pub fn finance(&self, budget: f64, expected_expenses: Value) -> TaskSpec {
        Self::task(
            Self::FINANCE,
            AgentRole::Finance,
            "Analyze the travel budget, allocate funds to different categories, and flag any \
             over-budget recommendations.",
            "A JSON object with budget allocation, spending recommendations, and any budget \
             warnings.",
            json!({ "budget": budget, "expected_expenses": expected_expenses }),
            &[Self::BREAKDOWN],
        )
    }

    /// `specialist_outputs` maps `info`, `safety`, `experience`, `logistics`
    /// and `finance` to their parsed results.
    pub fn synthesis(&self, specialist_outputs: Map<String, Value>) -> TaskSpec {
        Self::task(
            Self::SYNTHESIS,
            AgentRole::Orchestrator,
            "Synthesize all specialist findings into a cohesive, personalized travel plan.",
            "A JSON object with the sections 'overview', 'itinerary', 'safety' and 'finance'.",
            json!({ "specialist_outputs": specialist_outputs }),
            &[
                Self::INFO,
                Self::SAFETY,
                Self::EXPERIENCE,
                Self::LOGISTICS,
                Self::FINANCE,
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_task_echoes_query() {
        let task = TaskFactory::new().confidence("A week in Lisbon");
        assert_eq!(task.role, AgentRole::Confidence);
        assert_eq!(task.input("query"), Some(&json!("A week in Lisbon")));
        assert!(task.context.is_empty());
    }

    #[test]
    fn test_specialist_inputs_are_field_subsets() {
        let factory = TaskFactory::new();

        let logistics = factory.logistics(json!("June"), json!(["Paris"]), json!(2));
        let keys: Vec<_> = logistics.inputs.keys().cloned().collect();
        assert_eq!(keys, vec!["dates", "locations", "travelers"]);
        assert_eq!(logistics.context, vec!["breakdown"]);

        let finance = factory.finance(2000.0, json!({"hotel": 800}));
        assert_eq!(finance.input("budget"), Some(&json!(2000.0)));
        assert_eq!(finance.input("expected_expenses"), Some(&json!({"hotel": 800})));
    }

    #[test]
    fn test_synthesis_depends_on_all_specialists() {
        let mut outputs = Map::new();
        outputs.insert("info".into(), json!({"weather": "sunny"}));

        let task = TaskFactory::new().synthesis(outputs);
        assert_eq!(task.role, AgentRole::Orchestrator);
        assert_eq!(task.context.len(), 5);
        assert_eq!(
            task.input("specialist_outputs").unwrap()["info"]["weather"],
            "sunny"
        );
    }
}
