//! Edge preconditions.
//!
//! A node runs only when every edge pointing at it is open. Conditions are
//! typed against [`TravelState`] rather than looked up by string key.

use serde::{Deserialize, Serialize};

use super::stages::Specialist;
use super::state::TravelState;

/// A state field that a stage populates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    Breakdown,
    Result(Specialist),
}

impl Slot {
    pub fn field_name(&self) -> &'static str {
        match self {
            Slot::Breakdown => "query_breakdown",
            Slot::Result(specialist) => specialist.field_name(),
        }
    }

    /// Empty objects do not count.
    pub fn is_populated(&self, state: &TravelState) -> bool {
        match self {
            Slot::Breakdown => state.query_breakdown().is_some(),
            Slot::Result(specialist) => state.result(*specialist).is_some(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// The recorded confidence score is at least the given value
    ScoreAtLeast(f64),
    Populated(Slot),
}

impl Condition {
    pub fn score_at_least(threshold: f64) -> Self {
        Condition::ScoreAtLeast(threshold)
    }

    pub fn populated(slot: Slot) -> Self {
        Condition::Populated(slot)
    }

    pub fn evaluate(&self, state: &TravelState) -> bool {
        match self {
            Condition::ScoreAtLeast(threshold) => state
                .recorded_confidence()
                .map(|score| score >= *threshold)
                .unwrap_or(false),
            Condition::Populated(slot) => slot.is_populated(state),
        }
    }

    pub fn description(&self) -> String {
        match self {
            Condition::ScoreAtLeast(threshold) => format!("confidence_score >= {}", threshold),
            Condition::Populated(slot) => format!("{} is set", slot.field_name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::state::{JsonObject, StateDelta};
    use serde_json::json;

    fn scored(score: f64) -> TravelState {
        let mut state = TravelState::new("Paris in May");
        state
            .apply(StateDelta::confidence(score))
            .unwrap();
        state
    }

    #[test]
    fn test_score_threshold() {
        let cond = Condition::score_at_least(0.6);

        assert!(!cond.evaluate(&TravelState::new("unscored")));
        assert!(!cond.evaluate(&scored(0.59)));
        assert!(cond.evaluate(&scored(0.6)));
        assert!(cond.evaluate(&scored(0.95)));
    }

    #[test]
    fn test_populated_slots() {
        let mut state = scored(0.9);
        let breakdown = Condition::populated(Slot::Breakdown);
        let info = Condition::populated(Slot::Result(Specialist::Info));

        assert!(!breakdown.evaluate(&state));

        state
            .apply(StateDelta::breakdown(
                json!({"destination": "Paris"}).as_object().cloned().unwrap(),
            ))
            .unwrap();
        assert!(breakdown.evaluate(&state));
        assert!(!info.evaluate(&state));
    }

    #[test]
    fn test_empty_breakdown_keeps_edge_closed() {
        let mut state = scored(0.9);
        state
            .apply(StateDelta::breakdown(JsonObject::new()))
            .unwrap();

        let breakdown = Condition::populated(Slot::Breakdown);
        assert!(!breakdown.evaluate(&state));
        assert!(!Slot::Breakdown.is_populated(&state));
    }

    #[test]
    fn test_descriptions() {
        assert_eq!(
            Condition::score_at_least(0.6).description(),
            "confidence_score >= 0.6"
        );
        assert_eq!(
            Condition::populated(Slot::Result(Specialist::Logistics)).description(),
            "logistic_results is set"
        );
        assert_eq!(
            Condition::populated(Slot::Breakdown).description(),
            "query_breakdown is set"
        );
    }
}
