//! Result assembly - maps a finished run onto the response contract.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::workflow::state::JsonObject;
use crate::workflow::{
    Stage, StepStatus, TravelState, WorkflowError, WorkflowExecutor, CONFIDENCE_THRESHOLD,
};

pub const NOT_TRAVEL_RELATED: &str = "The query does not appear to be travel-related.";
pub const PLAN_FAILED: &str = "Failed to generate a travel plan";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TravelRequest {
    pub query: String,
    #[serde(default)]
    pub llm_provider: Option<String>,
}

impl TravelRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            llm_provider: None,
        }
    }

    pub fn with_provider(mut self, llm_provider: impl Into<String>) -> Self {
        self.llm_provider = Some(llm_provider.into());
        self
    }
}

/// The four user-facing sections of a plan, flattened to text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TravelPlan {
    pub overview: String,
    pub itinerary: String,
    pub safety: String,
    pub finance: String,
}

impl TravelPlan {
    /// Flatten a synthesised plan. `None` if any section is missing.
    pub fn from_plan(plan: &JsonObject) -> Option<Self> {
        Some(Self {
            overview: section_text(plan.get("overview")?)?,
            itinerary: section_text(plan.get("itinerary")?)?,
            safety: section_text(plan.get("safety")?)?,
            finance: section_text(plan.get("finance")?)?,
        })
    }
}

/// Strings are copied verbatim, anything else becomes compact JSON.
fn section_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TravelResponse {
    pub success: bool,
    pub confidence_score: f64,
    pub query: String,
    pub llm_provider: Option<String>,
    pub error: Option<String>,
    pub travel_plan: Option<TravelPlan>,
    /// The synthesised plan exactly as the model produced it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_details: Option<JsonObject>,
}

impl TravelResponse {
    fn failure(state: &TravelState, error: impl Into<String>) -> Self {
        Self {
            success: false,
            confidence_score: state.confidence_score(),
            query: state.query().to_string(),
            llm_provider: state.llm_provider().map(str::to_string),
            error: Some(error.into()),
            travel_plan: None,
            plan_details: None,
        }
    }
}

/// Build the response for a finished (or cancelled) run. Never invents a
/// plan: `travel_plan` is only set when every stage succeeded.
pub fn assemble(state: &TravelState) -> TravelResponse {
    if state.is_cancelled() {
        return TravelResponse::failure(state, "Workflow cancelled");
    }

    let gate_failed = state
        .step(Stage::AnalyzeConfidence.node_id())
        .is_some_and(|step| step.status == StepStatus::Failed);
    if gate_failed {
        let error = state.error().unwrap_or(PLAN_FAILED);
        return TravelResponse::failure(state, error);
    }

    if state.confidence_score() < CONFIDENCE_THRESHOLD {
        debug!(
            "Query scored {} and was rejected as not travel-related",
            state.confidence_score()
        );
        return TravelResponse::failure(state, NOT_TRAVEL_RELATED);
    }

    let plan = state
        .final_plan()
        .filter(|_| state.success())
        .and_then(|plan| TravelPlan::from_plan(plan).map(|flat| (plan, flat)));

    match plan {
        Some((details, travel_plan)) => TravelResponse {
            success: true,
            confidence_score: state.confidence_score(),
            query: state.query().to_string(),
            llm_provider: state.llm_provider().map(str::to_string),
            error: None,
            travel_plan: Some(travel_plan),
            plan_details: Some(details.clone()),
        },
        None => {
            let error = match state.error() {
                Some(detail) => format!("{}: {}", PLAN_FAILED, detail),
                None => PLAN_FAILED.to_string(),
            };
            TravelResponse::failure(state, error)
        }
    }
}

/// Run a request through `executor` and assemble the response.
pub async fn plan_trip(
    executor: &WorkflowExecutor,
    request: &TravelRequest,
    cancel: &CancellationToken,
) -> Result<TravelResponse, WorkflowError> {
    let outcome = executor
        .run_with_cancel(request.query.clone(), request.llm_provider.clone(), cancel)
        .await?;
    Ok(assemble(outcome.state()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::parse::parse_plan;
    use crate::workflow::{ExecutionStep, Specialist, StateDelta};
    use chrono::Utc;
    use serde_json::json;

    fn object(value: Value) -> JsonObject {
        value.as_object().cloned().unwrap()
    }

    fn scored(score: f64) -> TravelState {
        let mut state = TravelState::new("5 days in Paris").with_provider(Some("openai".into()));
        state.apply(StateDelta::confidence(score)).unwrap();
        state
    }

    fn with_results() -> TravelState {
        let mut state = scored(0.95);
        state
            .apply(StateDelta::breakdown(object(json!({"destination": "Paris"}))))
            .unwrap();
        for specialist in Specialist::ALL {
            state
                .apply(StateDelta::result(specialist, object(json!({"ok": true}))))
                .unwrap();
        }
        state
    }

    #[test]
    fn test_successful_plan() {
        let mut state = with_results();
        let plan = object(json!({
            "overview": "Five days of museums and food",
            "itinerary": [{"day": 1, "plan": "Louvre"}],
            "safety": "Watch for pickpockets on Line 1",
            "finance": {"total": 2400, "currency": "EUR"}
        }));
        state.apply(StateDelta::final_plan(plan.clone())).unwrap();

        let response = assemble(&state);

        assert!(response.success);
        assert_eq!(response.confidence_score, 0.95);
        assert_eq!(response.query, "5 days in Paris");
        assert_eq!(response.llm_provider.as_deref(), Some("openai"));
        assert_eq!(response.error, None);

        let travel_plan = response.travel_plan.unwrap();
        assert_eq!(travel_plan.overview, "Five days of museums and food");
        assert_eq!(travel_plan.itinerary, r#"[{"day":1,"plan":"Louvre"}]"#);
        assert_eq!(travel_plan.finance, r#"{"total":2400,"currency":"EUR"}"#);
        assert_eq!(response.plan_details, Some(plan));
    }

    #[test]
    fn test_not_travel_related() {
        let response = assemble(&scored(0.1));

        assert!(!response.success);
        assert_eq!(response.confidence_score, 0.1);
        assert_eq!(response.error.as_deref(), Some(NOT_TRAVEL_RELATED));
        assert!(response.travel_plan.is_none());
        assert!(response.plan_details.is_none());
    }

    #[test]
    fn test_gate_failure_reports_parse_error() {
        let mut state = TravelState::new("Paris?");
        state
            .apply(Stage::AnalyzeConfidence.failure_delta(
                "Failed to parse confidence score: no valid JSON found: x",
            ))
            .unwrap();
        state.record_step(ExecutionStep {
            node_id: "analyze_confidence".into(),
            status: StepStatus::Failed,
            summary: "failed".into(),
            started_at: Utc::now(),
            completed_at: Some(Utc::now()),
        });

        let response = assemble(&state);

        assert!(!response.success);
        assert_eq!(response.confidence_score, 0.0);
        assert_eq!(
            response.error.as_deref(),
            Some("Failed to parse confidence score: no valid JSON found: x")
        );
    }

    #[test]
    fn test_downstream_failure_carries_detail() {
        let mut state = scored(0.9);
        state
            .apply(StateDelta::failure("Failed to parse query breakdown: empty response"))
            .unwrap();

        let response = assemble(&state);
        assert_eq!(
            response.error.as_deref(),
            Some("Failed to generate a travel plan: Failed to parse query breakdown: empty response")
        );
        assert_eq!(response.confidence_score, 0.9);
    }

    #[test]
    fn test_missing_plan_without_error() {
        let response = assemble(&with_results());
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some(PLAN_FAILED));
    }

    #[test]
    fn test_plan_ignored_after_failure() {
        let mut state = with_results();
        state
            .apply(
                StateDelta::final_plan(object(
                    json!({"overview": "o", "itinerary": "i", "safety": "s", "finance": "f"}),
                ))
                .with_error("late failure"),
            )
            .unwrap();

        let response = assemble(&state);
        assert!(!response.success);
        assert!(response.travel_plan.is_none());
    }

    #[test]
    fn test_cancelled_run() {
        let mut state = scored(0.8);
        state.mark_cancelled();

        let response = assemble(&state);
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("Workflow cancelled"));
        assert_eq!(response.confidence_score, 0.8);
    }

    #[test]
    fn test_plan_survives_parse_and_assembly() {
        let text = r#"{"overview":"Rome","itinerary":{"day_1":["Colosseum","Forum"]},"safety":"ok","finance":{"budget":1800.5},"extras":[1,2]}"#;
        let mut state = with_results();
        state
            .apply(StateDelta::final_plan(parse_plan(text).unwrap()))
            .unwrap();

        let response = assemble(&state);
        let details = serde_json::to_string(&response.plan_details.unwrap()).unwrap();
        assert_eq!(details, text);
    }

    #[test]
    fn test_response_serialization() {
        let response = assemble(&scored(0.2));
        let value = serde_json::to_value(&response).unwrap();

        assert_eq!(value["success"], json!(false));
        assert_eq!(value["travel_plan"], Value::Null);
        assert_eq!(value["llm_provider"], json!("openai"));
        assert!(value.get("plan_details").is_none());

        let request: TravelRequest = serde_json::from_str(r#"{"query": "Oslo"}"#).unwrap();
        assert_eq!(request, TravelRequest::new("Oslo"));
    }
}
