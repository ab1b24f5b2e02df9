//! The record threaded through a planning run.
//!
//! Stages never mutate the state. They return a [`StateDelta`] and the
//! executor applies it through [`TravelState::apply`], which rejects any
//! delta that would break the ordering invariants:
//!
//! - a breakdown requires a recorded confidence score of at least
//!   [`CONFIDENCE_THRESHOLD`]
//! - a specialist result requires a breakdown
//! - the final plan requires all five specialist results
//! - `success` only ever goes from true to false

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::stages::Specialist;

/// Minimum confidence score for a query to be treated as travel-related.
pub const CONFIDENCE_THRESHOLD: f64 = 0.6;

pub type JsonObject = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Completed,
    Failed,
    Skipped,
}

/// One node's entry in the run history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStep {
    pub node_id: String,
    pub status: StepStatus,
    pub summary: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ExecutionStep {
    pub fn duration_ms(&self) -> Option<i64> {
        self.completed_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}

/// Rejected state transitions.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StateError {
    #[error("{0} is already set")]
    AlreadySet(&'static str),

    #[error("confidence score {0} is outside [0, 1]")]
    ScoreOutOfRange(f64),

    #[error("query breakdown requires confidence_score >= {} (got {})", CONFIDENCE_THRESHOLD, .0)]
    BreakdownWithoutConfidence(f64),

    #[error("{0} results require a query breakdown")]
    ResultWithoutBreakdown(Specialist),

    #[error("final plan requires all specialist results (missing: {})", .0.join(", "))]
    PlanWithoutResults(Vec<&'static str>),
}

/// What a stage contributes to the state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateDelta {
    pub confidence_score: Option<f64>,
    pub breakdown: Option<JsonObject>,
    pub result: Option<(Specialist, JsonObject)>,
    pub final_plan: Option<JsonObject>,
    /// Marks the run as failed with this message
    pub error: Option<String>,
}

impl StateDelta {
    pub fn confidence(score: f64) -> Self {
        Self {
            confidence_score: Some(score),
            ..Default::default()
        }
    }

    pub fn breakdown(breakdown: JsonObject) -> Self {
        Self {
            breakdown: Some(breakdown),
            ..Default::default()
        }
    }

    pub fn result(specialist: Specialist, result: JsonObject) -> Self {
        Self {
            result: Some((specialist, result)),
            ..Default::default()
        }
    }

    pub fn final_plan(plan: JsonObject) -> Self {
        Self {
            final_plan: Some(plan),
            ..Default::default()
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }

    /// One-line description for the run history.
    pub fn summary(&self) -> String {
        if let Some(error) = &self.error {
            return error.clone();
        }
        let mut parts = Vec::new();
        if let Some(score) = self.confidence_score {
            parts.push(format!("confidence_score = {}", score));
        }
        if let Some(breakdown) = &self.breakdown {
            parts.push(format!("query_breakdown with {} fields", breakdown.len()));
        }
        if let Some((specialist, result)) = &self.result {
            parts.push(format!(
                "{} with {} fields",
                specialist.field_name(),
                result.len()
            ));
        }
        if let Some(plan) = &self.final_plan {
            parts.push(format!("final_plan with {} sections", plan.len()));
        }
        if parts.is_empty() {
            "no changes".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Read-only view over the orchestrator's breakdown of a query.
#[derive(Debug, Clone, Copy)]
pub struct QueryBreakdown<'a>(&'a JsonObject);

impl<'a> QueryBreakdown<'a> {
    pub fn new(fields: &'a JsonObject) -> Self {
        Self(fields)
    }

    fn field_or(&self, key: &str, default: Value) -> Value {
        match self.0.get(key) {
            Some(Value::Null) | None => default,
            Some(value) => value.clone(),
        }
    }

    pub fn as_map(&self) -> &'a JsonObject {
        self.0
    }

    pub fn destination(&self) -> Value {
        self.field_or("destination", Value::String(String::new()))
    }

    pub fn dates(&self) -> Value {
        self.field_or("dates", Value::Object(Map::new()))
    }

    pub fn travelers(&self) -> Value {
        self.field_or("travelers", Value::Object(Map::new()))
    }

    pub fn locations(&self) -> Value {
        self.field_or("locations", Value::Object(Map::new()))
    }

    pub fn expected_expenses(&self) -> Value {
        self.field_or("expected_expenses", Value::Object(Map::new()))
    }

    pub fn activities(&self) -> Value {
        self.field_or("activities", Value::Array(Vec::new()))
    }

    /// Budget as a number. Numeric strings such as `"$2,000"` are accepted;
    /// anything else reads as zero.
    pub fn budget(&self) -> f64 {
        match self.0.get("budget") {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(Value::String(s)) => parse_amount(s).unwrap_or(0.0),
            _ => 0.0,
        }
    }

    pub fn preferences(&self) -> JsonObject {
        match self.0.get("preferences") {
            Some(Value::Object(prefs)) => prefs.clone(),
            _ => Map::new(),
        }
    }
}

fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// State of one planning run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TravelState {
    run_id: String,
    query: String,
    #[serde(default)]
    llm_provider: Option<String>,
    #[serde(default)]
    confidence_score: Option<f64>,
    #[serde(default)]
    query_breakdown: Option<JsonObject>,
    #[serde(default)]
    info_results: Option<JsonObject>,
    #[serde(default)]
    safety_results: Option<JsonObject>,
    #[serde(default)]
    experience_results: Option<JsonObject>,
    #[serde(default)]
    logistic_results: Option<JsonObject>,
    #[serde(default)]
    finance_results: Option<JsonObject>,
    #[serde(default)]
    final_plan: Option<JsonObject>,
    success: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    budget: f64,
    #[serde(default)]
    preferences: JsonObject,
    #[serde(default)]
    cancelled: bool,
    #[serde(default)]
    history: Vec<ExecutionStep>,
    started_at: DateTime<Utc>,
    #[serde(default)]
    completed_at: Option<DateTime<Utc>>,
}

impl TravelState {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            query: query.into(),
            llm_provider: None,
            confidence_score: None,
            query_breakdown: None,
            info_results: None,
            safety_results: None,
            experience_results: None,
            logistic_results: None,
            finance_results: None,
            final_plan: None,
            success: true,
            error: None,
            budget: 0.0,
            preferences: Map::new(),
            cancelled: false,
            history: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Carry the caller's provider hint through to the response.
    pub fn with_provider(mut self, llm_provider: Option<String>) -> Self {
        self.llm_provider = llm_provider;
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn llm_provider(&self) -> Option<&str> {
        self.llm_provider.as_deref()
    }

    /// The score the gate used, or 0 if the gate never recorded one.
    pub fn confidence_score(&self) -> f64 {
        self.confidence_score.unwrap_or(0.0)
    }

    pub fn recorded_confidence(&self) -> Option<f64> {
        self.confidence_score
    }

    /// `None` until a breakdown with at least one field has been recorded.
    pub fn query_breakdown(&self) -> Option<QueryBreakdown<'_>> {
        self.query_breakdown
            .as_ref()
            .filter(|breakdown| !breakdown.is_empty())
            .map(QueryBreakdown::new)
    }

    /// An empty object counts as no result.
    pub fn result(&self, specialist: Specialist) -> Option<&JsonObject> {
        self.result_slot(specialist)
            .as_ref()
            .filter(|result| !result.is_empty())
    }

    fn result_slot(&self, specialist: Specialist) -> &Option<JsonObject> {
        match specialist {
            Specialist::Info => &self.info_results,
            Specialist::Safety => &self.safety_results,
            Specialist::Experience => &self.experience_results,
            Specialist::Logistics => &self.logistic_results,
            Specialist::Finance => &self.finance_results,
        }
    }

    fn result_slot_mut(&mut self, specialist: Specialist) -> &mut Option<JsonObject> {
        match specialist {
            Specialist::Info => &mut self.info_results,
            Specialist::Safety => &mut self.safety_results,
            Specialist::Experience => &mut self.experience_results,
            Specialist::Logistics => &mut self.logistic_results,
            Specialist::Finance => &mut self.finance_results,
        }
    }

    /// Specialists whose result slot is still empty.
    pub fn missing_results(&self) -> Vec<Specialist> {
        Specialist::ALL
            .into_iter()
            .filter(|s| self.result(*s).is_none())
            .collect()
    }

    pub fn final_plan(&self) -> Option<&JsonObject> {
        self.final_plan.as_ref()
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn budget(&self) -> f64 {
        self.budget
    }

    pub fn preferences(&self) -> &JsonObject {
        &self.preferences
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn history(&self) -> &[ExecutionStep] {
        &self.history
    }

    pub fn step(&self, node_id: &str) -> Option<&ExecutionStep> {
        self.history.iter().find(|s| s.node_id == node_id)
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    pub fn duration_ms(&self) -> i64 {
        let end = self.completed_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds()
    }

    /// Apply a stage's delta. Either the whole delta lands or nothing does.
    pub fn apply(&mut self, delta: StateDelta) -> Result<(), StateError> {
        self.check(&delta)?;

        if let Some(score) = delta.confidence_score {
            self.confidence_score = Some(score);
        }

        if let Some(breakdown) = delta.breakdown {
            let view = QueryBreakdown::new(&breakdown);
            self.budget = view.budget();
            self.preferences = view.preferences();
            self.query_breakdown = Some(breakdown);
        }

        if let Some((specialist, result)) = delta.result {
            *self.result_slot_mut(specialist) = Some(result);
        }

        if let Some(plan) = delta.final_plan {
            self.final_plan = Some(plan);
        }

        if let Some(error) = delta.error {
            self.record_failure(error);
        }

        Ok(())
    }

    fn check(&self, delta: &StateDelta) -> Result<(), StateError> {
        if let Some(score) = delta.confidence_score {
            if self.confidence_score.is_some() {
                return Err(StateError::AlreadySet("confidence_score"));
            }
            if !score.is_finite() || !(0.0..=1.0).contains(&score) {
                return Err(StateError::ScoreOutOfRange(score));
            }
        }

        if delta.breakdown.is_some() {
            if self.query_breakdown.is_some() {
                return Err(StateError::AlreadySet("query_breakdown"));
            }
            let score = delta.confidence_score.or(self.confidence_score);
            match score {
                Some(score) if score >= CONFIDENCE_THRESHOLD => {}
                other => {
                    return Err(StateError::BreakdownWithoutConfidence(other.unwrap_or(0.0)))
                }
            }
        }

        if let Some((specialist, _)) = &delta.result {
            if self.result_slot(*specialist).is_some() {
                return Err(StateError::AlreadySet(specialist.field_name()));
            }
            let incoming = delta.breakdown.as_ref().is_some_and(|b| !b.is_empty());
            if self.query_breakdown().is_none() && !incoming {
                return Err(StateError::ResultWithoutBreakdown(*specialist));
            }
        }

        if delta.final_plan.is_some() {
            if self.final_plan.is_some() {
                return Err(StateError::AlreadySet("final_plan"));
            }
            let missing: Vec<&'static str> = self
                .missing_results()
                .into_iter()
                .filter(|s| !matches!(&delta.result, Some((r, result)) if r == s && !result.is_empty()))
                .map(|s| s.field_name())
                .collect();
            if !missing.is_empty() {
                return Err(StateError::PlanWithoutResults(missing));
            }
        }

        Ok(())
    }

    /// Mark the run as failed. `success` never returns to true.
    pub(crate) fn record_failure(&mut self, message: impl Into<String>) {
        self.success = false;
        self.error = Some(message.into());
    }

    pub(crate) fn record_step(&mut self, step: ExecutionStep) {
        self.history.push(step);
    }

    pub(crate) fn mark_cancelled(&mut self) {
        self.cancelled = true;
        self.record_failure("Workflow cancelled");
    }

    pub(crate) fn complete(&mut self) {
        self.completed_at = Some(Utc::now());
    }
}
