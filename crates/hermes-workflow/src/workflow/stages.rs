//! The eight stages of a planning run.
//!
//! A stage reads an immutable snapshot of the state, invokes the model at
//! most once and returns a [`StageOutcome`]. It never writes to the state.

use hermes_core::{AgentRole, ModelInvoker, TaskFactory, TaskSpec};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use tracing::{debug, warn};

use super::parse::{self, ParseError};
use super::state::{JsonObject, StateDelta, TravelState, CONFIDENCE_THRESHOLD};

/// The five parallel specialists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Specialist {
    Info,
    Safety,
    Experience,
    Logistics,
    Finance,
}

impl Specialist {
    pub const ALL: [Specialist; 5] = [
        Specialist::Info,
        Specialist::Safety,
        Specialist::Experience,
        Specialist::Logistics,
        Specialist::Finance,
    ];

    /// State field holding this specialist's result.
    pub fn field_name(&self) -> &'static str {
        match self {
            Specialist::Info => "info_results",
            Specialist::Safety => "safety_results",
            Specialist::Experience => "experience_results",
            Specialist::Logistics => "logistic_results",
            Specialist::Finance => "finance_results",
        }
    }

    /// Key under which the result is handed to synthesis.
    pub fn output_key(&self) -> &'static str {
        match self {
            Specialist::Info => "info",
            Specialist::Safety => "safety",
            Specialist::Experience => "experience",
            Specialist::Logistics => "logistics",
            Specialist::Finance => "finance",
        }
    }

    fn error_label(&self) -> &'static str {
        match self {
            Specialist::Info => "info results",
            Specialist::Safety => "safety results",
            Specialist::Experience => "experience results",
            Specialist::Logistics => "logistic results",
            Specialist::Finance => "finance results",
        }
    }

    pub fn role(&self) -> AgentRole {
        match self {
            Specialist::Info => AgentRole::Info,
            Specialist::Safety => AgentRole::Safety,
            Specialist::Experience => AgentRole::Experience,
            Specialist::Logistics => AgentRole::Logistics,
            Specialist::Finance => AgentRole::Finance,
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            Specialist::Info => Stage::GatherInfo,
            Specialist::Safety => Stage::AssessSafety,
            Specialist::Experience => Stage::CurateExperiences,
            Specialist::Logistics => Stage::PlanLogistics,
            Specialist::Finance => Stage::ManageFinances,
        }
    }
}

impl fmt::Display for Specialist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.output_key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    AnalyzeConfidence,
    BreakdownQuery,
    GatherInfo,
    AssessSafety,
    CurateExperiences,
    PlanLogistics,
    ManageFinances,
    SynthesizePlan,
}

impl Stage {
    pub const ALL: [Stage; 8] = [
        Stage::AnalyzeConfidence,
        Stage::BreakdownQuery,
        Stage::GatherInfo,
        Stage::AssessSafety,
        Stage::CurateExperiences,
        Stage::PlanLogistics,
        Stage::ManageFinances,
        Stage::SynthesizePlan,
    ];

    /// Node ID used for this stage in the travel graph.
    pub fn node_id(&self) -> &'static str {
        match self {
            Stage::AnalyzeConfidence => "analyze_confidence",
            Stage::BreakdownQuery => "breakdown_query",
            Stage::GatherInfo => "gather_info",
            Stage::AssessSafety => "assess_safety",
            Stage::CurateExperiences => "curate_experiences",
            Stage::PlanLogistics => "plan_logistics",
            Stage::ManageFinances => "manage_finances",
            Stage::SynthesizePlan => "synthesize_plan",
        }
    }

    pub fn role(&self) -> AgentRole {
        match self {
            Stage::AnalyzeConfidence => AgentRole::Confidence,
            Stage::BreakdownQuery | Stage::SynthesizePlan => AgentRole::Orchestrator,
            other => other
                .specialist()
                .map(|s| s.role())
                .unwrap_or(AgentRole::Orchestrator),
        }
    }

    pub fn specialist(&self) -> Option<Specialist> {
        match self {
            Stage::GatherInfo => Some(Specialist::Info),
            Stage::AssessSafety => Some(Specialist::Safety),
            Stage::CurateExperiences => Some(Specialist::Experience),
            Stage::PlanLogistics => Some(Specialist::Logistics),
            Stage::ManageFinances => Some(Specialist::Finance),
            _ => None,
        }
    }

    /// Prefix for this stage's parse failures.
    fn error_label(&self) -> &'static str {
        match self {
            Stage::AnalyzeConfidence => "confidence score",
            Stage::BreakdownQuery => "query breakdown",
            Stage::SynthesizePlan => "final plan",
            other => other
                .specialist()
                .map(|s| s.error_label())
                .unwrap_or("stage output"),
        }
    }

    pub fn parse_failure_message(&self, err: &ParseError) -> String {
        format!("Failed to parse {}: {}", self.error_label(), err)
    }

    /// The delta recorded when this stage fails for any reason. A failed
    /// gate pins the score to zero.
    pub fn failure_delta(&self, message: impl Into<String>) -> StateDelta {
        let delta = StateDelta::failure(message);
        match self {
            Stage::AnalyzeConfidence => StateDelta {
                confidence_score: Some(0.0),
                ..delta
            },
            _ => delta,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.node_id())
    }
}

/// Result of running one stage.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    Completed(StateDelta),
    /// The delta carries the error (and, for the gate, a zero score)
    Failed(StateDelta),
    /// Preconditions not met; nothing was attempted
    Skipped(String),
}

impl StageOutcome {
    pub fn summary(&self) -> String {
        match self {
            StageOutcome::Completed(delta) | StageOutcome::Failed(delta) => delta.summary(),
            StageOutcome::Skipped(reason) => reason.clone(),
        }
    }
}

/// Run `stage` against a snapshot of the state.
pub async fn execute(
    stage: Stage,
    state: &TravelState,
    tasks: &TaskFactory,
    invoker: &dyn ModelInvoker,
) -> StageOutcome {
    let task = match build_task(stage, state, tasks) {
        Ok(task) => task,
        Err(reason) => {
            debug!("Skipping {}: {}", stage, reason);
            return StageOutcome::Skipped(reason);
        }
    };

    let text = match invoker.invoke(&task).await {
        Ok(text) => text,
        Err(e) => {
            let message = format!("Model call for {} failed: {:#}", stage, e);
            warn!("{}", message);
            return StageOutcome::Failed(stage.failure_delta(message));
        }
    };

    match interpret(stage, &text) {
        Ok(delta) => StageOutcome::Completed(delta),
        Err(e) => {
            let message = stage.parse_failure_message(&e);
            warn!("{}", message);
            StageOutcome::Failed(stage.failure_delta(message))
        }
    }
}

/// Build the task for `stage`, or explain why its inputs are not available.
fn build_task(stage: Stage, state: &TravelState, tasks: &TaskFactory) -> Result<TaskSpec, String> {
    match stage {
        Stage::AnalyzeConfidence => Ok(tasks.confidence(state.query())),
        Stage::BreakdownQuery => {
            if state.confidence_score() < CONFIDENCE_THRESHOLD {
                return Err(format!(
                    "confidence score {} is below {}",
                    state.confidence_score(),
                    CONFIDENCE_THRESHOLD
                ));
            }
            Ok(tasks.breakdown(state.query()))
        }
        Stage::SynthesizePlan => {
            let missing = state.missing_results();
            if !missing.is_empty() {
                let names: Vec<_> = missing.iter().map(|s| s.field_name()).collect();
                return Err(format!("missing {}", names.join(", ")));
            }
            let mut outputs = Map::new();
            for specialist in Specialist::ALL {
                if let Some(result) = state.result(specialist) {
                    outputs.insert(
                        specialist.output_key().to_string(),
                        Value::Object(result.clone()),
                    );
                }
            }
            Ok(tasks.synthesis(outputs))
        }
        specialist_stage => {
            let breakdown = state
                .query_breakdown()
                .ok_or_else(|| "no query breakdown".to_string())?;
            let task = match specialist_stage.specialist() {
                Some(Specialist::Info) => tasks.info(
                    state.query(),
                    breakdown.destination(),
                    breakdown.activities(),
                ),
                Some(Specialist::Safety) => tasks.safety(breakdown.locations()),
                Some(Specialist::Experience) => tasks.experience(
                    Value::Object(state.preferences().clone()),
                    breakdown.locations(),
                ),
                Some(Specialist::Logistics) => tasks.logistics(
                    breakdown.dates(),
                    breakdown.locations(),
                    breakdown.travelers(),
                ),
                Some(Specialist::Finance) => {
                    tasks.finance(state.budget(), breakdown.expected_expenses())
                }
                None => return Err(format!("{} has no task", specialist_stage)),
            };
            Ok(task)
        }
    }
}

/// Turn the model's text into this stage's delta.
fn interpret(stage: Stage, text: &str) -> Result<StateDelta, ParseError> {
    match stage {
        Stage::AnalyzeConfidence => parse::parse_confidence(text).map(StateDelta::confidence),
        Stage::BreakdownQuery => parse::parse_object(text).map(StateDelta::breakdown),
        Stage::SynthesizePlan => parse::parse_plan(text).map(StateDelta::final_plan),
        other => {
            let result: JsonObject = parse::parse_object(text)?;
            match other.specialist() {
                Some(specialist) => Ok(StateDelta::result(specialist, result)),
                None => Ok(StateDelta::default()),
            }
        }
    }
}
