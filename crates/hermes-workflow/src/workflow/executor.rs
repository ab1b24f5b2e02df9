//! Workflow executor - runs the graph level by level.
//!
//! Each level's stages run concurrently against the same snapshot of the
//! state, bounded by a semaphore and a per-stage timeout. Once the whole
//! level has joined, the deltas are applied in node-ID order, so the
//! resulting state does not depend on which stage finished first.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use hermes_core::{ModelInvoker, TaskFactory};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::dag::{Dag, ParallelConfig};
use super::stages::{self, StageOutcome};
use super::state::{ExecutionStep, StepStatus, TravelState};
use super::{Node, ValidationError, Workflow, WorkflowBuilder};

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error(
        "Workflow validation failed: {}",
        .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ")
    )]
    Invalid(Vec<ValidationError>),

    /// Only returned in strict mode
    #[error("Stage '{stage}' failed: {message}")]
    StageFailed { stage: String, message: String },
}

/// How a run ended. Stage failures are recorded in the state either way.
#[derive(Debug, Clone)]
pub enum WorkflowOutcome {
    Completed(TravelState),
    /// Cancelled before the last level finished; the in-flight level was discarded
    Cancelled(TravelState),
}

impl WorkflowOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, WorkflowOutcome::Cancelled(_))
    }

    pub fn state(&self) -> &TravelState {
        match self {
            WorkflowOutcome::Completed(state) | WorkflowOutcome::Cancelled(state) => state,
        }
    }

    pub fn into_state(self) -> TravelState {
        match self {
            WorkflowOutcome::Completed(state) | WorkflowOutcome::Cancelled(state) => state,
        }
    }
}

/// One stage's result before it is applied.
struct StageRun {
    node_id: String,
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
    outcome: StageOutcome,
}

pub struct WorkflowExecutor {
    workflow: Workflow,
    levels: Vec<Vec<String>>,
    invoker: Arc<dyn ModelInvoker>,
    tasks: TaskFactory,
    config: ParallelConfig,
    /// Shared by every run of this executor
    semaphore: Arc<Semaphore>,
}

impl WorkflowExecutor {
    pub fn new(
        workflow: Workflow,
        invoker: Arc<dyn ModelInvoker>,
        config: ParallelConfig,
    ) -> Result<Self, WorkflowError> {
        let errors = workflow.validate();
        if !errors.is_empty() {
            return Err(WorkflowError::Invalid(errors));
        }
        let dag = Dag::from_workflow(&workflow).map_err(|e| WorkflowError::Invalid(vec![e]))?;
        let levels = dag.execution_levels();
        let semaphore = Arc::new(Semaphore::new(config.max_parallelism.max(1)));

        Ok(Self {
            workflow,
            levels,
            invoker,
            tasks: TaskFactory::new(),
            config,
            semaphore,
        })
    }

    /// Executor for the standard travel planner graph.
    pub fn travel_planner(
        invoker: Arc<dyn ModelInvoker>,
        config: ParallelConfig,
    ) -> Result<Self, WorkflowError> {
        Self::new(WorkflowBuilder::travel_planner()?, invoker, config)
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    pub fn config(&self) -> &ParallelConfig {
        &self.config
    }

    /// Levels in the order they run.
    pub fn execution_plan(&self) -> &[Vec<String>] {
        &self.levels
    }

    pub async fn run(
        &self,
        query: impl Into<String>,
        llm_provider: Option<String>,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        self.run_with_cancel(query, llm_provider, &CancellationToken::new())
            .await
    }

    pub async fn run_with_cancel(
        &self,
        query: impl Into<String>,
        llm_provider: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        let mut state = TravelState::new(query).with_provider(llm_provider);
        let started = Instant::now();

        info!(
            "Starting workflow '{}' (run {}) with {} levels, max parallelism {}",
            self.workflow.name,
            state.run_id(),
            self.levels.len(),
            self.config.max_parallelism
        );

        for (level_idx, level) in self.levels.iter().enumerate() {
            if cancel.is_cancelled() {
                return Ok(self.cancelled(state, level_idx));
            }

            debug!("Level {}: {:?}", level_idx, level);
            let snapshot = state.clone();
            let runs = join_all(level.iter().map(|id| self.run_node(id, &snapshot)));

            let results = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(self.cancelled(state, level_idx)),
                results = runs => results,
            };

            let first_failure = self.apply_level(&mut state, results);

            if self.config.strict {
                if let Some((stage, message)) = first_failure {
                    warn!("Strict mode: stopping after failure in '{}'", stage);
                    return Err(WorkflowError::StageFailed { stage, message });
                }
            }
        }

        state.complete();
        info!(
            "Workflow '{}' finished in {}ms (success: {})",
            self.workflow.name,
            started.elapsed().as_millis(),
            state.success()
        );
        Ok(WorkflowOutcome::Completed(state))
    }

    fn cancelled(&self, mut state: TravelState, level_idx: usize) -> WorkflowOutcome {
        warn!(
            "Workflow '{}' cancelled at level {}",
            self.workflow.name, level_idx
        );
        state.mark_cancelled();
        state.complete();
        WorkflowOutcome::Cancelled(state)
    }

    /// Apply a joined level in node-ID order. Returns the first failure.
    fn apply_level(
        &self,
        state: &mut TravelState,
        results: Vec<StageRun>,
    ) -> Option<(String, String)> {
        let mut first_failure = None;

        for run in results {
            let (status, summary) = match run.outcome {
                StageOutcome::Completed(delta) => {
                    let summary = delta.summary();
                    match state.apply(delta) {
                        Ok(()) => (StepStatus::Completed, summary),
                        Err(e) => {
                            let message = format!("Rejected output of {}: {}", run.node_id, e);
                            warn!("{}", message);
                            state.record_failure(message.clone());
                            (StepStatus::Failed, message)
                        }
                    }
                }
                StageOutcome::Failed(delta) => {
                    let summary = delta.summary();
                    if let Err(e) = state.apply(delta) {
                        state.record_failure(format!("{} ({})", summary, e));
                    }
                    (StepStatus::Failed, summary)
                }
                StageOutcome::Skipped(reason) => (StepStatus::Skipped, reason),
            };

            if status == StepStatus::Failed && first_failure.is_none() {
                first_failure = Some((run.node_id.clone(), summary.clone()));
            }

            state.record_step(ExecutionStep {
                node_id: run.node_id,
                status,
                summary,
                started_at: run.started_at,
                completed_at: Some(run.completed_at),
            });
        }

        first_failure
    }

    /// The first incoming edge that blocks `node_id`, if any.
    fn blocked_by(&self, node_id: &str, state: &TravelState) -> Option<String> {
        self.workflow
            .incoming_edges(node_id)
            .find(|edge| !edge.is_open(state))
            .map(|edge| match &edge.condition {
                Some(condition) => format!(
                    "Skipped: {} -> {} requires {}",
                    edge.from,
                    edge.to,
                    condition.description()
                ),
                None => format!("Skipped: {} -> {} is closed", edge.from, edge.to),
            })
    }

    async fn run_node(&self, node_id: &str, snapshot: &TravelState) -> StageRun {
        let started_at = Utc::now();
        let finish = |outcome| StageRun {
            node_id: node_id.to_string(),
            started_at,
            completed_at: Utc::now(),
            outcome,
        };

        let Some(node) = self.workflow.nodes.get(node_id) else {
            return finish(StageOutcome::Skipped(format!("Unknown node '{}'", node_id)));
        };

        if let Some(reason) = self.blocked_by(node_id, snapshot) {
            debug!("{}", reason);
            return finish(StageOutcome::Skipped(reason));
        }

        finish(self.execute_node(node, snapshot).await)
    }

    async fn execute_node(&self, node: &Node, snapshot: &TravelState) -> StageOutcome {
        let _permit = match self.semaphore.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                return StageOutcome::Failed(node.stage.failure_delta(format!(
                    "Stage '{}' could not be scheduled",
                    node.id
                )))
            }
        };

        let timeout = node.timeout(self.config.stage_timeout);
        let start = Instant::now();
        info!("Running stage '{}' ({})", node.id, node.agent_role());

        let outcome = tokio::time::timeout(
            timeout,
            stages::execute(node.stage, snapshot, &self.tasks, self.invoker.as_ref()),
        )
        .await
        .unwrap_or_else(|_| {
            let message = format!("Stage '{}' timed out after {:?}", node.id, timeout);
            warn!("{}", message);
            StageOutcome::Failed(node.stage.failure_delta(message))
        });

        info!(
            "Stage '{}' finished in {}ms: {}",
            node.id,
            start.elapsed().as_millis(),
            outcome.summary()
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::Stage;
    use anyhow::Result;
    use hermes_core::TaskSpec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers every task with a valid reply for its role.
    struct HappyInvoker {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ModelInvoker for HappyInvoker {
        async fn invoke(&self, task: &TaskSpec) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(match task.id.as_str() {
                "confidence" => r#"{"score": 0.9}"#.to_string(),
                "breakdown" => r#"{"destination": "Oslo", "budget": 1500}"#.to_string(),
                "synthesis" => {
                    r#"{"overview": "o", "itinerary": "i", "safety": "s", "finance": "f"}"#
                        .to_string()
                }
                other => format!(r#"{{"{}": "ok"}}"#, other),
            })
        }
    }

    #[tokio::test]
    async fn test_full_run_records_every_node() {
        let invoker = Arc::new(HappyInvoker {
            calls: AtomicUsize::new(0),
        });
        let executor =
            WorkflowExecutor::travel_planner(invoker.clone(), ParallelConfig::default()).unwrap();

        let outcome = executor.run("Oslo in winter", None).await.unwrap();
        let state = outcome.state();

        assert!(!outcome.is_cancelled());
        assert!(state.success());
        assert!(state.is_completed());
        assert_eq!(state.history().len(), 8);
        assert!(state
            .history()
            .iter()
            .all(|s| s.status == StepStatus::Completed));
        assert_eq!(invoker.calls.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn test_custom_workflow_without_join() {
        // Gate straight to DONE: nothing else runs.
        let workflow = WorkflowBuilder::new("gate-only")
            .node("gate", Stage::AnalyzeConfidence)
            .edge("gate", crate::workflow::DONE)
            .entrypoint("gate")
            .build()
            .unwrap();
        let invoker = Arc::new(HappyInvoker {
            calls: AtomicUsize::new(0),
        });
        let executor =
            WorkflowExecutor::new(workflow, invoker.clone(), ParallelConfig::default()).unwrap();

        let state = executor.run("x", None).await.unwrap().into_state();
        assert_eq!(state.confidence_score(), 0.9);
        assert!(state.final_plan().is_none());
        assert_eq!(invoker.calls.load(Ordering::SeqCst), 1);
        assert_eq!(executor.execution_plan().len(), 1);
    }

    #[test]
    fn test_invalid_workflow_rejected() {
        let mut workflow = Workflow::new("broken");
        workflow.entrypoint = "missing".into();
        let invoker = Arc::new(HappyInvoker {
            calls: AtomicUsize::new(0),
        });

        let err = WorkflowExecutor::new(workflow, invoker, ParallelConfig::default())
            .err()
            .unwrap();
        assert!(err.to_string().contains("Entrypoint 'missing' does not exist"));
    }
}
