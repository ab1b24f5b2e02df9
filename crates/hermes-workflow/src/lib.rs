//! Hermes workflow engine.
//!
//! A travel request runs through a static graph of agent stages:
//!
//! ```text
//! analyze_confidence ──(score ≥ 0.6)──> breakdown_query
//!        ├──> gather_info ─────────┐
//!        ├──> assess_safety ───────┤
//!        ├──> curate_experiences ──┼──> synthesize_plan ──> DONE
//!        ├──> plan_logistics ──────┤
//!        └──> manage_finances ─────┘
//! ```
//!
//! The `workflow` module holds the graph, the scheduler and the state it
//! threads through a run. The [`assembler`] turns a finished state into the
//! response returned to callers.

pub mod assembler;
pub mod workflow;

pub use assembler::{assemble, plan_trip, TravelPlan, TravelRequest, TravelResponse};
pub use workflow::{
    ParallelConfig, StateDelta, TravelState, Workflow, WorkflowBuilder, WorkflowError,
    WorkflowExecutor, WorkflowOutcome, CONFIDENCE_THRESHOLD,
};
