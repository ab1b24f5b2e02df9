//! Graph-based orchestration of the travel crew.
//!
//! A [`Workflow`] is a static directed graph: nodes are agent stages, edges
//! carry typed preconditions. The executor levels the graph, runs each level
//! concurrently and applies the stages' deltas to a single [`TravelState`].

pub mod builder;
pub mod condition;
pub mod dag;
pub mod executor;
pub mod node;
pub mod parse;
pub mod stages;
pub mod state;
pub mod visualize;

pub use builder::WorkflowBuilder;
pub use condition::{Condition, Slot};
pub use dag::{Dag, ParallelConfig};
pub use executor::{WorkflowError, WorkflowExecutor, WorkflowOutcome};
pub use node::Node;
pub use parse::ParseError;
pub use stages::{Specialist, Stage, StageOutcome};
pub use state::{
    ExecutionStep, QueryBreakdown, StateDelta, StateError, StepStatus, TravelState,
    CONFIDENCE_THRESHOLD,
};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

/// Pseudo-node every terminal edge points at.
pub const DONE: &str = "DONE";

/// A workflow edge, optionally guarded by a condition on the state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    /// Target node ID (or [`DONE`])
    pub to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
}

impl Edge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: None,
        }
    }

    pub fn conditional(
        from: impl Into<String>,
        to: impl Into<String>,
        condition: Condition,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: Some(condition),
        }
    }

    /// Whether the edge lets its target run for `state`.
    pub fn is_open(&self, state: &TravelState) -> bool {
        self.condition
            .as_ref()
            .map(|c| c.evaluate(state))
            .unwrap_or(true)
    }
}

/// A directed graph of stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Nodes keyed by ID
    pub nodes: BTreeMap<String, Node>,
    pub edges: Vec<Edge>,
    pub entrypoint: String,
}

impl Workflow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: String::new(),
            nodes: BTreeMap::new(),
            edges: Vec::new(),
            entrypoint: String::new(),
        }
    }

    /// Check the graph structure. An empty list means the workflow is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if !self.nodes.contains_key(&self.entrypoint) {
            errors.push(ValidationError::MissingEntrypoint {
                entrypoint: self.entrypoint.clone(),
            });
        }

        for edge in &self.edges {
            if !self.nodes.contains_key(&edge.from) {
                errors.push(ValidationError::InvalidEdgeSource {
                    edge: format!("{} -> {}", edge.from, edge.to),
                    node: edge.from.clone(),
                });
            }
            if !self.nodes.contains_key(&edge.to) && edge.to != DONE {
                errors.push(ValidationError::InvalidEdgeTarget {
                    edge: format!("{} -> {}", edge.from, edge.to),
                    node: edge.to.clone(),
                });
            }
        }

        if let Some(cycle) = self.detect_cycle() {
            errors.push(ValidationError::CycleDetected { cycle });
        }

        // Reachability is only meaningful once the entrypoint exists.
        if self.nodes.contains_key(&self.entrypoint) {
            let reachable = self.find_reachable_nodes();
            for node_id in self.nodes.keys() {
                if !reachable.contains(node_id) {
                    errors.push(ValidationError::UnreachableNode {
                        node: node_id.clone(),
                    });
                }
            }
        }

        errors
    }

    fn detect_cycle(&self) -> Option<Vec<String>> {
        let mut visited = HashSet::new();
        let mut on_stack = HashSet::new();
        let mut path = Vec::new();

        for node_id in self.nodes.keys() {
            if self.detect_cycle_dfs(node_id, &mut visited, &mut on_stack, &mut path) {
                return Some(path);
            }
        }

        None
    }

    fn detect_cycle_dfs(
        &self,
        node_id: &str,
        visited: &mut HashSet<String>,
        on_stack: &mut HashSet<String>,
        path: &mut Vec<String>,
    ) -> bool {
        if on_stack.contains(node_id) {
            if let Some(start) = path.iter().position(|n| n == node_id) {
                *path = path[start..].to_vec();
            }
            path.push(node_id.to_string());
            return true;
        }

        if !visited.insert(node_id.to_string()) {
            return false;
        }

        on_stack.insert(node_id.to_string());
        path.push(node_id.to_string());

        for edge in self.outgoing_edges(node_id) {
            if edge.to != DONE && self.detect_cycle_dfs(&edge.to, visited, on_stack, path) {
                return true;
            }
        }

        on_stack.remove(node_id);
        path.pop();
        false
    }

    fn find_reachable_nodes(&self) -> HashSet<String> {
        let mut reachable = HashSet::new();
        let mut queue = vec![self.entrypoint.clone()];

        while let Some(node_id) = queue.pop() {
            if reachable.insert(node_id.clone()) {
                for edge in self.outgoing_edges(&node_id) {
                    if edge.to != DONE && !reachable.contains(&edge.to) {
                        queue.push(edge.to.clone());
                    }
                }
            }
        }

        reachable
    }

    pub fn outgoing_edges<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Edge> {
        self.edges.iter().filter(move |e| e.from == node_id)
    }

    pub fn incoming_edges<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Edge> {
        self.edges.iter().filter(move |e| e.to == node_id)
    }
}

/// Structural problems found by [`Workflow::validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub enum ValidationError {
    #[error("Entrypoint '{entrypoint}' does not exist")]
    MissingEntrypoint { entrypoint: String },

    #[error("Edge '{edge}' references non-existent source node '{node}'")]
    InvalidEdgeSource { edge: String, node: String },

    #[error("Edge '{edge}' references non-existent target node '{node}'")]
    InvalidEdgeTarget { edge: String, node: String },

    #[error("Cycle detected: {}", .cycle.join(" -> "))]
    CycleDetected { cycle: Vec<String> },

    #[error("Node '{node}' is not reachable from entrypoint")]
    UnreachableNode { node: String },
}
