//! Dependency levelling for parallel execution.
//!
//! Nodes whose dependencies all sit in earlier levels form the next level.
//! Every node in a level may run concurrently.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::time::Duration;
use tracing::warn;

use super::{ValidationError, Workflow, DONE};

pub const DEFAULT_MAX_PARALLELISM: usize = 5;
pub const DEFAULT_STAGE_TIMEOUT_SECS: u64 = 300;

/// Scheduler settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ParallelConfig {
    /// Maximum number of stages running at once
    pub max_parallelism: usize,
    /// Timeout for one stage; expiry counts as a failure
    pub stage_timeout: Duration,
    /// Return the first stage failure as an error
    pub strict: bool,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            max_parallelism: DEFAULT_MAX_PARALLELISM,
            stage_timeout: Duration::from_secs(DEFAULT_STAGE_TIMEOUT_SECS),
            strict: false,
        }
    }
}

impl From<&hermes_config::WorkflowConfig> for ParallelConfig {
    fn from(config: &hermes_config::WorkflowConfig) -> Self {
        Self {
            max_parallelism: config.max_parallelism.max(1),
            stage_timeout: Duration::from_secs(config.stage_timeout_secs),
            strict: config.strict,
        }
    }
}

/// A node with its resolved dependencies.
#[derive(Debug, Clone)]
pub struct DagNode {
    pub id: String,
    pub dependencies: BTreeSet<String>,
    pub dependents: BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub struct Dag {
    pub nodes: HashMap<String, DagNode>,
    /// Nodes with no dependencies, sorted
    pub entrypoints: Vec<String>,
}

impl Dag {
    pub fn from_workflow(workflow: &Workflow) -> Result<Self, ValidationError> {
        let mut nodes: HashMap<String, DagNode> = workflow
            .nodes
            .keys()
            .map(|id| {
                (
                    id.clone(),
                    DagNode {
                        id: id.clone(),
                        dependencies: BTreeSet::new(),
                        dependents: BTreeSet::new(),
                    },
                )
            })
            .collect();

        for edge in workflow.edges.iter().filter(|e| e.to != DONE) {
            if let Some(target) = nodes.get_mut(&edge.to) {
                target.dependencies.insert(edge.from.clone());
            }
            if let Some(source) = nodes.get_mut(&edge.from) {
                source.dependents.insert(edge.to.clone());
            }
        }

        validate_dag(&nodes)?;

        let mut entrypoints: Vec<String> = nodes
            .values()
            .filter(|n| n.dependencies.is_empty())
            .map(|n| n.id.clone())
            .collect();
        entrypoints.sort();

        Ok(Self { nodes, entrypoints })
    }

    /// Levels in execution order; node IDs within a level are sorted.
    pub fn execution_levels(&self) -> Vec<Vec<String>> {
        let mut levels: Vec<Vec<String>> = Vec::new();
        let mut completed: BTreeSet<&str> = BTreeSet::new();
        let mut remaining: BTreeSet<&str> = self.nodes.keys().map(String::as_str).collect();

        while !remaining.is_empty() {
            let ready: Vec<&str> = remaining
                .iter()
                .copied()
                .filter(|id| {
                    self.nodes[*id]
                        .dependencies
                        .iter()
                        .all(|dep| completed.contains(dep.as_str()))
                })
                .collect();

            if ready.is_empty() {
                warn!("No ready nodes but remaining: {:?}", remaining);
                break;
            }

            for id in &ready {
                completed.insert(*id);
                remaining.remove(id);
            }

            levels.push(ready.into_iter().map(str::to_string).collect());
        }

        levels
    }

    /// Number of levels.
    pub fn depth(&self) -> usize {
        self.execution_levels().len()
    }
}

/// Reject graphs with cycles (Kahn's algorithm).
fn validate_dag(nodes: &HashMap<String, DagNode>) -> Result<(), ValidationError> {
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    let mut visited = 0;

    for (id, node) in nodes {
        in_degree.insert(id.as_str(), node.dependencies.len());
        if node.dependencies.is_empty() {
            queue.push_back(id.as_str());
        }
    }

    while let Some(id) = queue.pop_front() {
        visited += 1;
        if let Some(node) = nodes.get(id) {
            for dependent in &node.dependents {
                if let Some(deg) = in_degree.get_mut(dependent.as_str()) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(dependent.as_str());
                    }
                }
            }
        }
    }

    if visited != nodes.len() {
        let mut cycle: Vec<String> = in_degree
            .into_iter()
            .filter(|(_, deg)| *deg > 0)
            .map(|(id, _)| id.to_string())
            .collect();
        cycle.sort();
        return Err(ValidationError::CycleDetected { cycle });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{Edge, Node, Stage, WorkflowBuilder};

    #[test]
    fn test_travel_planner_levels() {
        let workflow = WorkflowBuilder::travel_planner().unwrap();
        let dag = Dag::from_workflow(&workflow).unwrap();

        assert_eq!(dag.entrypoints, vec!["analyze_confidence"]);

        let levels = dag.execution_levels();
        assert_eq!(
            levels,
            vec![
                vec!["analyze_confidence".to_string()],
                vec!["breakdown_query".to_string()],
                vec![
                    "assess_safety".to_string(),
                    "curate_experiences".to_string(),
                    "gather_info".to_string(),
                    "manage_finances".to_string(),
                    "plan_logistics".to_string(),
                ],
                vec!["synthesize_plan".to_string()],
            ]
        );
        assert_eq!(dag.depth(), 4);
    }

    #[test]
    fn test_diamond_levels() {
        let workflow = WorkflowBuilder::new("diamond")
            .node("start", Stage::AnalyzeConfidence)
            .node("left", Stage::GatherInfo)
            .node("right", Stage::AssessSafety)
            .node("end", Stage::SynthesizePlan)
            .edge("start", "left")
            .edge("start", "right")
            .edge("left", "end")
            .edge("right", "end")
            .edge("end", DONE)
            .entrypoint("start")
            .build()
            .unwrap();

        let levels = Dag::from_workflow(&workflow).unwrap().execution_levels();
        assert_eq!(levels.len(), 3);
        assert_eq!(levels[1], vec!["left", "right"]);
    }

    #[test]
    fn test_cycle_rejected() {
        // Built by hand: the builder would refuse it.
        let mut workflow = Workflow::new("cycle");
        for id in ["a", "b", "c"] {
            workflow
                .nodes
                .insert(id.to_string(), Node::new(id, Stage::GatherInfo));
        }
        workflow.edges = vec![Edge::new("a", "b"), Edge::new("b", "c"), Edge::new("c", "b")];
        workflow.entrypoint = "a".to_string();

        let err = Dag::from_workflow(&workflow).unwrap_err();
        assert_eq!(
            err,
            ValidationError::CycleDetected {
                cycle: vec!["b".to_string(), "c".to_string()]
            }
        );
    }

    #[test]
    fn test_parallel_config_from_settings() {
        let settings = hermes_config::WorkflowConfig {
            max_parallelism: 2,
            stage_timeout_secs: 30,
            strict: true,
        };
        let config = ParallelConfig::from(&settings);

        assert_eq!(config.max_parallelism, 2);
        assert_eq!(config.stage_timeout, Duration::from_secs(30));
        assert!(config.strict);

        let defaults = ParallelConfig::default();
        assert_eq!(defaults.max_parallelism, 5);
        assert!(!defaults.strict);
    }
}
