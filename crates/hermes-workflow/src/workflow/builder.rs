//! Fluent construction of workflows.

use super::{
    Condition, Edge, Node, Slot, Specialist, Stage, Workflow, WorkflowError, CONFIDENCE_THRESHOLD,
    DONE,
};

pub struct WorkflowBuilder {
    name: String,
    description: String,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    entrypoint: Option<String>,
}

impl WorkflowBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            nodes: Vec::new(),
            edges: Vec::new(),
            entrypoint: None,
        }
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// Add a node running `stage`
    pub fn node(mut self, id: impl Into<String>, stage: Stage) -> Self {
        self.nodes.push(Node::new(id, stage));
        self
    }

    pub fn edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edges.push(Edge::new(from, to));
        self
    }

    /// Add an edge that only lets its target run when `condition` holds
    pub fn edge_if(
        mut self,
        from: impl Into<String>,
        to: impl Into<String>,
        condition: Condition,
    ) -> Self {
        self.edges.push(Edge::conditional(from, to, condition));
        self
    }

    pub fn entrypoint(mut self, node_id: impl Into<String>) -> Self {
        self.entrypoint = Some(node_id.into());
        self
    }

    /// Build and validate the workflow
    pub fn build(self) -> Result<Workflow, WorkflowError> {
        let mut workflow = Workflow::new(&self.name);
        workflow.description = self.description;
        workflow.entrypoint = self.entrypoint.unwrap_or_default();
        workflow.edges = self.edges;
        for node in self.nodes {
            workflow.nodes.insert(node.id.clone(), node);
        }

        let errors = workflow.validate();
        if !errors.is_empty() {
            return Err(WorkflowError::Invalid(errors));
        }

        Ok(workflow)
    }
}

impl WorkflowBuilder {
    /// The travel planner: confidence gate, breakdown, five parallel
    /// specialists and a synthesis join.
    pub fn travel_planner() -> Result<Workflow, WorkflowError> {
        let gate = Stage::AnalyzeConfidence.node_id();
        let breakdown = Stage::BreakdownQuery.node_id();
        let synthesis = Stage::SynthesizePlan.node_id();

        let mut builder = Self::new("travel_planner")
            .description("Confidence-gated multi-agent travel planning")
            .node(gate, Stage::AnalyzeConfidence)
            .node(breakdown, Stage::BreakdownQuery)
            .node(synthesis, Stage::SynthesizePlan)
            .edge_if(
                gate,
                breakdown,
                Condition::score_at_least(CONFIDENCE_THRESHOLD),
            )
            .edge(synthesis, DONE)
            .entrypoint(gate);

        for specialist in Specialist::ALL {
            let stage = specialist.stage();
            builder = builder
                .node(stage.node_id(), stage)
                .edge_if(
                    breakdown,
                    stage.node_id(),
                    Condition::populated(Slot::Breakdown),
                )
                .edge_if(
                    stage.node_id(),
                    synthesis,
                    Condition::populated(Slot::Result(specialist)),
                );
        }

        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::ValidationError;

    #[test]
    fn test_simple_workflow() {
        let workflow = WorkflowBuilder::new("test")
            .node("start", Stage::AnalyzeConfidence)
            .node("end", Stage::BreakdownQuery)
            .edge("start", "end")
            .edge("end", DONE)
            .entrypoint("start")
            .build()
            .unwrap();

        assert_eq!(workflow.nodes.len(), 2);
        assert_eq!(workflow.edges.len(), 2);
        assert_eq!(workflow.entrypoint, "start");
    }

    #[test]
    fn test_missing_entrypoint() {
        let result = WorkflowBuilder::new("test")
            .node("a", Stage::GatherInfo)
            .build();

        match result {
            Err(WorkflowError::Invalid(errors)) => {
                assert!(matches!(errors[0], ValidationError::MissingEntrypoint { .. }))
            }
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_edge() {
        let result = WorkflowBuilder::new("test")
            .node("a", Stage::GatherInfo)
            .edge("a", "nonexistent")
            .entrypoint("a")
            .build();

        assert!(result.is_err());
    }

    #[test]
    fn test_travel_planner_shape() {
        let workflow = WorkflowBuilder::travel_planner().unwrap();

        assert_eq!(workflow.nodes.len(), 8);
        assert_eq!(workflow.entrypoint, "analyze_confidence");
        // gate + 5 fan-out + 5 fan-in + terminal
        assert_eq!(workflow.edges.len(), 12);

        let into_synthesis: Vec<_> = workflow.incoming_edges("synthesize_plan").collect();
        assert_eq!(into_synthesis.len(), 5);
        assert!(into_synthesis.iter().all(|e| e.condition.is_some()));

        let gate_edge = workflow.outgoing_edges("analyze_confidence").next().unwrap();
        assert_eq!(
            gate_edge.condition,
            Some(Condition::ScoreAtLeast(CONFIDENCE_THRESHOLD))
        );
    }
}
