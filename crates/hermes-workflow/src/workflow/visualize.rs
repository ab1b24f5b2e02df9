//! Workflow visualization.
//!
//! Mermaid flowcharts for markdown rendering, plus plain-text views for the
//! terminal.

use std::collections::BTreeMap;

use super::state::{StepStatus, TravelState};
use super::{Workflow, DONE};

/// Render the graph as a Mermaid flowchart.
///
/// ```mermaid
/// flowchart TD
///     analyze_confidence["analyze_confidence (confidence)"]
///     analyze_confidence -->|confidence_score &gt;= 0.6| breakdown_query
///     synthesize_plan --> DONE
/// ```
pub fn to_mermaid(workflow: &Workflow) -> String {
    let mut output = String::from("flowchart TD\n");

    for (node_id, node) in &workflow.nodes {
        output.push_str(&format!(
            "    {}[\"{} ({})\"]\n",
            sanitize_id(node_id),
            escape_mermaid_label(node_id),
            node.agent_role()
        ));
    }

    output.push_str(&format!("    {}((\"Done\"))\n", sanitize_id(DONE)));

    for edge in &workflow.edges {
        let from = sanitize_id(&edge.from);
        let to = sanitize_id(&edge.to);
        match &edge.condition {
            Some(condition) => output.push_str(&format!(
                "    {} -->|{}| {}\n",
                from,
                escape_mermaid_label(&condition.description()),
                to
            )),
            None => output.push_str(&format!("    {} --> {}\n", from, to)),
        }
    }

    output.push_str(&format!(
        "    style {} fill:#e1f5fe,stroke:#01579b\n",
        sanitize_id(&workflow.entrypoint)
    ));

    output
}

/// Render the graph with each node coloured by how it ended in `state`.
///
/// Completed nodes are green, failed red, skipped grey.
pub fn to_mermaid_with_state(workflow: &Workflow, state: &TravelState) -> String {
    let mut output = to_mermaid(workflow);

    // Last step per node wins; BTreeMap keeps the style lines stable.
    let statuses: BTreeMap<&str, StepStatus> = state
        .history()
        .iter()
        .map(|step| (step.node_id.as_str(), step.status))
        .collect();

    for (node_id, status) in statuses {
        let style = match status {
            StepStatus::Completed => "fill:#c8e6c9,stroke:#2e7d32",
            StepStatus::Failed => "fill:#ffcdd2,stroke:#c62828",
            StepStatus::Skipped => "fill:#eeeeee,stroke:#9e9e9e,stroke-dasharray:4",
        };
        output.push_str(&format!("    style {} {}\n", sanitize_id(node_id), style));
    }

    output
}

/// Plain-text listing of nodes and edges.
pub fn to_ascii(workflow: &Workflow) -> String {
    let mut output = format!("Workflow: {}\n", workflow.name);
    output.push_str(&"=".repeat(10 + workflow.name.len()));
    output.push_str("\n\n");

    output.push_str("Nodes:\n");
    for (node_id, node) in &workflow.nodes {
        output.push_str(&format!("  - {} ({})\n", node_id, node.agent_role()));
    }
    if workflow.nodes.is_empty() {
        output.push_str("  (no nodes)\n");
    }

    output.push_str("\nEdges:\n");
    for edge in &workflow.edges {
        match &edge.condition {
            Some(condition) => output.push_str(&format!(
                "  {} --[{}]--> {}\n",
                edge.from,
                condition.description(),
                edge.to
            )),
            None => output.push_str(&format!("  {} --> {}\n", edge.from, edge.to)),
        }
    }
    if workflow.edges.is_empty() {
        output.push_str("  (no edges)\n");
    }

    output.push_str(&format!("\nEntrypoint: {}\n", workflow.entrypoint));
    output
}

/// Summary of a run: outcome, score and one line per recorded step.
pub fn state_summary(state: &TravelState) -> String {
    let mut output = format!("Run: {}\n", state.run_id());
    output.push_str(&format!("Query: {}\n", state.query()));

    let status = if state.is_cancelled() {
        "cancelled"
    } else if !state.is_completed() {
        "in progress"
    } else if state.success() && state.final_plan().is_some() {
        "succeeded"
    } else {
        "failed"
    };
    output.push_str(&format!("Status: {}\n", status));
    output.push_str(&format!("Confidence: {:.2}\n", state.confidence_score()));
    if let Some(error) = state.error() {
        output.push_str(&format!("Error: {}\n", error));
    }
    output.push_str(&format!("Steps: {}\n", state.history().len()));

    if !state.history().is_empty() {
        output.push_str("\nHistory:\n");
        for (i, step) in state.history().iter().enumerate() {
            let marker = match step.status {
                StepStatus::Completed => "✓",
                StepStatus::Failed => "✗",
                StepStatus::Skipped => "-",
            };
            output.push_str(&format!(
                "  {}. {} {} - {}\n",
                i + 1,
                marker,
                step.node_id,
                step.summary.chars().take(60).collect::<String>()
            ));
        }
    }

    output
}

fn sanitize_id(id: &str) -> String {
    id.replace(['-', ' ', '.'], "_")
}

fn escape_mermaid_label(label: &str) -> String {
    label
        .replace('"', "&#34;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{ExecutionStep, StateDelta, WorkflowBuilder};
    use chrono::Utc;

    fn step(node_id: &str, status: StepStatus, summary: &str) -> ExecutionStep {
        ExecutionStep {
            node_id: node_id.to_string(),
            status,
            summary: summary.to_string(),
            started_at: Utc::now(),
            completed_at: Some(Utc::now()),
        }
    }

    #[test]
    fn test_to_mermaid_travel_planner() {
        let workflow = WorkflowBuilder::travel_planner().unwrap();
        let mermaid = to_mermaid(&workflow);

        assert!(mermaid.starts_with("flowchart TD\n"));
        assert!(mermaid.contains("analyze_confidence[\"analyze_confidence (confidence)\"]"));
        assert!(mermaid.contains(
            "analyze_confidence -->|confidence_score &gt;= 0.6| breakdown_query"
        ));
        assert!(mermaid.contains("gather_info -->|info_results is set| synthesize_plan"));
        assert!(mermaid.contains("synthesize_plan --> DONE"));
        assert!(mermaid.contains("style analyze_confidence fill:#e1f5fe"));
    }

    #[test]
    fn test_to_mermaid_with_state() {
        let workflow = WorkflowBuilder::travel_planner().unwrap();
        let mut state = TravelState::new("What is the capital of France?");
        state.apply(StateDelta::confidence(0.1)).unwrap();
        state.record_step(step("analyze_confidence", StepStatus::Completed, "ok"));
        state.record_step(step("breakdown_query", StepStatus::Skipped, "low score"));
        state.record_step(step("synthesize_plan", StepStatus::Failed, "boom"));

        let mermaid = to_mermaid_with_state(&workflow, &state);

        assert!(mermaid.contains("style analyze_confidence fill:#c8e6c9"));
        assert!(mermaid.contains("style breakdown_query fill:#eeeeee"));
        assert!(mermaid.contains("style synthesize_plan fill:#ffcdd2"));
        assert!(!mermaid.contains("style gather_info"));
    }

    #[test]
    fn test_to_ascii() {
        let workflow = WorkflowBuilder::travel_planner().unwrap();
        let ascii = to_ascii(&workflow);

        assert!(ascii.contains("Workflow: travel_planner"));
        assert!(ascii.contains("  - manage_finances (finance)"));
        assert!(ascii.contains("breakdown_query --[query_breakdown is set]--> plan_logistics"));
        assert!(ascii.contains("Entrypoint: analyze_confidence"));
    }

    #[test]
    fn test_state_summary() {
        let mut state = TravelState::new("Weekend in Lisbon");
        state.apply(StateDelta::confidence(0.8)).unwrap();
        state.record_step(step("analyze_confidence", StepStatus::Completed, "confidence_score = 0.8"));
        state.complete();

        let summary = state_summary(&state);

        assert!(summary.contains("Query: Weekend in Lisbon"));
        assert!(summary.contains("Status: failed"));
        assert!(summary.contains("Confidence: 0.80"));
        assert!(summary.contains("Steps: 1"));
        assert!(summary.contains("1. ✓ analyze_confidence"));
    }

    #[test]
    fn test_sanitize_and_escape() {
        assert_eq!(sanitize_id("plan-trip.v2 draft"), "plan_trip_v2_draft");
        assert_eq!(escape_mermaid_label("a \"b\" <c>"), "a &#34;b&#34; &lt;c&gt;");
    }
}
