/// Core workflow type definitions
///
/// Defines workflows, nodes and edges. These types are serialized to JSON for
/// persistence and compiled by the registry for webhook routing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// A complete workflow definition containing nodes and their connections
///
/// Workflows own their nodes and edges. Executions reference a workflow by id
/// and read it from storage at run time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// Unique workflow identifier (e.g., "wf-orders")
    pub id: String,
    /// Human-readable workflow name
    pub name: String,
    /// Lifecycle status; only active workflows bind webhooks or run
    #[serde(default)]
    pub status: WorkflowStatus,
    /// Nodes in declaration order
    #[serde(default)]
    pub nodes: Vec<Node>,
    /// Edges in declaration order; the walk follows them in this order
    #[serde(default)]
    pub edges: Vec<Edge>,
    /// Workflow-wide settings (failure escalation, seed variables)
    #[serde(default)]
    pub settings: WorkflowSettings,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Workflow {
    /// Look up a node by its workflow-unique id
    pub fn node(&self, node_id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == node_id)
    }

    pub fn is_active(&self) -> bool {
        self.status == WorkflowStatus::Active
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    #[default]
    Draft,
    Active,
    Inactive,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Draft => "draft",
            WorkflowStatus::Active => "active",
            WorkflowStatus::Inactive => "inactive",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(WorkflowStatus::Draft),
            "active" => Ok(WorkflowStatus::Active),
            "inactive" => Ok(WorkflowStatus::Inactive),
            other => Err(anyhow::anyhow!("Unknown workflow status: {}", other)),
        }
    }
}

/// A single node in the workflow graph
///
/// The node type is a registry key; settings are opaque to the engine and
/// interpreted by the node implementation. Nodes are immutable during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique node identifier within the workflow (e.g., "start", "notify-slack")
    #[serde(alias = "node_id")]
    pub id: String,
    /// Registry key selecting the node implementation (e.g., "http_request")
    #[serde(rename = "type")]
    pub node_type: String,
    /// Node-specific configuration as flexible JSON
    #[serde(default)]
    pub settings: Value,
    /// Canvas position, kept only for the builder
    #[serde(default)]
    pub position: Option<Position>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Connection between two nodes in the workflow graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    /// Source node ID
    #[serde(alias = "source")]
    pub from: String,
    /// Target node ID
    #[serde(alias = "target")]
    pub to: String,
    /// Optional guard evaluated against the source node's output
    #[serde(default)]
    pub condition: Option<EdgeCondition>,
}

/// Edge guard: follow the edge when the value at `path` equals `equals`,
/// or, without `equals`, when the value is truthy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeCondition {
    pub path: String,
    #[serde(default)]
    pub equals: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowSettings {
    /// What to do once an execution of this workflow ultimately fails
    #[serde(default)]
    pub on_failure: Option<FailureEscalation>,
    /// Variables seeded into every execution context
    #[serde(default)]
    pub variables: Map<String, Value>,
}

/// Workflow-level escalation applied after an execution is finalized as failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum FailureEscalation {
    /// Schedule a fresh execution of the same trigger after a delay
    RetryWorkflow {
        #[serde(default = "default_workflow_retry_delay_ms")]
        delay_ms: u64,
        #[serde(default = "default_workflow_retry_attempts")]
        max_attempts: u32,
    },
    /// Tell an operator about the failure
    Notify { email: String },
    /// Run a designated fallback workflow with the failure as its payload
    Fallback { workflow_id: String },
}

fn default_workflow_retry_delay_ms() -> u64 {
    60_000
}

fn default_workflow_retry_attempts() -> u32 {
    3
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_workflow_with_aliases_and_defaults() {
        let workflow: Workflow = serde_json::from_value(json!({
            "id": "wf-1",
            "name": "Orders",
            "nodes": [
                { "node_id": "start", "type": "manual_trigger" },
                { "id": "a", "type": "noop", "settings": { "x": 1 } }
            ],
            "edges": [ { "source": "start", "target": "a" } ],
            "settings": {
                "on_failure": { "action": "fallback", "workflow_id": "wf-fallback" }
            }
        }))
        .unwrap();

        assert_eq!(workflow.status, WorkflowStatus::Draft);
        assert_eq!(workflow.nodes[0].id, "start");
        assert_eq!(workflow.edges[0].from, "start");
        assert_eq!(workflow.edges[0].to, "a");
        assert_eq!(
            workflow.settings.on_failure,
            Some(FailureEscalation::Fallback { workflow_id: "wf-fallback".into() })
        );
    }

    #[test]
    fn retry_escalation_fills_defaults() {
        let escalation: FailureEscalation =
            serde_json::from_value(json!({ "action": "retry_workflow" })).unwrap();
        assert_eq!(
            escalation,
            FailureEscalation::RetryWorkflow { delay_ms: 60_000, max_attempts: 3 }
        );
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [WorkflowStatus::Draft, WorkflowStatus::Active, WorkflowStatus::Inactive] {
            assert_eq!(status.as_str().parse::<WorkflowStatus>().unwrap(), status);
        }
        assert!("paused".parse::<WorkflowStatus>().is_err());
    }
}
