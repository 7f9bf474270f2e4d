/// Execution records and the run-scoped execution context

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Execution lifecycle: `pending → running → {completed | failed}`.
/// Terminal states never change; a retry is always a new execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ExecutionStatus::Pending),
            "running" => Ok(ExecutionStatus::Running),
            "completed" => Ok(ExecutionStatus::Completed),
            "failed" => Ok(ExecutionStatus::Failed),
            other => Err(anyhow::anyhow!("Unknown execution status: {}", other)),
        }
    }
}

/// What created an execution; decides how the entry node is resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    /// Entry node is the payload's `node_id`
    Webhook,
    /// Entry node is the first start-typed node
    Manual,
    /// Spawned after another workflow failed; entry like `Manual`, never escalates
    Fallback,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::Webhook => "webhook",
            TriggerType::Manual => "manual",
            TriggerType::Fallback => "fallback",
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "webhook" => Ok(TriggerType::Webhook),
            "manual" => Ok(TriggerType::Manual),
            "fallback" => Ok(TriggerType::Fallback),
            other => Err(anyhow::anyhow!("Unknown trigger type: {}", other)),
        }
    }
}

/// One run of a workflow from a specific trigger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: String,
    pub workflow_id: String,
    pub status: ExecutionStatus,
    pub trigger_type: TriggerType,
    pub trigger_data: Value,
    /// Context snapshot written when the execution is finalized
    pub execution_data: Option<Value>,
    /// Execution this one re-runs, when created by a workflow-level retry
    pub retry_of: Option<String>,
    /// 0 for the original run, incremented by each workflow-level retry
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

/// Fields for a new pending execution
#[derive(Debug, Clone)]
pub struct NewExecution {
    pub workflow_id: String,
    pub trigger_type: TriggerType,
    pub trigger_data: Value,
    pub retry_of: Option<String>,
    pub attempt: u32,
}

impl NewExecution {
    pub fn new(workflow_id: impl Into<String>, trigger_type: TriggerType, trigger_data: Value) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            trigger_type,
            trigger_data,
            retry_of: None,
            attempt: 0,
        }
    }
}

/// Run-scoped accumulator passed to every node
///
/// `node_outputs` is append-only within a run and doubles as the cycle guard:
/// a node id already present is never executed again in the same run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Decoded trigger payload
    pub trigger: Value,
    pub workflow_id: String,
    pub execution_id: String,
    /// Workflow variables, seeded from workflow settings and the trigger's `variables`
    pub variables: Map<String, Value>,
    /// Output of every executed node keyed by node id
    pub node_outputs: HashMap<String, Value>,
    /// Node ids in the order they executed
    pub execution_order: Vec<String>,
    /// Output of the most recently executed node
    pub last_output: Value,
}

impl ExecutionContext {
    /// Create a context for a run from its trigger payload
    pub fn from_trigger(
        workflow_id: impl Into<String>,
        execution_id: impl Into<String>,
        trigger: Value,
        seed_variables: &Map<String, Value>,
    ) -> Self {
        let mut variables = seed_variables.clone();
        if let Some(Value::Object(extra)) = trigger.get("variables") {
            for (k, v) in extra {
                variables.insert(k.clone(), v.clone());
            }
        }

        Self {
            trigger,
            workflow_id: workflow_id.into(),
            execution_id: execution_id.into(),
            variables,
            node_outputs: HashMap::new(),
            execution_order: Vec::new(),
            last_output: Value::Null,
        }
    }

    pub fn has_output(&self, node_id: &str) -> bool {
        self.node_outputs.contains_key(node_id)
    }

    /// Record a node's output; first write wins
    pub fn record_output(&mut self, node_id: &str, output: Value) {
        if self.node_outputs.contains_key(node_id) {
            return;
        }
        self.node_outputs.insert(node_id.to_string(), output.clone());
        self.execution_order.push(node_id.to_string());
        self.last_output = output;
    }

    /// JSON snapshot persisted into `execution_data`
    pub fn snapshot(&self) -> Value {
        json!({
            "trigger": self.trigger,
            "variables": self.variables,
            "node_outputs": self.node_outputs,
            "execution_order": self.execution_order,
            "last_output": self.last_output,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_merges_trigger_variables_over_seed() {
        let mut seed = Map::new();
        seed.insert("region".into(), json!("eu"));
        seed.insert("tier".into(), json!("free"));
        let ctx = ExecutionContext::from_trigger(
            "wf",
            "ex",
            json!({ "variables": { "tier": "pro" } }),
            &seed,
        );
        assert_eq!(ctx.variables["region"], json!("eu"));
        assert_eq!(ctx.variables["tier"], json!("pro"));
    }

    #[test]
    fn record_output_is_append_only() {
        let mut ctx = ExecutionContext::from_trigger("wf", "ex", Value::Null, &Map::new());
        ctx.record_output("a", json!(1));
        ctx.record_output("a", json!(2));
        ctx.record_output("b", json!(3));
        assert_eq!(ctx.node_outputs["a"], json!(1));
        assert_eq!(ctx.execution_order, vec!["a", "b"]);
        assert_eq!(ctx.last_output, json!(3));
        assert_eq!(ctx.snapshot()["execution_order"], json!(["a", "b"]));
    }
}
