/// Node execution contract and built-in node types
///
/// Every node type implements [`NodeHandler`]. The executor never knows what a
/// node does; it looks the handler up in the [`NodeRegistry`] by type key,
/// hands it the run context and the previous node's output, and routes any
/// [`NodeError`] through the error handler.

// Typed node errors and settings validation errors
pub mod error;

// Startup-time type key → handler table
pub mod registry;

// Entry points: manual, webhook and signed webhook triggers
pub mod triggers;

// Data shaping: set, extract, noop
pub mod transform;

// Outbound HTTP calls
pub mod http;

use crate::execution::ExecutionContext;
use crate::workflow::types::Node;
use async_trait::async_trait;
use serde_json::{json, Map, Value};

pub use error::{ErrorCategory, FieldError, NodeError, SettingsError};
pub use registry::NodeRegistry;

/// Read-only view a node gets for one call
#[derive(Debug, Clone, Copy)]
pub struct NodeContext<'a> {
    /// The node being executed, including its settings
    pub node: &'a Node,
    /// Run-scoped context: trigger payload, variables, earlier outputs
    pub execution: &'a ExecutionContext,
    /// Decrypted integration settings when the node references `integration_id`
    pub integration: Option<&'a Map<String, Value>>,
}

impl<'a> NodeContext<'a> {
    pub fn settings(&self) -> &'a Value {
        &self.node.settings
    }

    /// Document a node can resolve references against:
    /// `{ trigger, variables, nodes, input }`
    pub fn reference_root(&self, input: &Value) -> Value {
        json!({
            "trigger": self.execution.trigger,
            "variables": self.execution.variables,
            "nodes": self.execution.node_outputs,
            "input": input,
        })
    }
}

/// Contract every node type satisfies
///
/// `execute` must behave as a function of its inputs and settings. Side
/// effects are allowed, but failures are reported as a typed [`NodeError`],
/// never as a falsy output.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    /// Registry key, e.g. `"http_request"`
    fn node_type(&self) -> &'static str;

    /// Start-typed nodes can be the entry of a run
    fn is_trigger(&self) -> bool {
        false
    }

    /// JSON schema of the settings, consumed by the builder only
    fn settings_schema(&self) -> Value {
        json!({ "type": "object" })
    }

    fn validate_settings(&self, _settings: &Value) -> Result<(), SettingsError> {
        Ok(())
    }

    async fn execute(&self, ctx: &NodeContext<'_>, previous_output: Value) -> Result<Value, NodeError>;
}

/// Fetch a required non-empty string setting, recording a field error if absent
pub(crate) fn require_str<'a>(settings: &'a Value, field: &str, errors: &mut SettingsError) -> Option<&'a str> {
    match settings.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.as_str()),
        Some(Value::String(_)) | None => {
            errors.push(field, "is required");
            None
        }
        Some(_) => {
            errors.push(field, "must be a string");
            None
        }
    }
}
