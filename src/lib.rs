/// hookflow: webhook-triggered workflow automation engine
///
/// Workflows are graphs of typed nodes. Webhooks (plain or HMAC-signed) start
/// executions that walk the graph depth-first, with per-node retries and
/// workflow-level failure escalation.

// Core configuration and setup
pub mod config;

// SQLite pool and schema
pub mod database;

// Workflow management layer - definitions, storage, and hot-reload registry
pub mod workflow;

// Execution records and the per-run context
pub mod execution;

// Named credential bundles referenced by node settings
pub mod integration;

// Node contract and built-in node types
pub mod nodes;

// Runtime execution engine - graph walk, error handling, escalation
pub mod runtime;

// HTTP API layer - webhook gateway and workflow management
pub mod api;

// Server setup and initialization
pub mod server;

// Re-export commonly used types for external consumers
pub use execution::{Execution, ExecutionStatus, TriggerType};
pub use nodes::{NodeHandler, NodeRegistry};
pub use runtime::WorkflowExecutor;
pub use server::start_server;
pub use workflow::{Edge, Node, Workflow, WorkflowRegistry};
