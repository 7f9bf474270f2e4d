/// Workflow Management Layer
///
/// Workflow definitions, their SQLite persistence, the document path helper
/// nodes and edge conditions use, and the hot-reload registry the gateway and
/// executor read from.

// Core workflow type definitions
pub mod types;

// Typed dot-path access into JSON documents
pub mod path;

// SQLite persistence layer for workflow storage
pub mod storage;

// Hot-reload registry using ArcSwap for zero-downtime updates
pub mod registry;

// Re-export commonly used types
pub use path::{is_truthy, DocPath, PathError};
pub use registry::{CompiledWorkflow, WebhookBinding, WorkflowRegistry};
pub use storage::WorkflowStorage;
pub use types::{Edge, EdgeCondition, FailureEscalation, Node, Workflow, WorkflowSettings, WorkflowStatus};
