/// Runtime Execution Engine
///
/// The executor that walks a workflow graph for one execution, the error
/// handler wrapping every node call, and the scheduler and notifier that
/// workflow-level escalation goes through.

// Graph walk, finalization and escalation
pub mod engine;

// Per-node retry, classification and fallback values
pub mod error_handler;

// Delay formulas for retries
pub mod backoff;

// Delayed runs and retention cleanup on tokio-cron-scheduler
pub mod scheduler;

// Operator notification on failed executions
pub mod notify;

// Re-export main types
pub use backoff::{BackoffPolicy, BackoffType};
pub use engine::{EngineError, WebhookRunResult, WorkflowExecutor};
pub use error_handler::{ErrorHandler, ErrorHandlingConfig, HandlerError, NodeOutcome, OnError};
pub use notify::{FailureNotice, HttpNotifier, LogNotifier, OperatorNotifier};
pub use scheduler::{spawn_dispatch_loop, CronRunScheduler, ExecutionDispatch, RunScheduler};
