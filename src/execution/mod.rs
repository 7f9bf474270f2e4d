/// Execution records
///
/// Types for one run of a workflow (status, trigger, context snapshot) and the
/// SQLite store that persists them.

pub mod storage;
pub mod types;

pub use storage::ExecutionStorage;
pub use types::{Execution, ExecutionContext, ExecutionStatus, NewExecution, TriggerType};
