/// Workflow executor
///
/// Advances one execution from `pending` to a terminal state: claims it,
/// resolves the entry node, walks the graph depth-first in edge declaration
/// order, runs every reached node through the error handler, then persists the
/// context snapshot. A node already present in `node_outputs` is never run
/// again in the same execution, which caps cycles at one visit per node and
/// makes fan-in "first path wins".
///
/// Failed executions escalate per the workflow's `on_failure` policy. Escalation
/// is best-effort and only ever logged.

use crate::execution::{Execution, ExecutionContext, ExecutionStatus, ExecutionStorage, NewExecution, TriggerType};
use crate::integration::IntegrationStorage;
use crate::nodes::{ErrorCategory, NodeContext, NodeError, NodeHandler, NodeRegistry, SettingsError};
use crate::runtime::error_handler::{ErrorHandler, ErrorHandlingConfig, HandlerError};
use crate::runtime::notify::{FailureNotice, OperatorNotifier};
use crate::runtime::scheduler::{ExecutionDispatch, RunScheduler};
use crate::workflow::{
    is_truthy, CompiledWorkflow, DocPath, Edge, FailureEscalation, Node, Workflow, WorkflowRegistry,
};
use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Outcome of `execute_webhook`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookRunResult {
    pub success: bool,
    pub execution_id: String,
}

/// Why a run failed
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("workflow not found: {0}")]
    WorkflowNotFound(String),
    #[error("workflow {0} is not active")]
    WorkflowInactive(String),
    #[error("no matching start node")]
    NoStartNode,
    #[error("node '{0}' is not part of the workflow")]
    MissingNode(String),
    #[error("node '{node_id}' has unknown type '{node_type}'")]
    UnknownNodeType { node_id: String, node_type: String },
    #[error("node '{node_id}': {source}")]
    InvalidSettings { node_id: String, source: SettingsError },
    #[error("node '{node_id}' has invalid error_handling: {source}")]
    InvalidErrorHandling { node_id: String, source: serde_json::Error },
    #[error("node '{node_id}' failed: {source}")]
    Node { node_id: String, source: HandlerError },
}

pub struct WorkflowExecutor {
    workflows: Arc<WorkflowRegistry>,
    nodes: Arc<NodeRegistry>,
    executions: ExecutionStorage,
    integrations: IntegrationStorage,
    error_handler: Arc<ErrorHandler>,
    scheduler: Arc<dyn RunScheduler>,
    notifier: Arc<dyn OperatorNotifier>,
}

impl std::fmt::Debug for WorkflowExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowExecutor")
            .field("nodes", &self.nodes)
            .field("error_handler", &self.error_handler)
            .finish_non_exhaustive()
    }
}

impl WorkflowExecutor {
    pub fn new(
        workflows: Arc<WorkflowRegistry>,
        executions: ExecutionStorage,
        integrations: IntegrationStorage,
        error_handler: Arc<ErrorHandler>,
        scheduler: Arc<dyn RunScheduler>,
        notifier: Arc<dyn OperatorNotifier>,
    ) -> Self {
        let nodes = Arc::clone(workflows.node_registry());
        Self { workflows, nodes, executions, integrations, error_handler, scheduler, notifier }
    }

    pub fn executions(&self) -> &ExecutionStorage {
        &self.executions
    }

    pub fn error_handler(&self) -> &Arc<ErrorHandler> {
        &self.error_handler
    }

    /// Create a pending execution for `workflow_id` and run it to completion
    pub async fn execute_webhook(
        &self,
        workflow_id: &str,
        payload: Value,
        trigger_type: TriggerType,
    ) -> anyhow::Result<WebhookRunResult> {
        let execution_id = self
            .executions
            .create(NewExecution::new(workflow_id, trigger_type, payload))
            .await?;
        let success = self.execute(&execution_id).await?;
        Ok(WebhookRunResult { success, execution_id })
    }

    /// Advance a pending execution to a terminal state.
    ///
    /// Returns whether it completed. Executions that are not pending, or that
    /// another caller claimed first, are left alone and yield `false`.
    pub async fn execute(&self, execution_id: &str) -> anyhow::Result<bool> {
        let Some(execution) = self.executions.get(execution_id).await? else {
            tracing::warn!("⚠️ Execution not found: {}", execution_id);
            return Ok(false);
        };
        if execution.status != ExecutionStatus::Pending {
            tracing::debug!("⏭️ Execution {} is {}, nothing to do", execution_id, execution.status);
            return Ok(false);
        }
        if !self.executions.try_start(execution_id).await? {
            tracing::debug!("⏭️ Execution {} was claimed by another caller", execution_id);
            return Ok(false);
        }

        let outcome = AssertUnwindSafe(self.run_claimed(&execution)).catch_unwind().await;
        let error = match outcome {
            Ok(Ok(completed)) => return Ok(completed),
            Ok(Err(e)) => e,
            Err(panic) => anyhow::anyhow!("execution panicked: {}", panic_message(panic.as_ref())),
        };

        // The row is `running`; leave it terminal even when the walk could not finish
        tracing::error!("❌ Execution {} aborted: {:#}", execution.id, error);
        let partial = json!({ "trigger": execution.trigger_data });
        if let Err(e) = self.executions.fail(&execution.id, &format!("{:#}", error), &partial).await {
            tracing::error!("❌ Could not mark execution {} failed: {}", execution.id, e);
        }
        Err(error)
    }

    /// Everything after a successful claim
    async fn run_claimed(&self, execution: &Execution) -> anyhow::Result<bool> {
        tracing::info!(
            "🚀 Starting execution {} of workflow {} ({})",
            execution.id,
            execution.workflow_id,
            execution.trigger_type
        );
        let start_time = std::time::Instant::now();

        let compiled = match self.load_active_workflow(&execution.workflow_id) {
            Ok(compiled) => compiled,
            Err(e) => {
                let partial = json!({ "trigger": execution.trigger_data });
                self.finish_failed(execution, &e, &partial).await?;
                return Ok(false);
            }
        };

        let mut context = ExecutionContext::from_trigger(
            &compiled.workflow.id,
            &execution.id,
            execution.trigger_data.clone(),
            &compiled.workflow.settings.variables,
        );

        match self.walk(&compiled, execution, &mut context).await {
            Ok(()) => {
                if !self.executions.complete(&execution.id, &context.snapshot()).await? {
                    tracing::warn!("⚠️ Execution {} was no longer running at completion", execution.id);
                    return Ok(false);
                }
                tracing::info!(
                    "✅ Execution {} completed in {:?} ({} nodes)",
                    execution.id,
                    start_time.elapsed(),
                    context.execution_order.len()
                );
                Ok(true)
            }
            Err(e) => {
                self.finish_failed(execution, &e, &context.snapshot()).await?;
                self.escalate(&compiled.workflow, execution, &e).await;
                Ok(false)
            }
        }
    }

    fn load_active_workflow(&self, workflow_id: &str) -> Result<Arc<CompiledWorkflow>, EngineError> {
        let compiled = self
            .workflows
            .get_workflow(workflow_id)
            .ok_or_else(|| EngineError::WorkflowNotFound(workflow_id.to_string()))?;
        if !compiled.workflow.is_active() {
            return Err(EngineError::WorkflowInactive(workflow_id.to_string()));
        }
        Ok(compiled)
    }

    async fn finish_failed(&self, execution: &Execution, error: &EngineError, partial: &Value) -> anyhow::Result<()> {
        tracing::error!("❌ Execution {} failed: {}", execution.id, error);
        if !self.executions.fail(&execution.id, &error.to_string(), partial).await? {
            tracing::warn!("⚠️ Execution {} was no longer running at failure", execution.id);
        }
        Ok(())
    }

    /// Webhook runs start at the node the gateway matched; manual and fallback
    /// runs start at the first trigger node.
    fn resolve_entry<'w>(&self, compiled: &'w CompiledWorkflow, execution: &Execution) -> Result<&'w Node, EngineError> {
        let entry_id = match execution.trigger_type {
            TriggerType::Webhook => execution.trigger_data.get("node_id").and_then(Value::as_str),
            TriggerType::Manual | TriggerType::Fallback => compiled.start_node_ids.first().map(String::as_str),
        };
        entry_id
            .and_then(|id| compiled.workflow.node(id))
            .ok_or(EngineError::NoStartNode)
    }

    /// Depth-first walk from the entry node
    async fn walk(
        &self,
        compiled: &CompiledWorkflow,
        execution: &Execution,
        context: &mut ExecutionContext,
    ) -> Result<(), EngineError> {
        let entry = self.resolve_entry(compiled, execution)?;
        tracing::debug!("🎯 Entry node for {}: {}", execution.id, entry.id);

        let mut stack: Vec<(String, Value)> = vec![(entry.id.clone(), context.trigger.clone())];

        while let Some((node_id, input)) = stack.pop() {
            if context.has_output(&node_id) {
                tracing::debug!("♻️ Node {} already ran in {}, reusing its output", node_id, execution.id);
                continue;
            }

            let node = compiled
                .workflow
                .node(&node_id)
                .ok_or_else(|| EngineError::MissingNode(node_id.clone()))?;
            let output = self.run_node(node, context, input).await?;
            context.record_output(&node_id, output.clone());

            let next: Vec<&Edge> = compiled
                .outgoing(&node_id)
                .iter()
                .filter(|edge| edge_followed(edge, &output))
                .collect();
            for edge in next.into_iter().rev() {
                stack.push((edge.to.clone(), output.clone()));
            }
        }

        Ok(())
    }

    async fn run_node(&self, node: &Node, context: &ExecutionContext, input: Value) -> Result<Value, EngineError> {
        let handler = self.nodes.get(&node.node_type).ok_or_else(|| EngineError::UnknownNodeType {
            node_id: node.id.clone(),
            node_type: node.node_type.clone(),
        })?;
        handler
            .validate_settings(&node.settings)
            .map_err(|source| EngineError::InvalidSettings { node_id: node.id.clone(), source })?;
        let config = ErrorHandlingConfig::from_node_settings(&node.settings)
            .map_err(|source| EngineError::InvalidErrorHandling { node_id: node.id.clone(), source })?;

        let integration = self.resolve_integration(node).await;

        tracing::info!("🚀 Starting node execution: {} (type: {})", node.id, node.node_type);
        let start_time = std::time::Instant::now();

        let node_handler: &dyn NodeHandler = &*handler;
        let integration = &integration;
        let input = &input;
        let outcome = self
            .error_handler
            .run(&node.id, &config, move |attempt| async move {
                if attempt > 0 {
                    tracing::debug!("🔁 Node {} attempt {}", node.id, attempt + 1);
                }
                let integration = integration.as_ref().map_err(|e| e.clone())?;
                let ctx = NodeContext { node, execution: context, integration: integration.as_ref() };
                AssertUnwindSafe(node_handler.execute(&ctx, input.clone()))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        Err(NodeError::new(
                            ErrorCategory::System,
                            format!("node panicked: {}", panic_message(panic.as_ref())),
                        ))
                    })
            })
            .await
            .map_err(|source| EngineError::Node { node_id: node.id.clone(), source })?;

        if let Some(error) = outcome.error() {
            tracing::warn!("⚠️ Node {} recovered from error: {}", node.id, error);
        }
        tracing::info!("✅ Node execution completed: {} in {:?}", node.id, start_time.elapsed());

        Ok(outcome.into_output())
    }

    /// Decrypted settings of the integration a node references, if any
    async fn resolve_integration(&self, node: &Node) -> Result<Option<Map<String, Value>>, NodeError> {
        let Some(integration_id) = node.settings.get("integration_id").and_then(Value::as_str) else {
            return Ok(None);
        };

        let integration = match self.integrations.get(integration_id).await {
            Ok(Some(integration)) => integration,
            Ok(None) => {
                return Err(NodeError::authentication(format!("integration '{}' not found", integration_id)))
            }
            Err(e) => {
                return Err(NodeError::new(
                    ErrorCategory::System,
                    format!("integration '{}' lookup failed: {}", integration_id, e),
                ))
            }
        };
        if !integration.is_active {
            return Err(NodeError::authentication(format!("integration '{}' is inactive", integration_id)));
        }

        self.integrations
            .decrypt_settings(&integration.settings)
            .map(Some)
            .map_err(|e| NodeError::authentication(format!("integration '{}' unreadable: {}", integration_id, e)))
    }

    /// Apply the workflow's `on_failure` policy. Fallback runs never escalate.
    async fn escalate(&self, workflow: &Workflow, execution: &Execution, error: &EngineError) {
        if execution.trigger_type == TriggerType::Fallback {
            tracing::debug!("⏭️ Fallback execution {} failed; not escalating", execution.id);
            return;
        }
        let Some(policy) = &workflow.settings.on_failure else {
            return;
        };

        let result = match policy {
            FailureEscalation::RetryWorkflow { delay_ms, max_attempts } => {
                self.schedule_retry(execution, *delay_ms, *max_attempts).await
            }
            FailureEscalation::Notify { email } => {
                let notice = FailureNotice {
                    email: email.clone(),
                    workflow_id: workflow.id.clone(),
                    workflow_name: workflow.name.clone(),
                    execution_id: execution.id.clone(),
                    error: error.to_string(),
                };
                self.notifier.notify(&notice).await
            }
            FailureEscalation::Fallback { workflow_id } => {
                self.spawn_fallback(workflow_id, execution, error).await
            }
        };

        if let Err(e) = result {
            tracing::error!("❌ Escalation for execution {} failed: {}", execution.id, e);
        }
    }

    async fn schedule_retry(&self, execution: &Execution, delay_ms: u64, max_attempts: u32) -> anyhow::Result<()> {
        if execution.attempt >= max_attempts {
            tracing::warn!(
                "🛑 Execution {} used all {} workflow retries",
                execution.id,
                max_attempts
            );
            return Ok(());
        }

        let retry = NewExecution {
            workflow_id: execution.workflow_id.clone(),
            trigger_type: execution.trigger_type,
            trigger_data: execution.trigger_data.clone(),
            retry_of: Some(execution.retry_of.clone().unwrap_or_else(|| execution.id.clone())),
            attempt: execution.attempt + 1,
        };
        let retry_id = self.executions.create(retry).await?;
        let at = Utc::now() + chrono::Duration::milliseconds(delay_ms.min(i64::MAX as u64) as i64);
        self.scheduler.run_at(at, &retry_id).await?;

        tracing::info!(
            "🔁 Scheduled workflow retry {} (attempt {}/{}) for failed execution {}",
            retry_id,
            execution.attempt + 1,
            max_attempts,
            execution.id
        );
        Ok(())
    }

    async fn spawn_fallback(&self, fallback_id: &str, execution: &Execution, error: &EngineError) -> anyhow::Result<()> {
        if self.workflows.get_workflow(fallback_id).is_none() {
            anyhow::bail!("fallback workflow {} does not exist", fallback_id);
        }

        let payload = json!({
            "error": error.to_string(),
            "failed_execution_id": execution.id,
            "workflow_id": execution.workflow_id,
            "original_trigger": execution.trigger_data,
        });
        let fallback_execution = self
            .executions
            .create(NewExecution::new(fallback_id, TriggerType::Fallback, payload))
            .await?;
        self.scheduler.run_at(Utc::now(), &fallback_execution).await?;

        tracing::info!(
            "🪂 Scheduled fallback execution {} of workflow {} for failed execution {}",
            fallback_execution,
            fallback_id,
            execution.id
        );
        Ok(())
    }
}

#[async_trait]
impl ExecutionDispatch for WorkflowExecutor {
    async fn dispatch(&self, execution_id: &str) -> anyhow::Result<bool> {
        self.execute(execution_id).await
    }
}

/// Whether an edge is taken given its source node's output
fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn edge_followed(edge: &Edge, output: &Value) -> bool {
    let Some(condition) = &edge.condition else {
        return true;
    };
    let path: DocPath = match condition.path.parse() {
        Ok(path) => path,
        Err(e) => {
            tracing::warn!("⚠️ Edge {} -> {} has bad condition path: {}", edge.from, edge.to, e);
            return false;
        }
    };
    match (path.get(output), &condition.equals) {
        (Ok(value), Some(expected)) => value == expected,
        (Ok(value), None) => is_truthy(value),
        (Err(_), _) => false,
    }
}
