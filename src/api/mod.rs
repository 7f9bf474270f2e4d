/// HTTP API Layer
///
/// The webhook gateway that turns inbound events into executions, plus a small
/// JSON API to save workflows, start manual runs and inspect executions.

// Workflow management and execution inspection endpoints
pub mod workflows;

// Generic and HMAC-signed webhook gateway
pub mod webhooks;

// Public client address from proxy headers
pub mod client_ip;

use crate::config::WebhookConfig;
use crate::integration::IntegrationStorage;
use crate::runtime::WorkflowExecutor;
use crate::workflow::WorkflowRegistry;
use axum::{extract::DefaultBodyLimit, routing::get, Router};
use std::sync::Arc;

pub use webhooks::create_webhook_routes;
pub use workflows::create_workflow_routes;

/// Shared resources every handler reads from
#[derive(Clone)]
pub struct AppState {
    /// Hot-reload registry of compiled workflows and webhook bindings
    pub registry: Arc<WorkflowRegistry>,
    pub executor: Arc<WorkflowExecutor>,
    /// Secrets for signed webhooks bound through an integration
    pub integrations: IntegrationStorage,
    pub webhooks: Arc<WebhookConfig>,
}

/// Assemble every route with its state
pub fn create_router(state: AppState) -> Router {
    let body_limit = state.webhooks.body_limit_bytes;
    Router::new()
        .route("/healthz", get(health_check))
        .merge(create_workflow_routes())
        .merge(create_webhook_routes(&state.webhooks))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

async fn health_check() -> &'static str {
    "ok"
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::database::Database;
    use crate::execution::ExecutionStorage;
    use crate::nodes::NodeRegistry;
    use crate::runtime::{ErrorHandler, LogNotifier, RunScheduler};
    use crate::workflow::{Workflow, WorkflowStatus, WorkflowStorage};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use serde_json::Value;

    /// Scheduler that drops delayed runs; router tests never need them
    pub struct NoopScheduler;

    #[async_trait]
    impl RunScheduler for NoopScheduler {
        async fn run_at(&self, _at: DateTime<Utc>, _execution_id: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    pub async fn state() -> AppState {
        let db = Database::in_memory().await.unwrap();
        let registry = Arc::new(WorkflowRegistry::new(
            WorkflowStorage::new(&db),
            Arc::new(NodeRegistry::with_builtins()),
        ));
        let integrations = IntegrationStorage::new(&db);
        let executor = Arc::new(WorkflowExecutor::new(
            Arc::clone(&registry),
            ExecutionStorage::new(&db),
            integrations.clone(),
            Arc::new(ErrorHandler::new(50)),
            Arc::new(NoopScheduler),
            Arc::new(LogNotifier),
        ));
        let webhooks = WebhookConfig {
            base_path: "webhook".into(),
            signed_base_path: "webhook-signed".into(),
            signature_header: "x-signature".into(),
            body_limit_bytes: 64 * 1024,
        };
        AppState { registry, executor, integrations, webhooks: Arc::new(webhooks) }
    }

    pub async fn save_active(state: &AppState, definition: Value) {
        let mut workflow: Workflow = serde_json::from_value(definition).unwrap();
        workflow.status = WorkflowStatus::Active;
        state.registry.save_workflow(workflow).await.unwrap();
    }
}
