/// Server setup and initialization
///
/// Wires together all components: storage, registry, executor, scheduler and
/// HTTP routes.

use crate::{
    api::{create_router, AppState},
    config::Config,
    database::Database,
    execution::ExecutionStorage,
    integration::IntegrationStorage,
    nodes::NodeRegistry,
    runtime::{
        spawn_dispatch_loop, CronRunScheduler, ErrorHandler, HttpNotifier, LogNotifier, OperatorNotifier,
        WorkflowExecutor,
    },
    workflow::{WorkflowRegistry, WorkflowStorage},
};
use anyhow::Result;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Create the main Axum application with all routes and background jobs
pub async fn create_app(config: Config) -> Result<Router> {
    let db = Database::connect(&config.database.url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open database {}: {}", config.database.url, e))?;

    tracing::info!("🧩 Registering built-in node types");
    let nodes = Arc::new(NodeRegistry::with_builtins());
    tracing::debug!("🧩 Node types: {:?}", nodes.types());

    tracing::info!("📊 Initializing workflow registry");
    let registry = Arc::new(WorkflowRegistry::new(WorkflowStorage::new(&db), nodes));
    registry
        .init_from_storage()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load workflows from storage: {}", e))?;

    let executions = ExecutionStorage::new(&db);
    let integrations = IntegrationStorage::new(&db);

    tracing::info!("⏰ Initializing run scheduler");
    let (scheduler, dispatch_rx) = CronRunScheduler::new()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to initialize scheduler: {}", e))?;
    scheduler
        .add_cleanup_job(
            &config.engine.cleanup_schedule,
            executions.clone(),
            config.engine.execution_retention_days,
        )
        .await?;
    scheduler.start().await?;

    let notifier: Arc<dyn OperatorNotifier> = match &config.engine.notify_url {
        Some(url) => {
            tracing::info!("📣 Operator notifications go to {}", url);
            Arc::new(HttpNotifier::new(url.clone()))
        }
        None => Arc::new(LogNotifier),
    };

    tracing::info!("🚀 Initializing workflow executor");
    let executor = Arc::new(WorkflowExecutor::new(
        Arc::clone(&registry),
        executions,
        integrations.clone(),
        Arc::new(ErrorHandler::new(config.engine.error_log_capacity)),
        Arc::new(scheduler),
        notifier,
    ));
    spawn_dispatch_loop(Arc::clone(&executor), dispatch_rx);

    let state = AppState {
        registry,
        executor,
        integrations,
        webhooks: Arc::new(config.webhooks.clone()),
    };

    tracing::info!("✅ Application initialized successfully");
    Ok(create_router(state))
}

/// Start the HTTP server with the given configuration
pub async fn start_server(config: Config) -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    tracing::info!("Starting hookflow server...");

    let app = create_app(config.clone()).await?;

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr).await?;

    tracing::info!("Server listening on http://{}", bind_addr);

    // Peer address feeds the webhook payload's ip_address fallback
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
