/// hookflow server entry point
///
/// Loads configuration from the environment and serves:
/// - Workflow management API at /api/workflows/*
/// - Generic webhooks at /{HOOKFLOW_WEBHOOK_BASE}/{key}
/// - Signed webhooks at /{HOOKFLOW_SIGNED_WEBHOOK_BASE}/{key}
/// - Health check at /healthz

use hookflow::{config::Config, server::start_server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();

    start_server(config).await?;

    Ok(())
}
