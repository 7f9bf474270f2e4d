/// Operator notification for failed executions
///
/// Notification is best-effort: the executor logs a failed notification and
/// moves on.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

/// What an operator is told about a failed execution
#[derive(Debug, Clone, Serialize)]
pub struct FailureNotice {
    pub email: String,
    pub workflow_id: String,
    pub workflow_name: String,
    pub execution_id: String,
    pub error: String,
}

#[async_trait]
pub trait OperatorNotifier: Send + Sync {
    async fn notify(&self, notice: &FailureNotice) -> Result<()>;
}

/// Writes the notice to the log; used when no notify URL is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl OperatorNotifier for LogNotifier {
    async fn notify(&self, notice: &FailureNotice) -> Result<()> {
        tracing::warn!(
            "📣 Notify {}: workflow '{}' ({}) execution {} failed: {}",
            notice.email,
            notice.workflow_name,
            notice.workflow_id,
            notice.execution_id,
            notice.error
        );
        Ok(())
    }
}

/// Posts the notice as JSON to a relay (mail gateway, chat webhook)
#[derive(Debug, Clone)]
pub struct HttpNotifier {
    client: reqwest::Client,
    url: String,
}

impl HttpNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), url: url.into() }
    }
}

#[async_trait]
impl OperatorNotifier for HttpNotifier {
    async fn notify(&self, notice: &FailureNotice) -> Result<()> {
        let response = self.client.post(&self.url).json(notice).send().await?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("notify relay {} answered {}", self.url, status);
        }
        tracing::info!("📣 Notified {} about failed execution {}", notice.email, notice.execution_id);
        Ok(())
    }
}
