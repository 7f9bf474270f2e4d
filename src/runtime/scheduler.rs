/// Delayed run scheduler and periodic maintenance
///
/// Built on tokio-cron-scheduler. Delayed runs (workflow retries, fallback
/// runs) are one-shot jobs that hand the execution id to a dispatch channel;
/// the dispatch loop owns the executor and advances each id in turn. The same
/// scheduler carries the execution retention cleanup as a cron job.

use crate::execution::ExecutionStorage;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{sync::Arc, time::Duration};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

/// Delayed-callback scheduler the executor escalates through
#[async_trait]
pub trait RunScheduler: Send + Sync {
    /// Advance the pending execution `execution_id` at (or soon after) `at`
    async fn run_at(&self, at: DateTime<Utc>, execution_id: &str) -> Result<()>;
}

/// Something that can advance a pending execution by id
#[async_trait]
pub trait ExecutionDispatch: Send + Sync {
    async fn dispatch(&self, execution_id: &str) -> Result<bool>;
}

pub struct CronRunScheduler {
    scheduler: Arc<RwLock<JobScheduler>>,
    dispatch_tx: mpsc::UnboundedSender<String>,
}

impl CronRunScheduler {
    /// Create the scheduler and the receiving end of its dispatch channel
    pub async fn new() -> Result<(Self, mpsc::UnboundedReceiver<String>)> {
        let scheduler = JobScheduler::new().await?;
        let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();
        Ok((
            Self { scheduler: Arc::new(RwLock::new(scheduler)), dispatch_tx },
            dispatch_rx,
        ))
    }

    pub async fn start(&self) -> Result<()> {
        tracing::info!("⏰ Starting run scheduler");
        self.scheduler.read().await.start().await?;
        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        tracing::info!("⏹️ Stopping run scheduler");
        self.scheduler.write().await.shutdown().await?;
        Ok(())
    }

    /// Register the cron job that deletes terminal executions older than
    /// `retention_days`
    pub async fn add_cleanup_job(
        &self,
        schedule: &str,
        executions: ExecutionStorage,
        retention_days: u32,
    ) -> Result<Uuid> {
        let job = Job::new_async(schedule, move |_uuid, _l| {
            let executions = executions.clone();
            Box::pin(async move {
                match executions.cleanup_older_than(retention_days).await {
                    Ok(removed) => tracing::info!(
                        "🧹 Retention cleanup removed {} executions older than {} days",
                        removed,
                        retention_days
                    ),
                    Err(e) => tracing::error!("❌ Retention cleanup failed: {}", e),
                }
            })
        })?;

        let uuid = self.scheduler.read().await.add(job).await?;
        tracing::info!("🧹 Registered retention cleanup ({}), keeping {} days", schedule, retention_days);
        Ok(uuid)
    }
}

#[async_trait]
impl RunScheduler for CronRunScheduler {
    async fn run_at(&self, at: DateTime<Utc>, execution_id: &str) -> Result<()> {
        let delay = (at - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO)
            .max(Duration::from_millis(1));

        let id = execution_id.to_string();
        let tx = self.dispatch_tx.clone();
        let job = Job::new_one_shot_async(delay, move |_uuid, _l| {
            let id = id.clone();
            let tx = tx.clone();
            Box::pin(async move {
                tracing::debug!("🔔 Delayed run due: {}", id);
                if tx.send(id.clone()).is_err() {
                    tracing::error!("❌ Dispatch loop is gone; delayed run {} dropped", id);
                }
            })
        })?;

        self.scheduler.read().await.add(job).await?;
        tracing::info!("⏳ Scheduled execution {} in {:?}", execution_id, delay);
        Ok(())
    }
}

/// Advance every id that arrives on the channel, one at a time
pub fn spawn_dispatch_loop<D>(dispatcher: Arc<D>, mut rx: mpsc::UnboundedReceiver<String>) -> JoinHandle<()>
where
    D: ExecutionDispatch + ?Sized + 'static,
{
    tokio::spawn(async move {
        while let Some(execution_id) = rx.recv().await {
            match dispatcher.dispatch(&execution_id).await {
                Ok(true) => tracing::info!("✅ Delayed execution {} completed", execution_id),
                Ok(false) => tracing::warn!("⚠️ Delayed execution {} did not complete", execution_id),
                Err(e) => tracing::error!("❌ Delayed execution {} errored: {}", execution_id, e),
            }
        }
        tracing::debug!("📭 Dispatch loop finished");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ExecutionDispatch for Recorder {
        async fn dispatch(&self, execution_id: &str) -> Result<bool> {
            self.seen.lock().unwrap().push(execution_id.to_string());
            Ok(true)
        }
    }

    #[tokio::test]
    async fn dispatch_loop_forwards_ids_in_order() {
        let recorder = Arc::new(Recorder::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = spawn_dispatch_loop(Arc::clone(&recorder), rx);

        tx.send("a".to_string()).unwrap();
        tx.send("b".to_string()).unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(*recorder.seen.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn one_shot_job_delivers_execution_id() {
        let (scheduler, mut rx) = CronRunScheduler::new().await.unwrap();
        scheduler.start().await.unwrap();

        scheduler.run_at(Utc::now(), "ex-42").await.unwrap();

        let id = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("scheduler did not fire")
            .unwrap();
        assert_eq!(id, "ex-42");
        scheduler.stop().await.unwrap();
    }
}
