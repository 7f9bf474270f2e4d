/// SQLite persistence for execution records
///
/// Executions are append-only once terminal. The `pending → running`
/// transition is a conditional update so two advancers can never both start
/// the same execution.

use crate::database::Database;
use crate::execution::types::{Execution, ExecutionStatus, NewExecution};
use crate::workflow::storage::parse_timestamp;
use anyhow::Result;
use chrono::{Duration, Utc};
use serde_json::Value;
use sqlx::{sqlite::SqlitePool, sqlite::SqliteRow, Row};

#[derive(Debug, Clone)]
pub struct ExecutionStorage {
    pool: SqlitePool,
}

impl ExecutionStorage {
    pub fn new(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }

    /// Insert a pending execution and return its id
    pub async fn create(&self, new: NewExecution) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let trigger_json = serde_json::to_string(&new.trigger_data)?;

        sqlx::query(
            r#"
            INSERT INTO executions
                (id, workflow_id, status, trigger_type, trigger_data, retry_of, attempt, created_at)
            VALUES (?, ?, 'pending', ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&new.workflow_id)
        .bind(new.trigger_type.as_str())
        .bind(&trigger_json)
        .bind(&new.retry_of)
        .bind(new.attempt as i64)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        tracing::debug!("📝 Created pending execution {} for workflow {}", id, new.workflow_id);
        Ok(id)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Execution>> {
        let row = sqlx::query("SELECT * FROM executions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| execution_from_row(&r)).transpose()
    }

    /// Executions of one workflow, newest first
    pub async fn list_for_workflow(&self, workflow_id: &str, limit: u32) -> Result<Vec<Execution>> {
        let rows = sqlx::query(
            "SELECT * FROM executions WHERE workflow_id = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(workflow_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(execution_from_row).collect()
    }

    /// Atomically claim a pending execution; false if it was not pending
    pub async fn try_start(&self, id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE executions SET status = 'running', started_at = ? WHERE id = ? AND status = 'pending'",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Finalize a running execution as completed with its context snapshot
    pub async fn complete(&self, id: &str, execution_data: &Value) -> Result<bool> {
        self.finish(id, ExecutionStatus::Completed, execution_data, None).await
    }

    /// Finalize a running execution as failed with the partial context
    pub async fn fail(&self, id: &str, error_message: &str, execution_data: &Value) -> Result<bool> {
        self.finish(id, ExecutionStatus::Failed, execution_data, Some(error_message)).await
    }

    async fn finish(
        &self,
        id: &str,
        status: ExecutionStatus,
        execution_data: &Value,
        error_message: Option<&str>,
    ) -> Result<bool> {
        let data_json = serde_json::to_string(execution_data)?;
        let result = sqlx::query(
            r#"
            UPDATE executions
            SET status = ?, execution_data = ?, error_message = ?, completed_at = ?
            WHERE id = ? AND status = 'running'
            "#,
        )
        .bind(status.as_str())
        .bind(&data_json)
        .bind(error_message)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Delete terminal executions created more than `days` days ago
    pub async fn cleanup_older_than(&self, days: u32) -> Result<u64> {
        let cutoff = (Utc::now() - Duration::days(days as i64)).to_rfc3339();
        let result = sqlx::query(
            "DELETE FROM executions WHERE created_at < ? AND status IN ('completed', 'failed')",
        )
        .bind(&cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

fn execution_from_row(row: &SqliteRow) -> Result<Execution> {
    let status: String = row.get("status");
    let trigger_type: String = row.get("trigger_type");
    let trigger_data: String = row.get("trigger_data");
    let execution_data: Option<String> = row.get("execution_data");
    let attempt: i64 = row.get("attempt");
    let created_at: String = row.get("created_at");
    let started_at: Option<String> = row.get("started_at");
    let completed_at: Option<String> = row.get("completed_at");

    Ok(Execution {
        id: row.get("id"),
        workflow_id: row.get("workflow_id"),
        status: status.parse()?,
        trigger_type: trigger_type.parse()?,
        trigger_data: serde_json::from_str(&trigger_data)?,
        execution_data: execution_data.map(|d| serde_json::from_str(&d)).transpose()?,
        retry_of: row.get("retry_of"),
        attempt: attempt as u32,
        created_at: parse_timestamp(&created_at)?,
        started_at: started_at.map(|t| parse_timestamp(&t)).transpose()?,
        completed_at: completed_at.map(|t| parse_timestamp(&t)).transpose()?,
        error_message: row.get("error_message"),
    })
}
