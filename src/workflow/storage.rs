/// SQLite persistence layer for workflow storage
///
/// Workflows are stored as a JSON definition (nodes, edges, settings) with the
/// status and timestamps kept in their own columns for filtering.

use crate::database::Database;
use crate::workflow::types::{Node, Workflow, WorkflowStatus};
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePool, sqlite::SqliteRow, Row};

#[derive(Debug, Clone)]
pub struct WorkflowStorage {
    pool: SqlitePool,
}

impl WorkflowStorage {
    pub fn new(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }

    /// Store a new workflow or update an existing one
    ///
    /// Uses UPSERT so create and update are a single statement; `created_at`
    /// survives updates.
    pub async fn save(&self, workflow: &Workflow) -> Result<()> {
        let definition_json = serde_json::to_string(workflow)?;
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO workflows (id, name, status, definition, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                status = excluded.status,
                definition = excluded.definition,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&workflow.id)
        .bind(&workflow.name)
        .bind(workflow.status.as_str())
        .bind(&definition_json)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Retrieve a workflow by ID
    pub async fn get(&self, id: &str) -> Result<Option<Workflow>> {
        let row = sqlx::query(
            "SELECT status, definition, created_at, updated_at FROM workflows WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| workflow_from_row(&r)).transpose()
    }

    /// Load every workflow, most recently updated first
    pub async fn get_all(&self) -> Result<Vec<Workflow>> {
        let rows = sqlx::query(
            "SELECT status, definition, created_at, updated_at FROM workflows ORDER BY updated_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(workflow_from_row).collect()
    }

    /// Ordered node list of a workflow; empty if the workflow does not exist
    pub async fn get_nodes(&self, workflow_id: &str) -> Result<Vec<Node>> {
        Ok(self.get(workflow_id).await?.map(|w| w.nodes).unwrap_or_default())
    }

    /// Change only the status column; returns false when the workflow is unknown
    pub async fn update_status(&self, id: &str, status: WorkflowStatus) -> Result<bool> {
        let result = sqlx::query("UPDATE workflows SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a workflow by ID
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM workflows WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn workflow_from_row(row: &SqliteRow) -> Result<Workflow> {
    let definition_json: String = row.get("definition");
    let status: String = row.get("status");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    let mut workflow: Workflow = serde_json::from_str(&definition_json)?;
    // Columns are authoritative; status may have changed without a definition rewrite.
    workflow.status = status.parse::<WorkflowStatus>()?;
    workflow.created_at = Some(parse_timestamp(&created_at)?);
    workflow.updated_at = Some(parse_timestamp(&updated_at)?);
    Ok(workflow)
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}
