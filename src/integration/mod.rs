/// Integration settings
///
/// Named credential bundles that node settings reference by `integration_id`.
/// Sealing the settings is the credential vault's job; the engine only reads
/// the stored envelope back into a settings map for one node call.

use crate::database::Database;
use crate::workflow::storage::parse_timestamp;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::{sqlite::SqlitePool, Row};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Integration {
    pub id: String,
    pub name: String,
    /// e.g. "slack", "smtp", "http_bearer"
    pub integration_type: String,
    /// Stored settings envelope, decoded with [`IntegrationStorage::decrypt_settings`]
    pub settings: String,
    pub is_active: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct IntegrationStorage {
    pool: SqlitePool,
}

impl IntegrationStorage {
    pub fn new(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }

    pub async fn save(&self, integration: &Integration) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO integrations (id, name, integration_type, settings, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                integration_type = excluded.integration_type,
                settings = excluded.settings,
                is_active = excluded.is_active,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&integration.id)
        .bind(&integration.name)
        .bind(&integration.integration_type)
        .bind(&integration.settings)
        .bind(integration.is_active)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<Integration>> {
        let row = sqlx::query(
            "SELECT id, name, integration_type, settings, is_active, updated_at FROM integrations WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            let updated_at: String = r.get("updated_at");
            Ok(Integration {
                id: r.get("id"),
                name: r.get("name"),
                integration_type: r.get("integration_type"),
                settings: r.get("settings"),
                is_active: r.get("is_active"),
                updated_at: Some(parse_timestamp(&updated_at)?),
            })
        })
        .transpose()
    }

    /// Decode a stored settings envelope into a key/value map
    pub fn decrypt_settings(&self, blob: &str) -> Result<Map<String, Value>> {
        match serde_json::from_str::<Value>(blob)? {
            Value::Object(map) => Ok(map),
            other => Err(anyhow::anyhow!(
                "Integration settings must be a JSON object, got {}",
                type_name(&other)
            )),
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
