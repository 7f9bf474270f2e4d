/// Configuration management for the hookflow engine
///
/// Handles server configuration, database connection, webhook routing and
/// error-handling parameters. Every value can be overridden from the environment.

use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Webhook gateway configuration
    pub webhooks: WebhookConfig,
    /// Execution engine configuration
    pub engine: EngineConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Server port number
    pub port: u16,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite connection URL (default: "sqlite://data/hookflow.db")
    pub url: String,
}

/// Webhook gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Path segment for generic webhooks: /{base}/{key}
    pub base_path: String,
    /// Path segment for HMAC-signed webhooks: /{signed_base}/{key}
    pub signed_base_path: String,
    /// Header carrying base64(HMAC-SHA256(raw body, secret))
    pub signature_header: String,
    /// Maximum accepted request body size in bytes
    pub body_limit_bytes: usize,
}

/// Execution engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Executions older than this are removed by the cleanup job
    pub execution_retention_days: u32,
    /// Cron expression for the retention cleanup job
    pub cleanup_schedule: String,
    /// Number of handled node failures kept in memory for inspection
    pub error_log_capacity: usize,
    /// Optional URL that receives operator notifications as JSON
    pub notify_url: Option<String>,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Default for Config {
    /// Default configuration with ENV_VAR support for container deployment
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: env_or("HOOKFLOW_HOST", "0.0.0.0"),
                port: env_parse("HOOKFLOW_PORT", 3004),
            },
            database: DatabaseConfig {
                url: env_or("HOOKFLOW_DATABASE_URL", "sqlite://data/hookflow.db"),
            },
            webhooks: WebhookConfig {
                base_path: env_or("HOOKFLOW_WEBHOOK_BASE", "webhook"),
                signed_base_path: env_or("HOOKFLOW_SIGNED_WEBHOOK_BASE", "webhook-signed"),
                signature_header: env_or("HOOKFLOW_SIGNATURE_HEADER", "x-signature").to_lowercase(),
                body_limit_bytes: env_parse("HOOKFLOW_BODY_LIMIT_BYTES", 2 * 1024 * 1024),
            },
            engine: EngineConfig {
                execution_retention_days: env_parse("HOOKFLOW_EXECUTION_RETENTION_DAYS", 30),
                cleanup_schedule: env_or("HOOKFLOW_CLEANUP_SCHEDULE", "0 0 3 * * *"),
                error_log_capacity: env_parse("HOOKFLOW_ERROR_LOG_CAPACITY", 500),
                notify_url: std::env::var("HOOKFLOW_NOTIFY_URL").ok().filter(|u| !u.is_empty()),
            },
        }
    }
}
