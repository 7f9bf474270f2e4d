/// Typed errors of the node execution contract

use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad failure class a node reports; each carries its own default
/// retryability and retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Node,
    Connection,
    Timeout,
    Validation,
    Permission,
    RateLimit,
    Authentication,
    Data,
    System,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Node => "node",
            ErrorCategory::Connection => "connection",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Permission => "permission",
            ErrorCategory::RateLimit => "rate_limit",
            ErrorCategory::Authentication => "authentication",
            ErrorCategory::Data => "data",
            ErrorCategory::System => "system",
        }
    }

    /// Whether failures of this category are retried when no message rule applies
    pub fn retryable_by_default(&self) -> bool {
        matches!(
            self,
            ErrorCategory::Node
                | ErrorCategory::Connection
                | ErrorCategory::Timeout
                | ErrorCategory::RateLimit
                | ErrorCategory::System
        )
    }

    /// Retry budget used when the node's error handling sets no `max_retries`
    pub fn default_max_retries(&self) -> u32 {
        match self {
            ErrorCategory::Node => 3,
            ErrorCategory::Connection => 5,
            ErrorCategory::Timeout => 3,
            ErrorCategory::RateLimit => 5,
            ErrorCategory::System => 2,
            ErrorCategory::Validation
            | ErrorCategory::Permission
            | ErrorCategory::Authentication
            | ErrorCategory::Data => 0,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure raised by a node's `execute`
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct NodeError {
    pub category: ErrorCategory,
    pub message: String,
}

impl NodeError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self { category, message: message.into() }
    }

    pub fn node(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Node, message)
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Connection, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Timeout, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Validation, message)
    }

    pub fn data(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Data, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Authentication, message)
    }
}

/// One invalid settings field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Structured result of `validate_settings`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SettingsError {
    pub errors: Vec<FieldError>,
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        write!(f, "invalid settings: {}", parts.join("; "))
    }
}

impl std::error::Error for SettingsError {}

impl SettingsError {
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut err = Self::default();
        err.push(field, message);
        err
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError { field: field.into(), message: message.into() });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// `Ok(())` when nothing was pushed
    pub fn into_result(self) -> Result<(), SettingsError> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}
