/// Node failure handling: retry, backoff, classification and fallback values
///
/// The executor wraps every node call in [`ErrorHandler::run`]. The node's
/// `error_handling` settings choose a strategy; the handler returns a typed
/// [`NodeOutcome`] for every way a call can end without failing the run, and a
/// [`HandlerError`] otherwise.

use crate::nodes::{ErrorCategory, NodeError};
use crate::runtime::backoff::{BackoffPolicy, BackoffType};
use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex};

/// Name of the transform used when `on_error: transform` names none
pub const DEFAULT_TRANSFORM: &str = "error_object";

/// Messages that are never worth retrying, whatever the category says.
/// Each pattern only matches as whole words.
const NON_RETRYABLE_PATTERNS: &[&str] = &[
    "invalid api key",
    "auth failed",
    "authentication failed",
    "permission denied",
    "invalid config",
    "malformed request",
];

/// Messages that are always worth retrying, whatever the category says
const RETRYABLE_PATTERNS: &[&str] = &[
    "timeout",
    "timed out",
    "connection refused",
    "connection reset",
    "connection aborted",
    "rate limit",
    "429",
    "temporary failure",
    "503",
    "gateway timeout",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnError {
    /// Fail the node (and the run)
    #[default]
    Stop,
    /// Swallow the error; the node outputs null
    Continue,
    /// Swallow the error; the node outputs `default_value`
    UseDefault,
    /// Retry with backoff, then fail with "max retries exceeded"
    Retry,
    /// Map the error to an output with a named transform
    Transform,
}

/// Per-node error handling, read from the node's `error_handling` setting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorHandlingConfig {
    pub on_error: OnError,
    /// Retry budget; falls back to the error category's default
    pub max_retries: Option<u32>,
    /// Base delay in milliseconds
    pub retry_delay: u64,
    pub backoff_type: BackoffType,
    pub backoff_multiplier: f64,
    /// Upper bound for a single delay in milliseconds
    pub max_delay: u64,
    /// Case-insensitive regexes; a matching error yields `default_value`
    pub ignore_errors: Vec<String>,
    /// Category to assume instead of the one the node reported
    pub error_category: Option<ErrorCategory>,
    pub default_value: Value,
    /// Transform name for `on_error: transform`
    pub transform: Option<String>,
}

impl Default for ErrorHandlingConfig {
    fn default() -> Self {
        Self {
            on_error: OnError::Stop,
            max_retries: None,
            retry_delay: 1000,
            backoff_type: BackoffType::Exponential,
            backoff_multiplier: 2.0,
            max_delay: 30_000,
            ignore_errors: Vec::new(),
            error_category: None,
            default_value: Value::Null,
            transform: None,
        }
    }
}

impl ErrorHandlingConfig {
    /// Read `error_handling` from node settings; absent means defaults
    pub fn from_node_settings(settings: &Value) -> Result<Self, serde_json::Error> {
        let config: Self = match settings.get("error_handling") {
            Some(raw) if !raw.is_null() => serde_json::from_value(raw.clone())?,
            _ => return Ok(Self::default()),
        };
        if !config.backoff_multiplier.is_finite() || config.backoff_multiplier < 0.0 {
            return Err(serde::de::Error::custom(format!(
                "backoff_multiplier must be a finite non-negative number, got {}",
                config.backoff_multiplier
            )));
        }
        Ok(config)
    }

    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            kind: self.backoff_type,
            base_ms: self.retry_delay,
            multiplier: self.backoff_multiplier,
            max_delay_ms: self.max_delay,
        }
    }
}

/// How a wrapped node call ended without failing the run
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOutcome {
    Completed { output: Value, attempts: u32 },
    Ignored { output: Value, error: NodeError },
    Continued { error: NodeError },
    Defaulted { output: Value, error: NodeError },
    Transformed { output: Value, error: NodeError },
}

impl NodeOutcome {
    pub fn into_output(self) -> Value {
        match self {
            NodeOutcome::Completed { output, .. }
            | NodeOutcome::Ignored { output, .. }
            | NodeOutcome::Defaulted { output, .. }
            | NodeOutcome::Transformed { output, .. } => output,
            NodeOutcome::Continued { .. } => Value::Null,
        }
    }

    /// The swallowed error, if the node did not succeed
    pub fn error(&self) -> Option<&NodeError> {
        match self {
            NodeOutcome::Completed { .. } => None,
            NodeOutcome::Ignored { error, .. }
            | NodeOutcome::Continued { error }
            | NodeOutcome::Defaulted { error, .. }
            | NodeOutcome::Transformed { error, .. } => Some(error),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("{source}")]
    Stopped { source: NodeError },
    #[error("non-retryable error: {source}")]
    NonRetryable { source: NodeError },
    #[error("max retries exceeded after {attempts} attempts: {source}")]
    MaxRetriesExceeded { attempts: u32, source: NodeError },
    #[error("unknown error transform '{name}': {source}")]
    UnknownTransform { name: String, source: NodeError },
}

impl HandlerError {
    /// The node error that caused this
    pub fn cause(&self) -> &NodeError {
        match self {
            HandlerError::Stopped { source }
            | HandlerError::NonRetryable { source }
            | HandlerError::MaxRetriesExceeded { source, .. }
            | HandlerError::UnknownTransform { source, .. } => source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationReason {
    NonRetryablePattern,
    RetryablePattern,
    CategoryDefault,
}

/// Retry decision for one error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub category: ErrorCategory,
    pub retryable: bool,
    /// Retry budget when the node config sets none
    pub default_max_retries: u32,
    pub reason: ClassificationReason,
}

/// One handled node failure kept for inspection
#[derive(Debug, Clone, Serialize)]
pub struct ErrorLogEntry {
    pub timestamp: DateTime<Utc>,
    pub node_id: String,
    pub category: ErrorCategory,
    pub message: String,
    /// 0-based attempt that produced the error
    pub attempt: u32,
}

pub type ErrorTransform = Arc<dyn Fn(&NodeError) -> Value + Send + Sync>;

/// Error handling component injected into the executor
///
/// Holds no state beyond the bounded in-memory log, the transform table and
/// the compiled message rules.
pub struct ErrorHandler {
    transforms: HashMap<String, ErrorTransform>,
    non_retryable: Vec<Regex>,
    retryable: Vec<Regex>,
    log: Mutex<VecDeque<ErrorLogEntry>>,
    log_capacity: usize,
}

impl std::fmt::Debug for ErrorHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.transforms.keys().collect();
        names.sort();
        f.debug_struct("ErrorHandler")
            .field("transforms", &names)
            .field("log_capacity", &self.log_capacity)
            .finish()
    }
}

impl Default for ErrorHandler {
    fn default() -> Self {
        Self::new(500)
    }
}

impl ErrorHandler {
    pub fn new(log_capacity: usize) -> Self {
        let mut handler = Self {
            transforms: HashMap::new(),
            non_retryable: compile_message_rules(NON_RETRYABLE_PATTERNS),
            retryable: compile_message_rules(RETRYABLE_PATTERNS),
            log: Mutex::new(VecDeque::new()),
            log_capacity,
        };
        handler.register_transform(DEFAULT_TRANSFORM, |err: &NodeError| {
            json!({ "error": { "message": err.message, "category": err.category } })
        });
        handler
    }

    /// Add or replace a named transform for `on_error: transform`
    pub fn register_transform<F>(&mut self, name: &str, transform: F)
    where
        F: Fn(&NodeError) -> Value + Send + Sync + 'static,
    {
        self.transforms.insert(name.to_string(), Arc::new(transform));
    }

    /// Decide whether an error is retryable.
    ///
    /// Message rules win over categories; non-retryable rules are checked first.
    pub fn classify(&self, error: &NodeError, configured: Option<ErrorCategory>) -> Classification {
        let category = configured.unwrap_or(error.category);
        let message = error.message.to_lowercase();

        if self.non_retryable.iter().any(|r| r.is_match(&message)) {
            return Classification {
                category,
                retryable: false,
                default_max_retries: 0,
                reason: ClassificationReason::NonRetryablePattern,
            };
        }

        if self.retryable.iter().any(|r| r.is_match(&message)) {
            let budget = if category.retryable_by_default() {
                category.default_max_retries()
            } else {
                ErrorCategory::Node.default_max_retries()
            };
            return Classification {
                category,
                retryable: true,
                default_max_retries: budget,
                reason: ClassificationReason::RetryablePattern,
            };
        }

        Classification {
            category,
            retryable: category.retryable_by_default(),
            default_max_retries: category.default_max_retries(),
            reason: ClassificationReason::CategoryDefault,
        }
    }

    /// Run a node call under `config`.
    ///
    /// `call` receives the 0-based attempt number. Backoff sleeps happen on the
    /// calling task between attempts.
    pub async fn run<F, Fut>(
        &self,
        node_id: &str,
        config: &ErrorHandlingConfig,
        mut call: F,
    ) -> Result<NodeOutcome, HandlerError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<Value, NodeError>>,
    {
        let ignore = compile_ignore_patterns(node_id, &config.ignore_errors);
        let backoff = config.backoff();
        let mut attempt: u32 = 0;

        loop {
            let error = match call(attempt).await {
                Ok(output) => {
                    if attempt > 0 {
                        tracing::info!("🩹 Node '{}' recovered after {} retries", node_id, attempt);
                    }
                    return Ok(NodeOutcome::Completed { output, attempts: attempt + 1 });
                }
                Err(error) => error,
            };

            self.record(node_id, &error, attempt);

            if ignore.iter().any(|re| re.is_match(&error.message)) {
                tracing::info!("🙈 Node '{}' error ignored by pattern: {}", node_id, error);
                return Ok(NodeOutcome::Ignored { output: config.default_value.clone(), error });
            }

            match config.on_error {
                OnError::Stop => return Err(HandlerError::Stopped { source: error }),
                OnError::Continue => {
                    tracing::warn!("⏭️ Node '{}' failed, continuing with null: {}", node_id, error);
                    return Ok(NodeOutcome::Continued { error });
                }
                OnError::UseDefault => {
                    tracing::warn!("⏭️ Node '{}' failed, using default value: {}", node_id, error);
                    return Ok(NodeOutcome::Defaulted { output: config.default_value.clone(), error });
                }
                OnError::Transform => {
                    let name = config.transform.as_deref().unwrap_or(DEFAULT_TRANSFORM);
                    return match self.transforms.get(name) {
                        Some(transform) => {
                            let output = transform(&error);
                            tracing::warn!("🔀 Node '{}' error transformed by '{}': {}", node_id, name, error);
                            Ok(NodeOutcome::Transformed { output, error })
                        }
                        None => Err(HandlerError::UnknownTransform { name: name.to_string(), source: error }),
                    };
                }
                OnError::Retry => {
                    let class = self.classify(&error, config.error_category);
                    if !class.retryable {
                        tracing::warn!(
                            "🛑 Node '{}' failed with non-retryable {} error ({:?}): {}",
                            node_id, class.category, class.reason, error
                        );
                        return Err(HandlerError::NonRetryable { source: error });
                    }

                    let max_retries = config.max_retries.unwrap_or(class.default_max_retries);
                    if attempt >= max_retries {
                        tracing::error!(
                            "❌ Node '{}' exhausted {} retries: {}",
                            node_id, max_retries, error
                        );
                        return Err(HandlerError::MaxRetriesExceeded { attempts: attempt + 1, source: error });
                    }

                    // ThreadRng is not Send; keep it out of the await below.
                    let delay = {
                        let mut rng = rand::thread_rng();
                        backoff.delay(attempt, &mut rng)
                    };
                    tracing::warn!(
                        "🔁 Node '{}' attempt {}/{} failed: {}. Retrying in {:?}",
                        node_id,
                        attempt + 1,
                        max_retries + 1,
                        error,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Most recent handled failures, newest last
    pub fn recent(&self, limit: usize) -> Vec<ErrorLogEntry> {
        match self.log.lock() {
            Ok(log) => {
                let skip = log.len().saturating_sub(limit);
                log.iter().skip(skip).cloned().collect()
            }
            Err(_) => Vec::new(),
        }
    }

    fn record(&self, node_id: &str, error: &NodeError, attempt: u32) {
        if self.log_capacity == 0 {
            return;
        }
        if let Ok(mut log) = self.log.lock() {
            while log.len() >= self.log_capacity {
                log.pop_front();
            }
            log.push_back(ErrorLogEntry {
                timestamp: Utc::now(),
                node_id: node_id.to_string(),
                category: error.category,
                message: error.message.clone(),
                attempt,
            });
        }
    }
}

fn compile_message_rules(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| match Regex::new(&format!(r"\b{}\b", regex::escape(p))) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::warn!("⚠️ Skipping message rule '{}': {}", p, e);
                None
            }
        })
        .collect()
}

fn compile_ignore_patterns(node_id: &str, patterns: &[String]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| match RegexBuilder::new(p).case_insensitive(true).build() {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::warn!("⚠️ Node '{}' has invalid ignore_errors pattern '{}': {}", node_id, p, e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn retry_config(max_retries: u32) -> ErrorHandlingConfig {
        ErrorHandlingConfig {
            on_error: OnError::Retry,
            max_retries: Some(max_retries),
            retry_delay: 1,
            max_delay: 5,
            ..ErrorHandlingConfig::default()
        }
    }

    #[tokio::test]
    async fn retry_exhaustion_calls_max_plus_one_times() {
        let handler = ErrorHandler::default();
        let calls = AtomicU32::new(0);

        let result = handler
            .run("flaky", &retry_config(2), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(NodeError::connection("connection reset by peer")) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let err = result.unwrap_err();
        assert!(err.to_string().contains("max retries exceeded"));
        assert!(matches!(err, HandlerError::MaxRetriesExceeded { attempts: 3, .. }));
        assert_eq!(err.cause().message, "connection reset by peer");
    }

    #[tokio::test]
    async fn invalid_api_key_is_never_retried() {
        let handler = ErrorHandler::default();
        let calls = AtomicU32::new(0);

        let result = handler
            .run("auth", &retry_config(10), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                // Category says retryable; the message rule wins.
                async { Err(NodeError::node("Upstream said: Invalid API Key")) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(HandlerError::NonRetryable { .. })));
    }

    #[tokio::test]
    async fn recovers_after_transient_failures() {
        let handler = ErrorHandler::default();
        let calls = AtomicU32::new(0);

        let outcome = handler
            .run("eventually", &retry_config(3), |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 2 {
                        Err(NodeError::timeout("request timed out"))
                    } else {
                        Ok(json!({ "ok": true }))
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(outcome, NodeOutcome::Completed { output: json!({ "ok": true }), attempts: 3 });
        assert_eq!(handler.recent(10).len(), 2);
    }

    #[tokio::test]
    async fn category_default_applies_without_pattern() {
        let handler = ErrorHandler::default();
        let calls = AtomicU32::new(0);
        let config = ErrorHandlingConfig { max_retries: None, ..retry_config(0) };

        let result = handler
            .run("validate", &config, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(NodeError::validation("field 'email' missing")) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(HandlerError::NonRetryable { .. })));
    }

    #[tokio::test]
    async fn ignore_patterns_short_circuit_to_default() {
        let handler = ErrorHandler::default();
        let config = ErrorHandlingConfig {
            ignore_errors: vec!["^not found".into(), "(".into()],
            default_value: json!([]),
            ..retry_config(5)
        };

        let outcome = handler
            .run("lookup", &config, |_| async { Err(NodeError::data("Not Found: customer 9")) })
            .await
            .unwrap();

        assert!(matches!(outcome, NodeOutcome::Ignored { .. }));
        assert_eq!(outcome.into_output(), json!([]));
    }

    #[tokio::test]
    async fn non_retry_strategies() {
        let handler = ErrorHandler::default();
        let fail = |_| async { Err(NodeError::node("boom")) };

        let stop = ErrorHandlingConfig::default();
        assert!(matches!(handler.run("n", &stop, fail).await, Err(HandlerError::Stopped { .. })));

        let cont = ErrorHandlingConfig { on_error: OnError::Continue, ..Default::default() };
        assert_eq!(handler.run("n", &cont, fail).await.unwrap().into_output(), Value::Null);

        let default = ErrorHandlingConfig {
            on_error: OnError::UseDefault,
            default_value: json!({ "status": "unknown" }),
            ..Default::default()
        };
        assert_eq!(
            handler.run("n", &default, fail).await.unwrap().into_output(),
            json!({ "status": "unknown" })
        );

        let transform = ErrorHandlingConfig { on_error: OnError::Transform, ..Default::default() };
        assert_eq!(
            handler.run("n", &transform, fail).await.unwrap().into_output(),
            json!({ "error": { "message": "boom", "category": "node" } })
        );

        let missing = ErrorHandlingConfig {
            on_error: OnError::Transform,
            transform: Some("nope".into()),
            ..Default::default()
        };
        assert!(matches!(
            handler.run("n", &missing, fail).await,
            Err(HandlerError::UnknownTransform { .. })
        ));
    }

    #[tokio::test]
    async fn custom_transform_is_used() {
        let mut handler = ErrorHandler::default();
        handler.register_transform("to_message", |err: &NodeError| json!(err.message));
        let config = ErrorHandlingConfig {
            on_error: OnError::Transform,
            transform: Some("to_message".into()),
            ..Default::default()
        };

        let out = handler
            .run("n", &config, |_| async { Err(NodeError::node("nope")) })
            .await
            .unwrap()
            .into_output();
        assert_eq!(out, json!("nope"));
    }

    #[test]
    fn classification_rules() {
        let handler = ErrorHandler::default();

        let c = handler.classify(&NodeError::validation("gateway timeout from proxy"), None);
        assert!(c.retryable);
        assert_eq!(c.reason, ClassificationReason::RetryablePattern);
        assert_eq!(c.default_max_retries, 3);

        let c = handler.classify(&NodeError::connection("permission denied for relation"), None);
        assert!(!c.retryable);
        assert_eq!(c.reason, ClassificationReason::NonRetryablePattern);

        let c = handler.classify(&NodeError::node("weird"), Some(ErrorCategory::Data));
        assert_eq!(c.category, ErrorCategory::Data);
        assert!(!c.retryable);
    }

    #[test]
    fn status_codes_match_only_as_whole_words() {
        let handler = ErrorHandler::default();

        for message in ["order 14290 rejected", "sku 5031 out of stock", "invoice 4295030"] {
            let c = handler.classify(&NodeError::data(message), None);
            assert!(!c.retryable, "{} should not be retryable", message);
            assert_eq!(c.reason, ClassificationReason::CategoryDefault);
        }

        for message in ["upstream answered 429", "status 503: unavailable"] {
            let c = handler.classify(&NodeError::data(message), None);
            assert!(c.retryable, "{} should be retryable", message);
            assert_eq!(c.reason, ClassificationReason::RetryablePattern);
        }
    }

    #[test]
    fn log_is_bounded() {
        let handler = ErrorHandler::new(2);
        for i in 0..5 {
            handler.record("n", &NodeError::node(format!("e{}", i)), 0);
        }
        let messages: Vec<String> = handler.recent(10).into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["e3", "e4"]);
    }

    #[test]
    fn config_parses_from_node_settings() {
        let settings = json!({
            "url": "https://example.com",
            "error_handling": {
                "on_error": "retry",
                "max_retries": 4,
                "backoff_type": "fibonacci",
                "ignore_errors": ["404"]
            }
        });
        let config = ErrorHandlingConfig::from_node_settings(&settings).unwrap();
        assert_eq!(config.on_error, OnError::Retry);
        assert_eq!(config.max_retries, Some(4));
        assert_eq!(config.backoff_type, BackoffType::Fibonacci);
        assert_eq!(config.retry_delay, 1000);

        let negative = json!({ "error_handling": { "backoff_multiplier": -2.0 } });
        assert!(ErrorHandlingConfig::from_node_settings(&negative).is_err());

        let defaults = ErrorHandlingConfig::from_node_settings(&json!({})).unwrap();
        assert_eq!(defaults, ErrorHandlingConfig::default());
    }
}
