/// HTTP client node for external API calls
///
/// Settings: `url`, `method` (default GET), `headers`, `body`, `send_input`
/// (send the previous output as the JSON body), `timeout_ms` (default 30000),
/// `integration_id` (bearer token and extra headers from an integration).
///
/// Transport and status failures become typed errors so the error handler can
/// tell a refused connection from a bad API key.

use crate::nodes::{require_str, ErrorCategory, NodeContext, NodeError, NodeHandler, SettingsError};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Map, Value};
use std::time::Duration;

const DEFAULT_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone)]
pub struct HttpRequestNode {
    client: Client,
}

impl Default for HttpRequestNode {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpRequestNode {
    pub fn new() -> Self {
        Self { client: Client::new() }
    }

    fn parse_method(raw: &str) -> Result<Method, NodeError> {
        Method::from_bytes(raw.to_uppercase().as_bytes())
            .map_err(|_| NodeError::validation(format!("invalid config: unsupported method '{}'", raw)))
    }

    fn apply_integration(
        mut request: reqwest::RequestBuilder,
        integration: &Map<String, Value>,
    ) -> reqwest::RequestBuilder {
        if let Some(token) = integration
            .get("bearer_token")
            .or_else(|| integration.get("token"))
            .and_then(Value::as_str)
        {
            request = request.bearer_auth(token);
        }
        if let Some(Value::Object(headers)) = integration.get("headers") {
            for (name, value) in headers {
                if let Some(v) = value.as_str() {
                    request = request.header(name.as_str(), v);
                }
            }
        }
        request
    }
}

/// Classify a transport failure
fn transport_error(err: reqwest::Error) -> NodeError {
    if err.is_timeout() {
        NodeError::timeout(format!("request timeout: {}", err))
    } else if err.is_connect() {
        NodeError::connection(format!("connection refused: {}", err))
    } else if err.is_builder() {
        NodeError::validation(format!("invalid config: {}", err))
    } else {
        NodeError::connection(format!("request failed: {}", err))
    }
}

/// Classify a non-success response status
pub(crate) fn status_error(status: StatusCode, body: &str) -> NodeError {
    let snippet: String = body.chars().take(200).collect();
    let code = status.as_u16();
    match status {
        StatusCode::TOO_MANY_REQUESTS => {
            NodeError::new(ErrorCategory::RateLimit, format!("rate limit exceeded ({}): {}", code, snippet))
        }
        StatusCode::UNAUTHORIZED => {
            NodeError::authentication(format!("auth failed ({}): {}", code, snippet))
        }
        StatusCode::FORBIDDEN => {
            NodeError::new(ErrorCategory::Permission, format!("permission denied ({}): {}", code, snippet))
        }
        // Category stays `node`; the message decides retryability
        StatusCode::BAD_REQUEST => NodeError::node(format!("malformed request ({}): {}", code, snippet)),
        StatusCode::GATEWAY_TIMEOUT => NodeError::node(format!("gateway timeout ({}): {}", code, snippet)),
        s if s.is_server_error() => NodeError::node(format!("server error {}: {}", code, snippet)),
        _ => NodeError::node(format!("request rejected with status {}: {}", code, snippet)),
    }
}

#[async_trait]
impl NodeHandler for HttpRequestNode {
    fn node_type(&self) -> &'static str {
        "http_request"
    }

    fn settings_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["url"],
            "properties": {
                "url": { "type": "string" },
                "method": { "type": "string", "default": "GET" },
                "headers": { "type": "object" },
                "body": {},
                "send_input": { "type": "boolean", "default": false },
                "timeout_ms": { "type": "integer", "default": DEFAULT_TIMEOUT_MS },
                "integration_id": { "type": "string" }
            }
        })
    }

    fn validate_settings(&self, settings: &Value) -> Result<(), SettingsError> {
        let mut errors = SettingsError::default();
        if let Some(url) = require_str(settings, "url", &mut errors) {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                errors.push("url", "must be an http(s) URL");
            }
        }
        if let Some(method) = settings.get("method") {
            match method.as_str() {
                Some(m) if Self::parse_method(m).is_ok() => {}
                _ => errors.push("method", "must be an HTTP method"),
            }
        }
        if let Some(headers) = settings.get("headers") {
            if !headers.is_object() {
                errors.push("headers", "must be an object");
            }
        }
        errors.into_result()
    }

    async fn execute(&self, ctx: &NodeContext<'_>, previous_output: Value) -> Result<Value, NodeError> {
        let settings = ctx.settings();
        let url = settings
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::validation("invalid config: http_request missing 'url'"))?;
        let method = Self::parse_method(settings.get("method").and_then(Value::as_str).unwrap_or("GET"))?;
        let timeout_ms = settings.get("timeout_ms").and_then(Value::as_u64).unwrap_or(DEFAULT_TIMEOUT_MS);

        tracing::debug!("🌍 HTTP Request: {} {}", method, url);

        let mut request = self
            .client
            .request(method.clone(), url)
            .timeout(Duration::from_millis(timeout_ms));

        if let Some(Value::Object(headers)) = settings.get("headers") {
            for (name, value) in headers {
                if let Some(v) = value.as_str() {
                    request = request.header(name.as_str(), v);
                }
            }
        }

        if let Some(integration) = ctx.integration {
            request = Self::apply_integration(request, integration);
        }

        let send_input = settings.get("send_input").and_then(Value::as_bool).unwrap_or(false);
        if send_input {
            request = request.json(&previous_output);
        } else if let Some(body) = settings.get("body") {
            request = request.json(body);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();

        let mut response_headers = Map::new();
        for (name, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                response_headers.insert(name.as_str().to_string(), Value::String(v.to_string()));
            }
        }

        let text = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            return Err(status_error(status, &text));
        }

        let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

        tracing::info!("✅ HTTP request completed: {} {} (status: {})", method, url, status);

        Ok(json!({
            "status": status.as_u16(),
            "headers": response_headers,
            "body": body,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_errors_carry_classifiable_messages() {
        let err = status_error(StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert_eq!(err.category, ErrorCategory::RateLimit);
        assert!(err.message.contains("429"));

        let err = status_error(StatusCode::UNAUTHORIZED, "");
        assert_eq!(err.category, ErrorCategory::Authentication);
        assert!(err.message.starts_with("auth failed"));

        let err = status_error(StatusCode::SERVICE_UNAVAILABLE, "");
        assert_eq!(err.category, ErrorCategory::Node);
        assert!(err.message.contains("503"));
    }

    #[test]
    fn other_client_and_gateway_statuses_are_node_errors() {
        for status in [StatusCode::BAD_REQUEST, StatusCode::NOT_FOUND, StatusCode::GATEWAY_TIMEOUT] {
            assert_eq!(status_error(status, "").category, ErrorCategory::Node, "{}", status);
        }

        let handler = crate::runtime::ErrorHandler::default();
        let bad_request = handler.classify(&status_error(StatusCode::BAD_REQUEST, ""), None);
        assert!(!bad_request.retryable);
        let gateway = handler.classify(&status_error(StatusCode::GATEWAY_TIMEOUT, ""), None);
        assert!(gateway.retryable);
    }

    #[test]
    fn validation_checks_url_and_method() {
        let node = HttpRequestNode::new();
        assert!(node
            .validate_settings(&json!({ "url": "https://example.com", "method": "post" }))
            .is_ok());

        let err = node
            .validate_settings(&json!({ "url": "ftp://example.com", "method": "NOT A METHOD" }))
            .unwrap_err();
        let fields: Vec<&str> = err.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["url", "method"]);
    }

    #[tokio::test]
    async fn refused_connection_is_a_connection_error() {
        use crate::execution::ExecutionContext;
        use crate::workflow::types::Node;

        // Port 9 (discard) on localhost is closed in test environments.
        let node = Node {
            id: "call".into(),
            node_type: "http_request".into(),
            settings: json!({ "url": "http://127.0.0.1:9/", "timeout_ms": 2000 }),
            position: None,
        };
        let exec = ExecutionContext::from_trigger("wf", "ex", Value::Null, &Map::new());
        let ctx = NodeContext { node: &node, execution: &exec, integration: None };

        let err = HttpRequestNode::new().execute(&ctx, Value::Null).await.unwrap_err();
        assert!(matches!(err.category, ErrorCategory::Connection | ErrorCategory::Timeout));
    }
}
