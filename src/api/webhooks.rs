/// Webhook gateway
///
/// Two route families, both resolved purely by an opaque key:
/// - `/{base}/{key}`: any method; JSON, form, XML or raw body. Every active
///   workflow bound to the key gets one execution, run before responding.
/// - `/{signed_base}/{key}`: POST with `base64(HMAC-SHA256(raw body, secret))`
///   in the signature header. The first bound workflow whose secret verifies is
///   the single target; its event batch becomes one execution per event.
///
/// Signature checks go through `Mac::verify_slice`, which compares in constant
/// time.

use crate::api::{client_ip::resolve_client_ip, AppState};
use crate::config::WebhookConfig;
use crate::execution::TriggerType;
use crate::runtime::WebhookRunResult;
use crate::workflow::registry::{SecretSource, WebhookBinding};
use crate::workflow::DocPath;
use axum::{
    body::Bytes,
    extract::{ConnectInfo, Path, Request, State},
    http::{header::CONTENT_TYPE, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{any, post},
    Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Serialize;
use serde_json::{json, Map, Value};
use sha2::Sha256;
use std::collections::HashSet;
use std::net::SocketAddr;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("no active workflow listens on webhook key '{0}'")]
    UnknownKey(String),
    #[error("missing signature header '{0}'")]
    MissingSignature(String),
    #[error("signature does not match any workflow for key '{0}'")]
    InvalidSignature(String),
    #[error("invalid {kind} body: {message}")]
    InvalidBody { kind: &'static str, message: String },
    #[error("request body could not be read: {0}")]
    Unreadable(String),
    #[error("failed to start execution: {0}")]
    Internal(#[from] anyhow::Error),
}

impl WebhookError {
    fn status(&self) -> StatusCode {
        match self {
            WebhookError::UnknownKey(_) => StatusCode::NOT_FOUND,
            WebhookError::MissingSignature(_)
            | WebhookError::InvalidBody { .. }
            | WebhookError::Unreadable(_) => StatusCode::BAD_REQUEST,
            WebhookError::InvalidSignature(_) => StatusCode::FORBIDDEN,
            WebhookError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("❌ Webhook request failed: {}", self);
        } else {
            tracing::warn!("🚫 Webhook request rejected ({}): {}", status.as_u16(), self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// One execution started by a webhook request
#[derive(Debug, Clone, Serialize)]
pub struct WebhookExecution {
    pub workflow_id: String,
    pub execution_id: String,
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub success: bool,
    pub executions: Vec<WebhookExecution>,
}

impl WebhookResponse {
    fn from_runs(runs: Vec<WebhookExecution>) -> Self {
        Self { success: runs.iter().all(|r| r.success), executions: runs }
    }
}

pub fn create_webhook_routes(config: &WebhookConfig) -> Router<AppState> {
    let generic = format!("/{}/{{key}}", config.base_path.trim_matches('/'));
    let signed = format!("/{}/{{key}}", config.signed_base_path.trim_matches('/'));
    tracing::info!("🔗 Webhook routes: {} (generic), {} (signed)", generic, signed);

    Router::new()
        .route(&generic, any(generic_webhook))
        .route(&signed, post(signed_webhook))
}

/// Request fields shared by both gateway families
struct Inbound {
    method: Method,
    headers: HeaderMap,
    query: Map<String, Value>,
    ip_address: Option<String>,
    body: Bytes,
}

impl Inbound {
    async fn read(request: Request, limit: usize) -> Result<Self, WebhookError> {
        let remote = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let (parts, body) = request.into_parts();

        let query = match parts.uri.query() {
            Some(q) => serde_urlencoded::from_str::<Vec<(String, String)>>(q)
                .map(pairs_to_map)
                .map_err(|e| WebhookError::InvalidBody { kind: "query", message: e.to_string() })?,
            None => Map::new(),
        };
        let body = axum::body::to_bytes(body, limit)
            .await
            .map_err(|e| WebhookError::Unreadable(e.to_string()))?;

        Ok(Self {
            ip_address: resolve_client_ip(&parts.headers, remote),
            method: parts.method,
            headers: parts.headers,
            query,
            body,
        })
    }

    fn content_type(&self) -> &str {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }

    /// Trigger payload for one execution
    fn payload(&self, binding: &WebhookBinding, body: Value) -> Value {
        json!({
            "method": self.method.as_str(),
            "headers": headers_to_map(&self.headers),
            "body": body,
            "raw_body": String::from_utf8_lossy(&self.body),
            "query_params": self.query,
            "timestamp": Utc::now().to_rfc3339(),
            "ip_address": self.ip_address,
            "node_id": binding.node_id,
            "webhook_key": binding.key,
        })
    }
}

/// ANY /{base}/{key}
async fn generic_webhook(
    State(state): State<AppState>,
    Path(key): Path<String>,
    request: Request,
) -> Result<Json<WebhookResponse>, WebhookError> {
    let bindings = first_binding_per_workflow(state.registry.find_by_webhook_key(&key, false));
    if bindings.is_empty() {
        return Err(WebhookError::UnknownKey(key));
    }

    let inbound = Inbound::read(request, state.webhooks.body_limit_bytes).await?;
    let body = parse_body(inbound.content_type(), &inbound.body)?;
    tracing::info!(
        "📥 Webhook '{}' ({} {}) matched {} workflows",
        key,
        inbound.method,
        inbound.content_type(),
        bindings.len()
    );

    let mut runs = Vec::with_capacity(bindings.len());
    for binding in &bindings {
        let payload = inbound.payload(binding, body.clone());
        let result = state
            .executor
            .execute_webhook(&binding.workflow_id, payload, TriggerType::Webhook)
            .await?;
        runs.push(run_entry(binding, result));
    }

    Ok(Json(WebhookResponse::from_runs(runs)))
}

/// POST /{signed_base}/{key}
async fn signed_webhook(
    State(state): State<AppState>,
    Path(key): Path<String>,
    request: Request,
) -> Result<Json<WebhookResponse>, WebhookError> {
    let bindings = state.registry.find_by_webhook_key(&key, true);
    if bindings.is_empty() {
        return Err(WebhookError::UnknownKey(key));
    }

    let header = state.webhooks.signature_header.as_str();
    let inbound = Inbound::read(request, state.webhooks.body_limit_bytes).await?;
    let signature = inbound
        .headers
        .get(header)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| WebhookError::MissingSignature(header.to_string()))?;
    let Ok(signature) = BASE64.decode(signature.trim()) else {
        return Err(WebhookError::InvalidSignature(key));
    };

    let mut accepted = None;
    for binding in &bindings {
        let Some(secret) = resolve_secret(&state, binding).await else {
            continue;
        };
        if verify_signature(secret.as_bytes(), &inbound.body, &signature) {
            accepted = Some(binding);
            break;
        }
    }
    let binding = accepted.ok_or_else(|| WebhookError::InvalidSignature(key.clone()))?;

    let body: Value = serde_json::from_slice(&inbound.body)
        .map_err(|e| WebhookError::InvalidBody { kind: "json", message: e.to_string() })?;
    let events = split_events(&body, &binding.events_path);
    tracing::info!(
        "🔏 Signed webhook '{}' verified for workflow {} ({} events)",
        key,
        binding.workflow_id,
        events.len()
    );

    let batch_size = events.len();
    let mut runs = Vec::with_capacity(batch_size);
    for (index, event) in events.into_iter().enumerate() {
        let mut payload = inbound.payload(binding, event);
        payload["batch"] = json!({ "index": index, "size": batch_size });
        let result = state
            .executor
            .execute_webhook(&binding.workflow_id, payload, TriggerType::Webhook)
            .await?;
        runs.push(run_entry(binding, result));
    }

    Ok(Json(WebhookResponse::from_runs(runs)))
}

fn run_entry(binding: &WebhookBinding, result: WebhookRunResult) -> WebhookExecution {
    WebhookExecution {
        workflow_id: binding.workflow_id.clone(),
        execution_id: result.execution_id,
        success: result.success,
    }
}

/// A workflow with several triggers on one key still runs once
fn first_binding_per_workflow(bindings: Vec<WebhookBinding>) -> Vec<WebhookBinding> {
    let mut seen = HashSet::new();
    bindings
        .into_iter()
        .filter(|b| seen.insert(b.workflow_id.clone()))
        .collect()
}

async fn resolve_secret(state: &AppState, binding: &WebhookBinding) -> Option<String> {
    match binding.secret.as_ref()? {
        SecretSource::Inline(secret) => Some(secret.clone()),
        SecretSource::Integration(id) => {
            let integration = match state.integrations.get(id).await {
                Ok(Some(integration)) if integration.is_active => integration,
                Ok(Some(_)) => {
                    tracing::warn!("⚠️ Integration {} for webhook '{}' is inactive", id, binding.key);
                    return None;
                }
                Ok(None) => {
                    tracing::warn!("⚠️ Integration {} for webhook '{}' not found", id, binding.key);
                    return None;
                }
                Err(e) => {
                    tracing::error!("❌ Integration lookup {} failed: {}", id, e);
                    return None;
                }
            };
            match state.integrations.decrypt_settings(&integration.settings) {
                Ok(settings) => settings.get("secret").and_then(Value::as_str).map(str::to_string),
                Err(e) => {
                    tracing::error!("❌ Integration {} settings unreadable: {}", id, e);
                    None
                }
            }
        }
    }
}

/// `base64(HMAC-SHA256(body, secret))`
pub fn sign_payload(secret: &[u8], body: &[u8]) -> Result<String, hmac::digest::InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(secret)?;
    mac.update(body);
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a decoded signature
pub fn verify_signature(secret: &[u8], body: &[u8], signature: &[u8]) -> bool {
    match HmacSha256::new_from_slice(secret) {
        Ok(mut mac) => {
            mac.update(body);
            mac.verify_slice(signature).is_ok()
        }
        Err(_) => false,
    }
}

/// Events at `events_path`; a body without that array is a single event
fn split_events(body: &Value, events_path: &str) -> Vec<Value> {
    let found = events_path
        .parse::<DocPath>()
        .ok()
        .and_then(|path| path.get(body).ok().cloned());
    match found {
        Some(Value::Array(events)) => events,
        _ => vec![body.clone()],
    }
}

fn pairs_to_map(pairs: Vec<(String, String)>) -> Map<String, Value> {
    pairs.into_iter().map(|(k, v)| (k, Value::String(v))).collect()
}

fn headers_to_map(headers: &HeaderMap) -> Map<String, Value> {
    let mut map = Map::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        match map.get_mut(name.as_str()) {
            Some(Value::String(existing)) => {
                existing.push_str(", ");
                existing.push_str(&value);
            }
            _ => {
                map.insert(name.as_str().to_string(), Value::String(value));
            }
        }
    }
    map
}

/// Decode a request body by its Content-Type
pub fn parse_body(content_type: &str, raw: &[u8]) -> Result<Value, WebhookError> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    if raw.is_empty() {
        return Ok(Value::Null);
    }

    if mime == "application/json" || mime.ends_with("+json") {
        serde_json::from_slice(raw).map_err(|e| WebhookError::InvalidBody { kind: "json", message: e.to_string() })
    } else if mime == "application/x-www-form-urlencoded" {
        serde_urlencoded::from_bytes::<Vec<(String, String)>>(raw)
            .map(|pairs| Value::Object(pairs_to_map(pairs)))
            .map_err(|e| WebhookError::InvalidBody { kind: "form", message: e.to_string() })
    } else if mime == "application/xml" || mime == "text/xml" || mime.ends_with("+xml") {
        xml_to_value(raw).map_err(|e| WebhookError::InvalidBody { kind: "xml", message: e.to_string() })
    } else {
        Ok(Value::String(String::from_utf8_lossy(raw).into_owned()))
    }
}

/// XML → JSON: attributes become `@name` keys, mixed text becomes `#text`,
/// repeated child elements become arrays.
pub fn xml_to_value(raw: &[u8]) -> anyhow::Result<Value> {
    struct Element {
        name: String,
        fields: Map<String, Value>,
        text: String,
    }

    fn open(start: &BytesStart<'_>) -> anyhow::Result<Element> {
        let mut fields = Map::new();
        for attr in start.attributes() {
            let attr = attr?;
            let key = format!("@{}", String::from_utf8_lossy(attr.key.as_ref()));
            fields.insert(key, Value::String(attr.unescape_value()?.into_owned()));
        }
        Ok(Element {
            name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            fields,
            text: String::new(),
        })
    }

    fn close(element: Element) -> (String, Value) {
        let Element { name, mut fields, text } = element;
        let value = if fields.is_empty() {
            Value::String(text)
        } else {
            if !text.is_empty() {
                fields.insert("#text".into(), Value::String(text));
            }
            Value::Object(fields)
        };
        (name, value)
    }

    fn attach(target: &mut Map<String, Value>, name: String, value: Value) {
        match target.get_mut(&name) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                target.insert(name, value);
            }
        }
    }

    let mut reader = Reader::from_reader(raw);
    reader.config_mut().trim_text(true);

    let mut root = Map::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(start) => stack.push(open(&start)?),
            Event::Empty(start) => {
                let (name, value) = close(open(&start)?);
                match stack.last_mut() {
                    Some(parent) => attach(&mut parent.fields, name, value),
                    None => attach(&mut root, name, value),
                }
            }
            Event::Text(text) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text.unescape()?);
                }
            }
            Event::CData(data) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| anyhow::anyhow!("closing tag without opening tag"))?;
                let (name, value) = close(element);
                match stack.last_mut() {
                    Some(parent) => attach(&mut parent.fields, name, value),
                    None => attach(&mut root, name, value),
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if let Some(open) = stack.last() {
        anyhow::bail!("unclosed element <{}>", open.name);
    }
    Ok(Value::Object(root))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{create_router, test_support};
    use crate::execution::ExecutionStatus;
    use crate::integration::Integration;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use tower::ServiceExt;

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn generic_workflow(id: &str, key: &str) -> Value {
        json!({
            "id": id, "name": id,
            "nodes": [
                { "id": "hook", "type": "webhook_trigger", "settings": { "webhook_key": key } },
                { "id": "shape", "type": "set", "settings": {
                    "keep_input": false,
                    "values": { "amount": { "$ref": "trigger.body.amount" } }
                } }
            ],
            "edges": [ { "from": "hook", "to": "shape" } ]
        })
    }

    fn signed_workflow(id: &str, key: &str, secret: &str) -> Value {
        json!({
            "id": id, "name": id,
            "nodes": [
                { "id": "hook", "type": "signed_webhook_trigger",
                  "settings": { "webhook_key": key, "secret": secret } }
            ]
        })
    }

    #[tokio::test]
    async fn generic_webhook_runs_every_matching_workflow() {
        let state = test_support::state().await;
        test_support::save_active(&state, generic_workflow("a", "orders")).await;
        test_support::save_active(&state, generic_workflow("b", "orders")).await;
        let executor = state.executor.clone();

        let response = create_router(state)
            .oneshot(
                HttpRequest::post("/webhook/orders?source=shop")
                    .header("content-type", "application/json")
                    .header("x-forwarded-for", "10.0.0.1, 8.8.8.8")
                    .body(Body::from(r#"{"amount":42}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["success"], json!(true));
        let runs = body["executions"].as_array().unwrap();
        assert_eq!(runs.len(), 2);

        let id = runs[0]["execution_id"].as_str().unwrap();
        let execution = executor.executions().get(id).await.unwrap().unwrap();
        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(execution.trigger_type, TriggerType::Webhook);
        assert_eq!(execution.trigger_data["method"], json!("POST"));
        assert_eq!(execution.trigger_data["query_params"]["source"], json!("shop"));
        assert_eq!(execution.trigger_data["ip_address"], json!("8.8.8.8"));
        assert_eq!(execution.trigger_data["raw_body"], json!(r#"{"amount":42}"#));
        assert_eq!(
            execution.execution_data.as_ref().unwrap()["node_outputs"]["shape"],
            json!({ "amount": 42 })
        );
    }

    #[tokio::test]
    async fn unknown_or_inactive_key_is_404() {
        let state = test_support::state().await;
        let mut draft: crate::workflow::Workflow =
            serde_json::from_value(generic_workflow("draft", "quiet")).unwrap();
        draft.status = crate::workflow::WorkflowStatus::Draft;
        state.registry.save_workflow(draft).await.unwrap();

        let app = create_router(state);
        for uri in ["/webhook/nothing-here", "/webhook/quiet"] {
            let response = app
                .clone()
                .oneshot(HttpRequest::post(uri).body(Body::from("hi")).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }
    }

    #[tokio::test]
    async fn malformed_json_is_400() {
        let state = test_support::state().await;
        test_support::save_active(&state, generic_workflow("a", "orders")).await;

        let response = create_router(state)
            .oneshot(
                HttpRequest::post("/webhook/orders")
                    .header("content-type", "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn signed_webhook_accepts_first_valid_secret_and_splits_events() {
        let state = test_support::state().await;
        test_support::save_active(&state, signed_workflow("alpha", "line", "alpha-secret")).await;
        test_support::save_active(&state, signed_workflow("beta", "line", "beta-secret")).await;
        let executor = state.executor.clone();

        let body = r#"{"destination":"U1","events":[{"type":"message"},{"type":"follow"}]}"#;
        let signature = sign_payload(b"beta-secret", body.as_bytes()).unwrap();

        let response = create_router(state)
            .oneshot(
                HttpRequest::post("/webhook-signed/line")
                    .header("content-type", "application/json")
                    .header("x-signature", signature)
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        let runs = body["executions"].as_array().unwrap();
        assert_eq!(runs.len(), 2);
        assert!(runs.iter().all(|r| r["workflow_id"] == json!("beta")));

        let second = executor
            .executions()
            .get(runs[1]["execution_id"].as_str().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.trigger_data["body"], json!({ "type": "follow" }));
        assert_eq!(second.trigger_data["batch"], json!({ "index": 1, "size": 2 }));
    }

    #[tokio::test]
    async fn signed_webhook_secret_from_integration() {
        let state = test_support::state().await;
        state
            .integrations
            .save(&Integration {
                id: "line-channel".into(),
                name: "LINE".into(),
                integration_type: "line".into(),
                settings: json!({ "secret": "from-vault" }).to_string(),
                is_active: true,
                updated_at: None,
            })
            .await
            .unwrap();
        test_support::save_active(
            &state,
            json!({
                "id": "vaulted", "name": "vaulted",
                "nodes": [ { "id": "hook", "type": "signed_webhook_trigger",
                             "settings": { "webhook_key": "v", "integration_id": "line-channel" } } ]
            }),
        )
        .await;

        let body = r#"{"events":[]}"#;
        let signature = sign_payload(b"from-vault", body.as_bytes()).unwrap();
        let response = create_router(state)
            .oneshot(
                HttpRequest::post("/webhook-signed/v")
                    .header("x-signature", signature)
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["executions"], json!([]));
    }

    #[tokio::test]
    async fn signed_webhook_rejects_bad_or_missing_signature() {
        let state = test_support::state().await;
        test_support::save_active(&state, signed_workflow("alpha", "line", "alpha-secret")).await;
        let app = create_router(state);
        let body = r#"{"events":[]}"#;

        let forged = sign_payload(b"wrong", body.as_bytes()).unwrap();
        let response = app
            .clone()
            .oneshot(
                HttpRequest::post("/webhook-signed/line")
                    .header("x-signature", forged)
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .oneshot(HttpRequest::post("/webhook-signed/line").body(Body::from(body)).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn signatures_are_deterministic_and_byte_sensitive() {
        let body = br#"{"a":1}"#;
        let first = sign_payload(b"s", body).unwrap();
        assert_eq!(first, sign_payload(b"s", body).unwrap());

        let decoded = BASE64.decode(&first).unwrap();
        assert!(verify_signature(b"s", body, &decoded));
        assert!(!verify_signature(b"s", br#"{"a":2}"#, &decoded));
        assert!(!verify_signature(b"t", body, &decoded));
    }

    #[test]
    fn bodies_parse_by_content_type() {
        assert_eq!(parse_body("application/json; charset=utf-8", br#"{"x":1}"#).unwrap(), json!({ "x": 1 }));
        assert_eq!(
            parse_body("application/x-www-form-urlencoded", b"name=Ada&lang=en%20GB").unwrap(),
            json!({ "name": "Ada", "lang": "en GB" })
        );
        assert_eq!(parse_body("text/plain", b"hello").unwrap(), json!("hello"));
        assert_eq!(parse_body("application/json", b"").unwrap(), Value::Null);
        assert!(matches!(
            parse_body("application/json", b"{"),
            Err(WebhookError::InvalidBody { kind: "json", .. })
        ));
    }

    #[test]
    fn xml_becomes_nested_json() {
        let xml = br#"<order id="7"><item sku="a">Pen</item><item sku="b">Ink</item><note/></order>"#;
        let value = parse_body("application/xml", xml).unwrap();
        assert_eq!(
            value,
            json!({
                "order": {
                    "@id": "7",
                    "item": [
                        { "@sku": "a", "#text": "Pen" },
                        { "@sku": "b", "#text": "Ink" }
                    ],
                    "note": ""
                }
            })
        );
        assert!(parse_body("text/xml", b"<open>").is_err());
    }

    #[test]
    fn events_fall_back_to_whole_body() {
        let body = json!({ "data": { "items": [1, 2] }, "events": "nope" });
        assert_eq!(split_events(&body, "data.items"), vec![json!(1), json!(2)]);
        assert_eq!(split_events(&body, "events"), vec![body.clone()]);
        assert_eq!(split_events(&body, "missing"), vec![body.clone()]);
    }
}
