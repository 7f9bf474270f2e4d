/// Workflow management REST API endpoints
///
/// Saves go through the registry, so every change is validated and hot-swapped
/// into the webhook index before the response is sent.

use crate::api::AppState;
use crate::execution::{Execution, TriggerType};
use crate::runtime::WebhookRunResult;
use crate::workflow::registry::RegistryError;
use crate::workflow::{Workflow, WorkflowStatus};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const DEFAULT_LIST_LIMIT: u32 = 50;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Invalid(#[from] crate::workflow::registry::ValidationError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Invalid(e) => ApiError::Invalid(e),
            RegistryError::Storage(e) => ApiError::Internal(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(e) => {
                tracing::error!("❌ API request failed: {:#}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Response for workflow creation/update operations
#[derive(Debug, Serialize)]
pub struct WorkflowResponse {
    pub id: String,
    pub status: WorkflowStatus,
    pub start_node_ids: Vec<String>,
    pub has_cycle: bool,
}

/// Request body for workflow creation
#[derive(Debug, Deserialize)]
pub struct CreateWorkflowRequest {
    pub workflow: Workflow,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: WorkflowStatus,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<u32>,
}

pub fn create_workflow_routes() -> Router<AppState> {
    Router::new()
        .route("/api/workflows", post(save_workflow).get(list_workflows))
        .route("/api/workflows/{id}", get(get_workflow).delete(delete_workflow))
        .route("/api/workflows/{id}/status", put(update_status))
        .route("/api/workflows/{id}/run", post(run_workflow))
        .route("/api/workflows/{id}/executions", get(list_executions))
        .route("/api/executions/{id}", get(get_execution))
        .route("/api/errors/recent", get(recent_errors))
}

/// Create or replace a workflow
///
/// POST /api/workflows
/// Body: { "workflow": { "id": "...", "name": "...", "nodes": [...], "edges": [...] } }
async fn save_workflow(
    State(state): State<AppState>,
    Json(payload): Json<CreateWorkflowRequest>,
) -> Result<Json<WorkflowResponse>, ApiError> {
    let workflow = payload.workflow;
    if workflow.id.is_empty() || workflow.name.is_empty() {
        return Err(ApiError::BadRequest("workflow id and name are required".into()));
    }

    let compiled = state.registry.save_workflow(workflow).await?;
    tracing::info!("💾 Saved workflow: {} ({})", compiled.workflow.id, compiled.workflow.name);

    Ok(Json(WorkflowResponse {
        id: compiled.workflow.id.clone(),
        status: compiled.workflow.status,
        start_node_ids: compiled.start_node_ids.clone(),
        has_cycle: compiled.has_cycle,
    }))
}

/// GET /api/workflows
async fn list_workflows(State(state): State<AppState>) -> Json<Value> {
    let mut ids = state.registry.list_workflow_ids();
    ids.sort();
    let workflows: Vec<Value> = ids
        .iter()
        .filter_map(|id| state.registry.get_workflow(id))
        .map(|c| json!({ "id": c.workflow.id, "name": c.workflow.name, "status": c.workflow.status }))
        .collect();
    Json(json!({ "workflows": workflows }))
}

/// GET /api/workflows/{id}
async fn get_workflow(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Workflow>, ApiError> {
    state
        .registry
        .get_workflow(&id)
        .map(|c| Json(c.workflow.clone()))
        .ok_or_else(|| ApiError::NotFound(format!("workflow not found: {}", id)))
}

/// DELETE /api/workflows/{id}
async fn delete_workflow(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    if state.registry.remove_workflow(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("workflow not found: {}", id)))
    }
}

/// PUT /api/workflows/{id}/status
/// Body: { "status": "active" | "inactive" | "draft" }
async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<StatusRequest>,
) -> Result<Json<WorkflowResponse>, ApiError> {
    let compiled = state
        .registry
        .set_status(&id, request.status)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("workflow not found: {}", id)))?;

    Ok(Json(WorkflowResponse {
        id: compiled.workflow.id.clone(),
        status: compiled.workflow.status,
        start_node_ids: compiled.start_node_ids.clone(),
        has_cycle: compiled.has_cycle,
    }))
}

/// Manual run; the body (empty means `{}`) becomes the trigger payload
///
/// POST /api/workflows/{id}/run
async fn run_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<WebhookRunResult>, ApiError> {
    if state.registry.get_workflow(&id).is_none() {
        return Err(ApiError::NotFound(format!("workflow not found: {}", id)));
    }
    let payload = if body.is_empty() {
        json!({})
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {}", e)))?
    };

    tracing::info!("▶️ Manual run requested for workflow {}", id);
    let result = state.executor.execute_webhook(&id, payload, TriggerType::Manual).await?;
    Ok(Json(result))
}

/// GET /api/workflows/{id}/executions?limit=N
async fn list_executions(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<Execution>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    let executions = state.executor.executions().list_for_workflow(&id, limit).await?;
    Ok(Json(executions))
}

/// GET /api/executions/{id}
async fn get_execution(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Execution>, ApiError> {
    state
        .executor
        .executions()
        .get(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("execution not found: {}", id)))
}

/// GET /api/errors/recent?limit=N
async fn recent_errors(State(state): State<AppState>, Query(query): Query<LimitQuery>) -> Json<Value> {
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT) as usize;
    Json(json!({ "errors": state.executor.error_handler().recent(limit) }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{create_router, test_support};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn definition() -> Value {
        json!({
            "id": "greeter", "name": "Greeter",
            "nodes": [
                { "id": "start", "type": "manual_trigger" },
                { "id": "greet", "type": "set", "settings": {
                    "keep_input": false,
                    "values": { "hello": { "$ref": "trigger.name" } }
                } }
            ],
            "edges": [ { "from": "start", "to": "greet" } ]
        })
    }

    #[tokio::test]
    async fn save_activate_and_run() {
        let state = test_support::state().await;
        let app = create_router(state);

        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/workflows", json!({ "workflow": definition() })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let saved = body_json(response).await;
        assert_eq!(saved["status"], json!("draft"));
        assert_eq!(saved["start_node_ids"], json!(["start"]));

        let response = app
            .clone()
            .oneshot(json_request("PUT", "/api/workflows/greeter/status", json!({ "status": "active" })))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["status"], json!("active"));

        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/workflows/greeter/run", json!({ "name": "Ada" })))
            .await
            .unwrap();
        let run = body_json(response).await;
        assert_eq!(run["success"], json!(true));

        let uri = format!("/api/executions/{}", run["execution_id"].as_str().unwrap());
        let response = app
            .clone()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let execution = body_json(response).await;
        assert_eq!(execution["status"], json!("completed"));
        assert_eq!(execution["trigger_type"], json!("manual"));
        assert_eq!(execution["execution_data"]["node_outputs"]["greet"], json!({ "hello": "Ada" }));

        let response = app
            .oneshot(Request::get("/api/workflows/greeter/executions").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalid_workflow_is_422() {
        let app = create_router(test_support::state().await);
        let mut bad = definition();
        bad["edges"] = json!([ { "from": "start", "to": "ghost" } ]);

        let response = app
            .oneshot(json_request("POST", "/api/workflows", json!({ "workflow": bad })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body_json(response).await["error"].as_str().unwrap().contains("ghost"));
    }

    #[tokio::test]
    async fn missing_resources_are_404() {
        let app = create_router(test_support::state().await);
        for (method, uri) in [
            ("GET", "/api/workflows/none"),
            ("DELETE", "/api/workflows/none"),
            ("POST", "/api/workflows/none/run"),
            ("GET", "/api/executions/none"),
        ] {
            let response = app
                .clone()
                .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{} {}", method, uri);
        }
    }

    #[tokio::test]
    async fn delete_unbinds_webhooks() {
        let state = test_support::state().await;
        test_support::save_active(
            &state,
            json!({
                "id": "hooked", "name": "Hooked",
                "nodes": [ { "id": "hook", "type": "webhook_trigger", "settings": { "webhook_key": "bye" } } ]
            }),
        )
        .await;
        let registry = state.registry.clone();
        let app = create_router(state);

        let response = app
            .oneshot(Request::delete("/api/workflows/hooked").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(registry.find_by_webhook_key("bye", false).is_empty());
    }

    #[tokio::test]
    async fn recent_errors_lists_handled_failures() {
        let state = test_support::state().await;
        test_support::save_active(
            &state,
            json!({
                "id": "broken", "name": "Broken",
                "nodes": [
                    { "id": "start", "type": "manual_trigger" },
                    { "id": "bad", "type": "set", "settings": { "values": { "x": { "$ref": "trigger.missing" } } } }
                ],
                "edges": [ { "from": "start", "to": "bad" } ]
            }),
        )
        .await;
        let app = create_router(state);

        let response = app
            .clone()
            .oneshot(Request::post("/api/workflows/broken/run").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_json(response).await["success"], json!(false));

        let response = app
            .oneshot(Request::get("/api/errors/recent?limit=5").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let errors = body_json(response).await;
        assert_eq!(errors["errors"][0]["node_id"], json!("bad"));
    }
}
