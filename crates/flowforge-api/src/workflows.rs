// Workflow definition CRUD routes.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};

use flowforge_core::WorkflowDefinition;
use flowforge_runner::InProcessBackend;

use crate::error::map_err;

#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<InProcessBackend>,
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/workflows", get(list_workflows).post(upsert_workflow))
        .route(
            "/v1/workflows/:name",
            get(get_workflow).delete(delete_workflow),
        )
        .with_state(state)
}

/// PUT-by-name semantics via POST: a workflow definition is upserted by
/// name, replacing any prior version.
#[utoipa::path(
    post,
    path = "/v1/workflows",
    request_body = WorkflowDefinition,
    responses(
        (status = 201, description = "Workflow stored", body = WorkflowDefinition),
        (status = 400, description = "Invalid workflow definition"),
    ),
    tag = "workflows"
)]
pub async fn upsert_workflow(
    State(state): State<AppState>,
    Json(workflow): Json<WorkflowDefinition>,
) -> Result<(StatusCode, Json<WorkflowDefinition>), StatusCode> {
    state
        .backend
        .workflows
        .upsert(workflow.clone())
        .await
        .map_err(map_err)?;
    Ok((StatusCode::CREATED, Json(workflow)))
}

#[utoipa::path(
    get,
    path = "/v1/workflows",
    responses((status = 200, description = "List of workflows", body = Vec<WorkflowDefinition>)),
    tag = "workflows"
)]
pub async fn list_workflows(State(state): State<AppState>) -> Json<Vec<WorkflowDefinition>> {
    Json(state.backend.workflows.list().await)
}

#[utoipa::path(
    get,
    path = "/v1/workflows/{name}",
    params(("name" = String, Path, description = "Workflow name")),
    responses(
        (status = 200, description = "Workflow found", body = WorkflowDefinition),
        (status = 404, description = "Workflow not found"),
    ),
    tag = "workflows"
)]
pub async fn get_workflow(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<WorkflowDefinition>, StatusCode> {
    state
        .backend
        .workflows
        .get(&name)
        .await
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

#[utoipa::path(
    delete,
    path = "/v1/workflows/{name}",
    params(("name" = String, Path, description = "Workflow name")),
    responses(
        (status = 204, description = "Workflow removed"),
        (status = 404, description = "Workflow not found"),
    ),
    tag = "workflows"
)]
pub async fn delete_workflow(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, StatusCode> {
    state
        .backend
        .workflows
        .remove(&name)
        .await
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or(StatusCode::NOT_FOUND)
}
