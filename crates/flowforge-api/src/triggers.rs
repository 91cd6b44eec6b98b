// Trigger CRUD routes plus the webhook invocation endpoint.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use flowforge_core::{Trigger, TriggerConfig, TriggerTarget, TriggerType};
use flowforge_runner::InProcessBackend;

use crate::error::map_err;

#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<InProcessBackend>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTriggerRequest {
    pub target: TriggerTarget,
    #[serde(default)]
    pub config: TriggerConfig,
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/triggers", get(list_triggers).post(create_trigger))
        .route("/v1/triggers/:trigger_id", get(get_trigger).delete(delete_trigger))
        .route("/v1/triggers/:trigger_id/invoke", post(invoke_trigger))
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/v1/triggers",
    responses((status = 200, description = "List of triggers", body = Vec<Trigger>)),
    tag = "triggers"
)]
pub async fn list_triggers(State(state): State<AppState>) -> Json<Vec<Trigger>> {
    Json(state.backend.triggers.list().await)
}

#[utoipa::path(
    post,
    path = "/v1/triggers",
    request_body = CreateTriggerRequest,
    responses((status = 201, description = "Trigger created", body = Trigger)),
    tag = "triggers"
)]
pub async fn create_trigger(
    State(state): State<AppState>,
    Json(req): Json<CreateTriggerRequest>,
) -> (StatusCode, Json<Trigger>) {
    let trigger = Trigger::webhook(req.target, req.config);
    state.backend.triggers.put(trigger.clone()).await;
    (StatusCode::CREATED, Json(trigger))
}

#[utoipa::path(
    get,
    path = "/v1/triggers/{trigger_id}",
    params(("trigger_id" = Uuid, Path, description = "Trigger ID")),
    responses(
        (status = 200, description = "Trigger found", body = Trigger),
        (status = 404, description = "Trigger not found"),
    ),
    tag = "triggers"
)]
pub async fn get_trigger(
    State(state): State<AppState>,
    Path(trigger_id): Path<Uuid>,
) -> Result<Json<Trigger>, StatusCode> {
    state.backend.triggers.get(trigger_id).await.map(Json).ok_or(StatusCode::NOT_FOUND)
}

#[utoipa::path(
    delete,
    path = "/v1/triggers/{trigger_id}",
    params(("trigger_id" = Uuid, Path, description = "Trigger ID")),
    responses(
        (status = 204, description = "Trigger removed"),
        (status = 404, description = "Trigger not found"),
    ),
    tag = "triggers"
)]
pub async fn delete_trigger(
    State(state): State<AppState>,
    Path(trigger_id): Path<Uuid>,
) -> Result<StatusCode, StatusCode> {
    state
        .backend
        .triggers
        .remove(trigger_id)
        .await
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or(StatusCode::NOT_FOUND)
}

/// POST /v1/triggers/:trigger_id/invoke — external webhook entry point.
/// Maps the raw payload through the trigger's `input_mapping` and starts
/// the target workflow (or pipeline, once pipeline webhook targets are
/// wired up the same way workflow targets are here).
#[utoipa::path(
    post,
    path = "/v1/triggers/{trigger_id}/invoke",
    params(("trigger_id" = Uuid, Path, description = "Trigger ID")),
    responses(
        (status = 202, description = "Run started"),
        (status = 404, description = "Trigger not found"),
        (status = 400, description = "Trigger disabled or targets a pipeline"),
    ),
    tag = "triggers"
)]
pub async fn invoke_trigger(
    State(state): State<AppState>,
    Path(trigger_id): Path<Uuid>,
    Json(payload): Json<serde_json::Value>,
) -> Result<(StatusCode, Json<serde_json::Value>), StatusCode> {
    let trigger = state.backend.triggers.get(trigger_id).await.ok_or(StatusCode::NOT_FOUND)?;
    if !trigger.enabled {
        return Err(StatusCode::BAD_REQUEST);
    }

    let inputs = serde_json::Value::Object(trigger.map_inputs(&payload));

    let TriggerTarget::Workflow { workflow_name } = &trigger.target else {
        return Err(StatusCode::BAD_REQUEST);
    };

    let run_id = state
        .backend
        .run_manager
        .start_run(workflow_name, TriggerType::Webhook, Some(trigger_id.to_string()), inputs)
        .await
        .map_err(map_err)?;

    Ok((StatusCode::ACCEPTED, Json(serde_json::json!({ "run_id": run_id }))))
}
