// Run CRUD + cancel + live event stream routes.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    routing::{get, patch},
    Json, Router,
};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tokio_stream::wrappers::ReceiverStream;
use utoipa::ToSchema;
use uuid::Uuid;

use flowforge_core::{RunRecord, TriggerType};
use flowforge_runner::InProcessBackend;

use crate::error::map_err;

#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<InProcessBackend>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRunRequest {
    pub workflow_name: String,
    #[serde(default)]
    pub inputs: serde_json::Value,
    #[serde(default)]
    pub trigger_ref: Option<String>,
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/runs", get(list_runs).post(create_run))
        .route("/v1/runs/:run_id", get(get_run))
        .route("/v1/runs/:run_id/cancel", patch(cancel_run))
        .route("/v1/runs/:run_id/events", get(stream_run_events))
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/v1/runs",
    responses((status = 200, description = "List of runs", body = Vec<RunRecord>)),
    tag = "runs"
)]
pub async fn list_runs(State(state): State<AppState>) -> Json<Vec<RunRecord>> {
    Json(state.backend.runs.list().await)
}

#[utoipa::path(
    post,
    path = "/v1/runs",
    request_body = CreateRunRequest,
    responses(
        (status = 202, description = "Run admitted and started"),
        (status = 404, description = "Workflow not found"),
        (status = 429, description = "Concurrency limit reached"),
    ),
    tag = "runs"
)]
pub async fn create_run(
    State(state): State<AppState>,
    Json(req): Json<CreateRunRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), StatusCode> {
    let run_id = state
        .backend
        .run_manager
        .start_run(&req.workflow_name, TriggerType::Manual, req.trigger_ref, req.inputs)
        .await
        .map_err(map_err)?;
    Ok((StatusCode::ACCEPTED, Json(serde_json::json!({ "run_id": run_id }))))
}

#[utoipa::path(
    get,
    path = "/v1/runs/{run_id}",
    params(("run_id" = Uuid, Path, description = "Run ID")),
    responses(
        (status = 200, description = "Run found", body = RunRecord),
        (status = 404, description = "Run not found"),
    ),
    tag = "runs"
)]
pub async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<RunRecord>, StatusCode> {
    state.backend.runs.get(run_id).await.map(Json).ok_or(StatusCode::NOT_FOUND)
}

#[utoipa::path(
    patch,
    path = "/v1/runs/{run_id}/cancel",
    params(("run_id" = Uuid, Path, description = "Run ID")),
    responses(
        (status = 200, description = "Cancellation requested"),
        (status = 404, description = "Run not found or not active"),
    ),
    tag = "runs"
)]
pub async fn cancel_run(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> Result<StatusCode, StatusCode> {
    state.backend.run_manager.cancel_run(run_id).await.map_err(map_err)?;
    Ok(StatusCode::OK)
}

/// Live node-level event stream for one run, fed directly from the event
/// bus rather than replayed from storage — there's no durable event log to
/// poll, only the run record's terminal outcome.
#[utoipa::path(
    get,
    path = "/v1/runs/{run_id}/events",
    params(("run_id" = Uuid, Path, description = "Run ID")),
    responses(
        (status = 200, description = "Event stream", content_type = "text/event-stream"),
        (status = 404, description = "Run not found"),
    ),
    tag = "runs"
)]
pub async fn stream_run_events(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, StatusCode> {
    state.backend.runs.get(run_id).await.ok_or(StatusCode::NOT_FOUND)?;

    let rx = state.backend.events.channel(64);
    let stream = ReceiverStream::new(rx)
        .filter(move |event| futures::future::ready(event.run_id == run_id))
        .map(|event| {
            let json = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
            Ok(SseEvent::default()
                .event(event.event_type.clone())
                .id(event.id.to_string())
                .data(json))
        });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
