// Pipeline CRUD, run start/inspect, and approval-stage resume routes.

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

use flowforge_core::{Pipeline, PipelineRun, Stage};
use flowforge_runner::{ApprovalDecision, InProcessBackend};

use crate::error::map_err;

#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<InProcessBackend>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePipelineRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub stages: Vec<Stage>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct StartPipelineRunRequest {
    #[serde(default)]
    pub inputs: serde_json::Value,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ApproveStageRequest {
    #[serde(default)]
    pub output: serde_json::Value,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RejectStageRequest {
    pub reason: String,
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/pipelines", get(list_pipelines).post(create_pipeline))
        .route("/v1/pipelines/:pipeline_id", get(get_pipeline))
        .route("/v1/pipelines/:pipeline_id/runs", get(list_pipeline_runs).post(start_pipeline_run))
        .route("/v1/pipelines/:pipeline_id/runs/:run_id", get(get_pipeline_run))
        .route(
            "/v1/pipelines/:pipeline_id/runs/:run_id/stages/:stage_id/approve",
            post(approve_stage),
        )
        .route(
            "/v1/pipelines/:pipeline_id/runs/:run_id/stages/:stage_id/reject",
            post(reject_stage),
        )
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/v1/pipelines",
    responses((status = 200, description = "List of pipelines", body = Vec<Pipeline>)),
    tag = "pipelines"
)]
pub async fn list_pipelines(State(state): State<AppState>) -> Json<Vec<Pipeline>> {
    Json(state.backend.pipelines.list().await)
}

#[utoipa::path(
    post,
    path = "/v1/pipelines",
    request_body = CreatePipelineRequest,
    responses(
        (status = 201, description = "Pipeline created", body = Pipeline),
        (status = 400, description = "Stage dependency order is invalid"),
    ),
    tag = "pipelines"
)]
pub async fn create_pipeline(
    State(state): State<AppState>,
    Json(req): Json<CreatePipelineRequest>,
) -> Result<(StatusCode, Json<Pipeline>), StatusCode> {
    let pipeline = Pipeline::new(req.name, req.description, req.stages);
    state.backend.pipelines.create(pipeline.clone()).await.map_err(map_err)?;
    Ok((StatusCode::CREATED, Json(pipeline)))
}

#[utoipa::path(
    get,
    path = "/v1/pipelines/{pipeline_id}",
    params(("pipeline_id" = Uuid, Path, description = "Pipeline ID")),
    responses(
        (status = 200, description = "Pipeline found", body = Pipeline),
        (status = 404, description = "Pipeline not found"),
    ),
    tag = "pipelines"
)]
pub async fn get_pipeline(
    State(state): State<AppState>,
    Path(pipeline_id): Path<Uuid>,
) -> Result<Json<Pipeline>, StatusCode> {
    state.backend.pipelines.get(pipeline_id).await.map(Json).ok_or(StatusCode::NOT_FOUND)
}

#[utoipa::path(
    post,
    path = "/v1/pipelines/{pipeline_id}/runs",
    params(("pipeline_id" = Uuid, Path, description = "Pipeline ID")),
    request_body = StartPipelineRunRequest,
    responses(
        (status = 202, description = "Pipeline run started"),
        (status = 404, description = "Pipeline not found"),
    ),
    tag = "pipelines"
)]
pub async fn start_pipeline_run(
    State(state): State<AppState>,
    Path(pipeline_id): Path<Uuid>,
    Json(req): Json<StartPipelineRunRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), StatusCode> {
    let run_id = state
        .backend
        .pipeline_runner
        .start(pipeline_id, req.inputs)
        .await
        .map_err(map_err)?;
    Ok((StatusCode::ACCEPTED, Json(serde_json::json!({ "run_id": run_id }))))
}

#[utoipa::path(
    get,
    path = "/v1/pipelines/{pipeline_id}/runs",
    params(("pipeline_id" = Uuid, Path, description = "Pipeline ID")),
    responses((status = 200, description = "List of runs for this pipeline", body = Vec<PipelineRun>)),
    tag = "pipelines"
)]
pub async fn list_pipeline_runs(
    State(state): State<AppState>,
    Path(pipeline_id): Path<Uuid>,
) -> Json<Vec<PipelineRun>> {
    Json(state.backend.pipeline_runs.list_for_pipeline(pipeline_id).await)
}

#[utoipa::path(
    get,
    path = "/v1/pipelines/{pipeline_id}/runs/{run_id}",
    params(
        ("pipeline_id" = Uuid, Path, description = "Pipeline ID"),
        ("run_id" = Uuid, Path, description = "Pipeline run ID"),
    ),
    responses(
        (status = 200, description = "Pipeline run found", body = PipelineRun),
        (status = 404, description = "Pipeline run not found"),
    ),
    tag = "pipelines"
)]
pub async fn get_pipeline_run(
    State(state): State<AppState>,
    Path((_pipeline_id, run_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<PipelineRun>, StatusCode> {
    state.backend.pipeline_runner.run_for(run_id).await.map(Json).ok_or(StatusCode::NOT_FOUND)
}

#[utoipa::path(
    post,
    path = "/v1/pipelines/{pipeline_id}/runs/{run_id}/stages/{stage_id}/approve",
    params(
        ("pipeline_id" = Uuid, Path, description = "Pipeline ID"),
        ("run_id" = Uuid, Path, description = "Pipeline run ID"),
        ("stage_id" = String, Path, description = "Stage ID"),
    ),
    request_body = ApproveStageRequest,
    responses(
        (status = 200, description = "Stage resumed as approved"),
        (status = 409, description = "Stage is not currently waiting"),
    ),
    tag = "pipelines"
)]
pub async fn approve_stage(
    State(state): State<AppState>,
    Path((_pipeline_id, run_id, stage_id)): Path<(Uuid, Uuid, String)>,
    Json(req): Json<ApproveStageRequest>,
) -> Result<StatusCode, StatusCode> {
    state
        .backend
        .pipeline_runner
        .resume(run_id, &stage_id, ApprovalDecision::Approved(req.output))
        .map_err(map_err)?;
    Ok(StatusCode::OK)
}

#[utoipa::path(
    post,
    path = "/v1/pipelines/{pipeline_id}/runs/{run_id}/stages/{stage_id}/reject",
    params(
        ("pipeline_id" = Uuid, Path, description = "Pipeline ID"),
        ("run_id" = Uuid, Path, description = "Pipeline run ID"),
        ("stage_id" = String, Path, description = "Stage ID"),
    ),
    request_body = RejectStageRequest,
    responses(
        (status = 200, description = "Stage resumed as rejected"),
        (status = 409, description = "Stage is not currently waiting"),
    ),
    tag = "pipelines"
)]
pub async fn reject_stage(
    State(state): State<AppState>,
    Path((_pipeline_id, run_id, stage_id)): Path<(Uuid, Uuid, String)>,
    Json(req): Json<RejectStageRequest>,
) -> Result<StatusCode, StatusCode> {
    state
        .backend
        .pipeline_runner
        .resume(run_id, &stage_id, ApprovalDecision::Rejected(req.reason))
        .map_err(map_err)?;
    Ok(StatusCode::OK)
}
