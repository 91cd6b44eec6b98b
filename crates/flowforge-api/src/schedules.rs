// Schedule CRUD routes.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use flowforge_core::{Schedule, ScheduleTarget};
use flowforge_runner::InProcessBackend;

use crate::error::map_err;

#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<InProcessBackend>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateScheduleRequest {
    pub target: ScheduleTarget,
    pub cron_expr: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub inputs: serde_json::Value,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/schedules", get(list_schedules).post(create_schedule))
        .route(
            "/v1/schedules/:schedule_id",
            get(get_schedule).delete(delete_schedule),
        )
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/v1/schedules",
    responses((status = 200, description = "List of schedules", body = Vec<Schedule>)),
    tag = "schedules"
)]
pub async fn list_schedules(State(state): State<AppState>) -> Json<Vec<Schedule>> {
    Json(state.backend.schedules.list().await)
}

#[utoipa::path(
    post,
    path = "/v1/schedules",
    request_body = CreateScheduleRequest,
    responses(
        (status = 201, description = "Schedule created", body = Schedule),
        (status = 400, description = "Invalid cron expression"),
    ),
    tag = "schedules"
)]
pub async fn create_schedule(
    State(state): State<AppState>,
    Json(req): Json<CreateScheduleRequest>,
) -> Result<(StatusCode, Json<Schedule>), StatusCode> {
    let now = chrono::Utc::now();
    let next_run_at = first_run_after(&req.cron_expr, &req.timezone, now).unwrap_or(now);
    let mut schedule = Schedule::new(req.target, req.cron_expr, req.timezone, next_run_at).map_err(map_err)?;
    schedule.inputs = req.inputs;
    state.backend.schedules.put(schedule.clone()).await;
    Ok((StatusCode::CREATED, Json(schedule)))
}

/// Same cron-in-timezone computation the scheduler uses internally, run
/// once up front so a freshly created schedule doesn't fire immediately.
fn first_run_after(cron_expr: &str, timezone: &str, after: chrono::DateTime<chrono::Utc>) -> Option<chrono::DateTime<chrono::Utc>> {
    let cron_schedule = cron::Schedule::from_str(cron_expr).ok()?;
    let tz = chrono_tz::Tz::from_str(timezone).ok()?;
    let after_in_tz = after.with_timezone(&tz);
    let next = cron_schedule.after(&after_in_tz).next()?;
    Some(next.with_timezone(&chrono::Utc))
}

#[utoipa::path(
    get,
    path = "/v1/schedules/{schedule_id}",
    params(("schedule_id" = Uuid, Path, description = "Schedule ID")),
    responses(
        (status = 200, description = "Schedule found", body = Schedule),
        (status = 404, description = "Schedule not found"),
    ),
    tag = "schedules"
)]
pub async fn get_schedule(
    State(state): State<AppState>,
    Path(schedule_id): Path<Uuid>,
) -> Result<Json<Schedule>, StatusCode> {
    state.backend.schedules.get(schedule_id).await.map(Json).ok_or(StatusCode::NOT_FOUND)
}

#[utoipa::path(
    delete,
    path = "/v1/schedules/{schedule_id}",
    params(("schedule_id" = Uuid, Path, description = "Schedule ID")),
    responses(
        (status = 204, description = "Schedule removed"),
        (status = 404, description = "Schedule not found"),
    ),
    tag = "schedules"
)]
pub async fn delete_schedule(
    State(state): State<AppState>,
    Path(schedule_id): Path<Uuid>,
) -> Result<StatusCode, StatusCode> {
    state
        .backend
        .schedules
        .remove(schedule_id)
        .await
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or(StatusCode::NOT_FOUND)
}
