// Connection CRUD routes. Only `ConnectionSafe` ever crosses this boundary
// — the stored `Connection`'s secret fields never serialize into a response.

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

use flowforge_core::{Connection, ConnectionSafe, ConnectionType};
use flowforge_runner::InProcessBackend;

use crate::error::map_err;

#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<InProcessBackend>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateConnectionRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ConnectionType,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub extras: serde_json::Value,
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/connections", get(list_connections).post(create_connection))
        .route("/v1/connections/:connection_id", get(get_connection).delete(delete_connection))
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/v1/connections",
    responses((status = 200, description = "List of connections", body = Vec<ConnectionSafe>)),
    tag = "connections"
)]
pub async fn list_connections(State(state): State<AppState>) -> Json<Vec<ConnectionSafe>> {
    let connections = state.backend.connections.list().await;
    Json(connections.iter().map(ConnectionSafe::from).collect())
}

#[utoipa::path(
    post,
    path = "/v1/connections",
    request_body = CreateConnectionRequest,
    responses(
        (status = 201, description = "Connection created", body = ConnectionSafe),
        (status = 400, description = "Connection name already in use"),
    ),
    tag = "connections"
)]
pub async fn create_connection(
    State(state): State<AppState>,
    Json(req): Json<CreateConnectionRequest>,
) -> Result<(StatusCode, Json<ConnectionSafe>), StatusCode> {
    let connection = Connection {
        id: Uuid::now_v7(),
        name: req.name,
        kind: req.kind,
        host: req.host,
        port: req.port,
        login: req.login,
        password: req.password,
        token: req.token,
        extras: req.extras,
    };
    state.backend.connections.create(connection.clone()).await.map_err(map_err)?;
    Ok((StatusCode::CREATED, Json(ConnectionSafe::from(&connection))))
}

#[utoipa::path(
    get,
    path = "/v1/connections/{connection_id}",
    params(("connection_id" = Uuid, Path, description = "Connection ID")),
    responses(
        (status = 200, description = "Connection found", body = ConnectionSafe),
        (status = 404, description = "Connection not found"),
    ),
    tag = "connections"
)]
pub async fn get_connection(
    State(state): State<AppState>,
    Path(connection_id): Path<Uuid>,
) -> Result<Json<ConnectionSafe>, StatusCode> {
    state
        .backend
        .connections
        .get(connection_id)
        .await
        .map(|c| Json(ConnectionSafe::from(&c)))
        .ok_or(StatusCode::NOT_FOUND)
}

#[utoipa::path(
    delete,
    path = "/v1/connections/{connection_id}",
    params(("connection_id" = Uuid, Path, description = "Connection ID")),
    responses(
        (status = 204, description = "Connection removed"),
        (status = 404, description = "Connection not found"),
    ),
    tag = "connections"
)]
pub async fn delete_connection(
    State(state): State<AppState>,
    Path(connection_id): Path<Uuid>,
) -> Result<StatusCode, StatusCode> {
    state
        .backend
        .connections
        .remove(connection_id)
        .await
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or(StatusCode::NOT_FOUND)
}
