mod connections;
mod error;
mod pipelines;
mod runs;
mod schedules;
mod triggers;
mod workflows;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{routing::get, Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use flowforge_core::{
    Connection, ConnectionSafe, ConnectionType, Pipeline, PipelineRun, RunRecord, Schedule, ScheduleTarget, Stage,
    StageResult, StageStatus, StageType, Trigger, TriggerConfig, TriggerKind, TriggerTarget, TriggerType,
    WorkflowDefinition,
};
use flowforge_runner::{EchoLlmProvider, GetCurrentTimeTool, InProcessBackend, ToolRegistry};

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(OpenApi)]
#[openapi(
    paths(
        workflows::upsert_workflow,
        workflows::list_workflows,
        workflows::get_workflow,
        workflows::delete_workflow,
        runs::list_runs,
        runs::create_run,
        runs::get_run,
        runs::cancel_run,
        runs::stream_run_events,
        schedules::list_schedules,
        schedules::create_schedule,
        schedules::get_schedule,
        schedules::delete_schedule,
        triggers::list_triggers,
        triggers::create_trigger,
        triggers::get_trigger,
        triggers::delete_trigger,
        triggers::invoke_trigger,
        pipelines::list_pipelines,
        pipelines::create_pipeline,
        pipelines::get_pipeline,
        pipelines::start_pipeline_run,
        pipelines::list_pipeline_runs,
        pipelines::get_pipeline_run,
        pipelines::approve_stage,
        pipelines::reject_stage,
        connections::list_connections,
        connections::create_connection,
        connections::get_connection,
        connections::delete_connection,
    ),
    components(
        schemas(
            WorkflowDefinition,
            RunRecord, TriggerType,
            Schedule, ScheduleTarget,
            Trigger, TriggerTarget, TriggerKind, TriggerConfig,
            Pipeline, Stage, StageType, PipelineRun, StageResult, StageStatus,
            Connection, ConnectionSafe, ConnectionType,
            schedules::CreateScheduleRequest,
            triggers::CreateTriggerRequest,
            pipelines::CreatePipelineRequest,
            pipelines::StartPipelineRunRequest,
            pipelines::ApproveStageRequest,
            pipelines::RejectStageRequest,
            connections::CreateConnectionRequest,
            runs::CreateRunRequest,
        )
    ),
    tags(
        (name = "workflows", description = "Workflow definition CRUD"),
        (name = "runs", description = "Workflow run execution and event streaming"),
        (name = "schedules", description = "Cron-driven recurring execution"),
        (name = "triggers", description = "Webhook entry points"),
        (name = "pipelines", description = "Multi-stage pipeline composition"),
        (name = "connections", description = "External service credentials"),
    ),
    info(
        title = "Flowforge API",
        version = "0.1.0",
        description = "API for defining, running, and observing DAG workflows and pipelines",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flowforge_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("flowforge-api starting...");

    let config = flowforge_core::AppConfig::from_env();

    let mut tools = ToolRegistry::new();
    tools.register(GetCurrentTimeTool);

    let backend = Arc::new(InProcessBackend::build(tools, Arc::new(EchoLlmProvider), &config));
    backend.start().await;
    tracing::info!("in-process execution backend started");

    let workflows_state = workflows::AppState { backend: backend.clone() };
    let runs_state = runs::AppState { backend: backend.clone() };
    let schedules_state = schedules::AppState { backend: backend.clone() };
    let triggers_state = triggers::AppState { backend: backend.clone() };
    let pipelines_state = pipelines::AppState { backend: backend.clone() };
    let connections_state = connections::AppState { backend: backend.clone() };

    let app = Router::new()
        .route("/health", get(health))
        .merge(workflows::routes(workflows_state))
        .merge(runs::routes(runs_state))
        .merge(schedules::routes(schedules_state))
        .merge(triggers::routes(triggers_state))
        .merge(pipelines::routes(pipelines_state))
        .merge(connections::routes(connections_state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("failed to bind to address")?;
    tracing::info!("listening on {}", addr);

    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
