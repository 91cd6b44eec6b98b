//! Pipeline stage state machine (spec §5).
//!
//! Stages run in declaration order — `Pipeline::validate_dependency_order`
//! already guarantees every stage's `depends_on` names only stages earlier
//! in the list, so sequential iteration respects the dependency graph
//! without a separate topological pass. `approval`-kind stages suspend on
//! an `ExecutionHandles` waypoint keyed by the stage id.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use flowforge_core::error::{FlowError, Result};
use flowforge_core::template::{self, ArtifactMap};
use flowforge_core::{Artifact, Pipeline, PipelineRun, PipelineRunStatus, Stage, StageResult, StageStatus, StageType, TriggerType};
use flowforge_storage::{PipelineRepository, PipelineRunRepository};

use crate::execution_handle::{ApprovalDecision, ExecutionHandles};
use crate::run_manager::RunManager;

enum StageOutcome {
    Completed(Value),
    Suspended,
}

pub struct PipelineRunner {
    pipelines: PipelineRepository,
    pipeline_runs: PipelineRunRepository,
    run_manager: Arc<RunManager>,
    handles: Arc<ExecutionHandles>,
}

impl PipelineRunner {
    pub fn new(
        pipelines: PipelineRepository,
        pipeline_runs: PipelineRunRepository,
        run_manager: Arc<RunManager>,
        handles: Arc<ExecutionHandles>,
    ) -> Arc<Self> {
        Arc::new(Self { pipelines, pipeline_runs, run_manager, handles })
    }

    pub async fn start(self: &Arc<Self>, pipeline_id: Uuid, inputs: Value) -> Result<Uuid> {
        let pipeline = self
            .pipelines
            .get(pipeline_id)
            .await
            .ok_or_else(|| FlowError::not_found(format!("pipeline {pipeline_id}")))?;

        let mut run = PipelineRun::new(pipeline_id);
        run.status = PipelineRunStatus::Running;
        let run_id = run.id;
        self.pipeline_runs.put(run.clone()).await;

        let runner = self.clone();
        tokio::spawn(async move {
            runner.drive(pipeline, run, inputs).await;
        });

        Ok(run_id)
    }

    /// Resume a suspended approval stage.
    pub fn resume(&self, run_id: Uuid, stage_id: &str, decision: ApprovalDecision) -> Result<()> {
        self.handles.resume(run_id, stage_id, decision)
    }

    async fn drive(self: Arc<Self>, pipeline: Pipeline, mut run: PipelineRun, inputs: Value) {
        let mut outputs: HashMap<String, Value> = HashMap::new();
        outputs.insert("inputs".to_string(), inputs);

        for stage in &pipeline.stages {
            run.current_stage = Some(stage.id.clone());
            let started_at = chrono::Utc::now();

            let outcome = self.execute_stage(run.id, stage, &outputs).await;
            match outcome {
                Ok(StageOutcome::Completed(value)) => {
                    outputs.insert(stage.id.clone(), value.clone());
                    run.stage_results.insert(
                        stage.id.clone(),
                        StageResult {
                            stage_id: stage.id.clone(),
                            status: StageStatus::Completed,
                            output: value,
                            error: None,
                            started_at,
                            completed_at: Some(chrono::Utc::now()),
                        },
                    );
                }
                Ok(StageOutcome::Suspended) => {
                    run.status = PipelineRunStatus::Waiting;
                    run.stage_results.insert(
                        stage.id.clone(),
                        StageResult {
                            stage_id: stage.id.clone(),
                            status: StageStatus::Waiting,
                            output: Value::Null,
                            error: None,
                            started_at,
                            completed_at: None,
                        },
                    );
                    self.pipeline_runs.put(run.clone()).await;

                    let rx = self.handles.register(run.id, stage.id.clone());
                    match rx.await {
                        Ok(ApprovalDecision::Approved(value)) => {
                            outputs.insert(stage.id.clone(), value.clone());
                            run.stage_results.insert(
                                stage.id.clone(),
                                StageResult {
                                    stage_id: stage.id.clone(),
                                    status: StageStatus::Completed,
                                    output: value,
                                    error: None,
                                    started_at,
                                    completed_at: Some(chrono::Utc::now()),
                                },
                            );
                            run.status = PipelineRunStatus::Running;
                        }
                        Ok(ApprovalDecision::Rejected(reason)) => {
                            self.fail_run(&mut run, stage, &reason, started_at).await;
                            return;
                        }
                        Err(_) => {
                            self.fail_run(&mut run, stage, "approval handle dropped", started_at).await;
                            return;
                        }
                    }
                }
                Err(err) => {
                    warn!(pipeline_run_id = %run.id, stage_id = %stage.id, error = %err, "pipeline stage failed");
                    self.fail_run(&mut run, stage, &err.to_string(), started_at).await;
                    return;
                }
            }
            self.pipeline_runs.put(run.clone()).await;
        }

        run.status = PipelineRunStatus::Completed;
        run.completed_at = Some(chrono::Utc::now());
        self.pipeline_runs.put(run).await;
    }

    async fn fail_run(&self, run: &mut PipelineRun, stage: &Stage, reason: &str, started_at: chrono::DateTime<chrono::Utc>) {
        run.stage_results.insert(
            stage.id.clone(),
            StageResult {
                stage_id: stage.id.clone(),
                status: StageStatus::Failed,
                output: Value::Null,
                error: Some(reason.to_string()),
                started_at,
                completed_at: Some(chrono::Utc::now()),
            },
        );
        run.status = PipelineRunStatus::Failed;
        run.completed_at = Some(chrono::Utc::now());
        self.pipeline_runs.put(run.clone()).await;
    }

    async fn execute_stage(&self, run_id: Uuid, stage: &Stage, outputs: &HashMap<String, Value>) -> Result<StageOutcome> {
        match stage.stage_type {
            StageType::Approval => Ok(StageOutcome::Suspended),

            StageType::Workflow => {
                let workflow_name = stage
                    .config
                    .get("workflow_name")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| FlowError::validation("workflow stage requires config.workflow_name"))?;
                let inputs = stage.config.get("inputs").cloned().unwrap_or(Value::Null);
                let run_ref = self
                    .run_manager
                    .start_run(workflow_name, TriggerType::Manual, Some(stage.id.clone()), inputs)
                    .await?;

                loop {
                    match self.run_manager.run_status(run_ref).await {
                        Some(status) if status.is_terminal() => {
                            return Ok(StageOutcome::Completed(serde_json::json!({
                                "run_id": run_ref,
                                "status": status,
                            })));
                        }
                        _ => tokio::time::sleep(Duration::from_millis(50)).await,
                    }
                }
            }

            StageType::Transform => {
                let template_str = stage.config.get("template").and_then(|v| v.as_str()).unwrap_or("");
                let artifacts = outputs_to_artifact_map(outputs);
                let resolved = template::resolve(template_str, &artifacts);
                Ok(StageOutcome::Completed(serde_json::json!({ "result": resolved })))
            }

            StageType::Collect => {
                Ok(StageOutcome::Completed(serde_json::to_value(outputs).unwrap_or(Value::Null)))
            }

            StageType::Notification | StageType::Schedule | StageType::Trigger => {
                Ok(StageOutcome::Completed(Value::Null))
            }
        }
    }

    pub async fn run_for(&self, run_id: Uuid) -> Option<PipelineRun> {
        self.pipeline_runs.get(run_id).await
    }
}

fn outputs_to_artifact_map(outputs: &HashMap<String, Value>) -> ArtifactMap {
    outputs
        .iter()
        .map(|(k, v)| (k.clone(), vec![Artifact::from_data(v.clone())]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::NodeDispatcher;
    use crate::llm::EchoLlmProvider;
    use crate::tool::ToolRegistry;
    use crate::workflow_runner::WorkflowRunner;
    use flowforge_core::event_bus::EventBus;
    use flowforge_core::{ConcurrencyLimits, StageType};
    use flowforge_storage::{PipelineRunRepository, RunRepository, WorkflowRepository};

    fn make_pipeline() -> Pipeline {
        Pipeline::new(
            "demo",
            "demo pipeline",
            vec![Stage {
                id: "transform".into(),
                name: "transform".into(),
                stage_type: StageType::Transform,
                config: serde_json::json!({ "template": "hi {{inputs.data}}" }),
                depends_on: vec![],
            }],
        )
    }

    async fn runner() -> Arc<PipelineRunner> {
        let workflows = WorkflowRepository::new();
        let runs = RunRepository::new();
        let dispatcher = Arc::new(NodeDispatcher::new(ToolRegistry::new(), Arc::new(EchoLlmProvider)));
        let wf_runner = Arc::new(WorkflowRunner::new(dispatcher, EventBus::new()));
        let run_manager = RunManager::new(workflows, runs, wf_runner, ConcurrencyLimits::default());
        let pipelines = PipelineRepository::new();
        let pipeline_runs = PipelineRunRepository::new();
        PipelineRunner::new(pipelines, pipeline_runs, run_manager, Arc::new(ExecutionHandles::new()))
    }

    #[tokio::test]
    async fn a_transform_only_pipeline_completes() {
        let runner = runner().await;
        runner.pipelines.create(make_pipeline()).await.unwrap();
        let pipeline_id = runner.pipelines.list().await[0].id;

        let run_id = runner.start(pipeline_id, serde_json::json!({"hello": "world"})).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let run = runner.run_for(run_id).await.unwrap();
        assert_eq!(run.status, PipelineRunStatus::Completed);
    }
}
