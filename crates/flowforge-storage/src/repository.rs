//! Per-entity repositories built on top of the generic [`Store`].
//!
//! Policy per entity (duplicate handling, retention) lives here, not in
//! `Store` itself, which stays a dumb keyed index.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use flowforge_core::{
    error::{FlowError, Result},
    Connection, Pipeline, PipelineRun, RunRecord, Schedule, Trigger, WorkflowDefinition,
};

use crate::store::Store;

const MAX_RUN_RECORDS: usize = 1000;

/// Workflows are keyed by name and upserted — a `put` with an existing
/// name replaces the prior definition (new version supersedes old).
#[derive(Clone)]
pub struct WorkflowRepository {
    by_name: Arc<RwLock<HashMap<String, WorkflowDefinition>>>,
}

impl WorkflowRepository {
    pub fn new() -> Self {
        Self {
            by_name: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn upsert(&self, workflow: WorkflowDefinition) -> Result<()> {
        workflow.validate_shape()?;
        flowforge_core::Dag::build(&workflow)?;
        self.by_name.write().await.insert(workflow.name.clone(), workflow);
        Ok(())
    }

    pub async fn get(&self, name: &str) -> Option<WorkflowDefinition> {
        self.by_name.read().await.get(name).cloned()
    }

    pub async fn remove(&self, name: &str) -> Option<WorkflowDefinition> {
        self.by_name.write().await.remove(name)
    }

    pub async fn list(&self) -> Vec<WorkflowDefinition> {
        self.by_name.read().await.values().cloned().collect()
    }
}

impl Default for WorkflowRepository {
    fn default() -> Self {
        Self::new()
    }
}

/// Run records, evicted FIFO by creation time once the store exceeds
/// [`MAX_RUN_RECORDS`].
#[derive(Clone)]
pub struct RunRepository {
    store: Store<RunRecord>,
}

impl RunRepository {
    pub fn new() -> Self {
        Self { store: Store::new() }
    }

    pub async fn put(&self, run: RunRecord) {
        self.store.put(run.id, run).await;
        self.store.evict_fifo_over(MAX_RUN_RECORDS, |r| r.created_at).await;
    }

    pub async fn get(&self, id: Uuid) -> Option<RunRecord> {
        self.store.get(id).await
    }

    pub async fn list(&self) -> Vec<RunRecord> {
        self.store.list().await
    }

    pub async fn list_for_workflow(&self, workflow_name: &str) -> Vec<RunRecord> {
        self.store
            .list()
            .await
            .into_iter()
            .filter(|r| r.workflow_name == workflow_name)
            .collect()
    }
}

impl Default for RunRepository {
    fn default() -> Self {
        Self::new()
    }
}

/// Pipelines are rejected on duplicate id — a pipeline is created once and
/// updated via its own id, never silently overwritten by a second create.
#[derive(Clone)]
pub struct PipelineRepository {
    store: Store<Pipeline>,
}

impl PipelineRepository {
    pub fn new() -> Self {
        Self { store: Store::new() }
    }

    pub async fn create(&self, pipeline: Pipeline) -> Result<()> {
        pipeline.validate_dependency_order()?;
        if self.store.get(pipeline.id).await.is_some() {
            return Err(FlowError::validation(format!(
                "pipeline '{}' already exists",
                pipeline.id
            )));
        }
        self.store.put(pipeline.id, pipeline).await;
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Option<Pipeline> {
        self.store.get(id).await
    }

    pub async fn list(&self) -> Vec<Pipeline> {
        self.store.list().await
    }
}

impl Default for PipelineRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct PipelineRunRepository {
    store: Store<PipelineRun>,
}

impl PipelineRunRepository {
    pub fn new() -> Self {
        Self { store: Store::new() }
    }

    pub async fn put(&self, run: PipelineRun) {
        self.store.put(run.id, run).await;
        self.store.evict_fifo_over(MAX_RUN_RECORDS, |r| r.started_at).await;
    }

    pub async fn get(&self, id: Uuid) -> Option<PipelineRun> {
        self.store.get(id).await
    }

    pub async fn list_for_pipeline(&self, pipeline_id: Uuid) -> Vec<PipelineRun> {
        self.store
            .list()
            .await
            .into_iter()
            .filter(|r| r.pipeline_id == pipeline_id)
            .collect()
    }
}

impl Default for PipelineRunRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct ScheduleRepository {
    store: Store<Schedule>,
}

impl ScheduleRepository {
    pub fn new() -> Self {
        Self { store: Store::new() }
    }

    pub async fn put(&self, schedule: Schedule) {
        self.store.put(schedule.id, schedule).await;
    }

    pub async fn get(&self, id: Uuid) -> Option<Schedule> {
        self.store.get(id).await
    }

    pub async fn remove(&self, id: Uuid) -> Option<Schedule> {
        self.store.remove(id).await
    }

    pub async fn list(&self) -> Vec<Schedule> {
        self.store.list().await
    }

    pub async fn list_enabled(&self) -> Vec<Schedule> {
        self.store.list().await.into_iter().filter(|s| s.enabled).collect()
    }
}

impl Default for ScheduleRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct TriggerRepository {
    store: Store<Trigger>,
}

impl TriggerRepository {
    pub fn new() -> Self {
        Self { store: Store::new() }
    }

    pub async fn put(&self, trigger: Trigger) {
        self.store.put(trigger.id, trigger).await;
    }

    pub async fn get(&self, id: Uuid) -> Option<Trigger> {
        self.store.get(id).await
    }

    pub async fn remove(&self, id: Uuid) -> Option<Trigger> {
        self.store.remove(id).await
    }

    pub async fn list(&self) -> Vec<Trigger> {
        self.store.list().await
    }
}

impl Default for TriggerRepository {
    fn default() -> Self {
        Self::new()
    }
}

/// Connections are rejected on duplicate name — a second `create` for an
/// existing name must go through an explicit update path instead.
#[derive(Clone)]
pub struct ConnectionRepository {
    store: Store<Connection>,
}

impl ConnectionRepository {
    pub fn new() -> Self {
        Self { store: Store::new() }
    }

    pub async fn create(&self, connection: Connection) -> Result<()> {
        let existing = self.store.list().await;
        if existing.iter().any(|c| c.name == connection.name) {
            return Err(FlowError::validation(format!(
                "connection named '{}' already exists",
                connection.name
            )));
        }
        self.store.put(connection.id, connection).await;
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Option<Connection> {
        self.store.get(id).await
    }

    pub async fn remove(&self, id: Uuid) -> Option<Connection> {
        self.store.remove(id).await
    }

    pub async fn list(&self) -> Vec<Connection> {
        self.store.list().await
    }
}

impl Default for ConnectionRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowforge_core::{NodeDefinition, NodeKind};

    fn minimal_workflow(name: &str) -> WorkflowDefinition {
        WorkflowDefinition {
            name: name.to_string(),
            version: 1,
            nodes: vec![
                NodeDefinition {
                    id: "in".into(),
                    kind: NodeKind::Input,
                    config: serde_json::Value::Null,
                },
                NodeDefinition {
                    id: "out".into(),
                    kind: NodeKind::Output,
                    config: serde_json::Value::Null,
                },
            ],
            edges: vec![flowforge_core::EdgeDefinition {
                from: "in".into(),
                to: "out".into(),
                trigger_rule: Default::default(),
                condition: None,
                r#loop: None,
            }],
            groups: vec![],
        }
    }

    #[tokio::test]
    async fn workflow_upsert_replaces_existing_by_name() {
        let repo = WorkflowRepository::new();
        repo.upsert(minimal_workflow("wf")).await.unwrap();
        let mut v2 = minimal_workflow("wf");
        v2.version = 2;
        repo.upsert(v2).await.unwrap();

        let stored = repo.get("wf").await.unwrap();
        assert_eq!(stored.version, 2);
        assert_eq!(repo.list().await.len(), 1);
    }

    #[tokio::test]
    async fn run_repository_evicts_oldest_over_cap() {
        let repo = RunRepository::new();
        for i in 0..(MAX_RUN_RECORDS + 5) {
            let mut run = RunRecord::new(
                "wf",
                flowforge_core::TriggerType::Manual,
                None,
                serde_json::Value::Null,
            );
            run.created_at = chrono::Utc::now() + chrono::Duration::seconds(i as i64);
            repo.put(run).await;
        }
        assert_eq!(repo.list().await.len(), MAX_RUN_RECORDS);
    }

    #[tokio::test]
    async fn connection_create_rejects_duplicate_name() {
        let repo = ConnectionRepository::new();
        let conn = Connection {
            id: Uuid::now_v7(),
            name: "prod-slack".into(),
            kind: flowforge_core::ConnectionType::Slack,
            host: None,
            port: None,
            login: None,
            password: None,
            token: Some("xoxb".into()),
            extras: serde_json::json!({}),
        };
        repo.create(conn.clone()).await.unwrap();

        let mut dup = conn;
        dup.id = Uuid::now_v7();
        assert!(repo.create(dup).await.is_err());
    }
}
