//! DAG execution engine (spec's central node-by-node scheduler).
//!
//! Every node in the non-loop subgraph runs as its own tokio task. A node
//! waits on a `tokio::sync::watch` "done" signal for each of its parents,
//! then checks whether any incoming edge was satisfied (parent status
//! matched the edge's trigger rule, and the edge's `condition` — if any —
//! resolved truthy) before dispatching. Back-edges are replayed by a
//! separate loop controller once the forward pass completes.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{watch, RwLock};
use tracing::{info, warn};

use uuid::Uuid;

use flowforge_core::error::Result;
use flowforge_core::template::ArtifactMap;
use flowforge_core::{
    Dag, EdgeDefinition, Event, EventBus, NodeRunRecord, NodeRunStatus, RunRecord, RunStatus,
    Session, SessionStatus, TriggerRule, WorkflowDefinition,
};

use crate::dispatcher::{NodeDispatcher, NodeOutcome};

/// Per-node bookkeeping shared across the tokio tasks that execute a
/// single run.
struct RunState {
    artifacts: RwLock<ArtifactMap>,
    statuses: RwLock<HashMap<String, NodeRunStatus>>,
    done_tx: HashMap<String, watch::Sender<bool>>,
}

impl RunState {
    fn new(workflow: &WorkflowDefinition, inputs: ArtifactMap) -> Self {
        let mut done_tx = HashMap::new();
        for node in &workflow.nodes {
            let (tx, _rx) = watch::channel(false);
            done_tx.insert(node.id.clone(), tx);
        }
        Self {
            artifacts: RwLock::new(inputs),
            statuses: RwLock::new(HashMap::new()),
            done_tx,
        }
    }

    fn receiver(&self, node_id: &str) -> watch::Receiver<bool> {
        self.done_tx.get(node_id).expect("known node").subscribe()
    }

    fn mark_done(&self, node_id: &str) {
        let _ = self.done_tx.get(node_id).expect("known node").send(true);
    }

    fn reset(&self, node_id: &str) {
        let _ = self.done_tx.get(node_id).expect("known node").send(false);
    }
}

pub struct WorkflowRunner {
    dispatcher: Arc<NodeDispatcher>,
    events: EventBus,
}

impl WorkflowRunner {
    pub fn new(dispatcher: Arc<NodeDispatcher>, events: EventBus) -> Self {
        Self { dispatcher, events }
    }

    /// Execute the workflow to completion, mutating `session` and `run` in
    /// place. Node execution order respects the DAG's topology; back-edges
    /// are replayed up to their configured `max_iterations`.
    pub async fn execute(
        &self,
        workflow: &WorkflowDefinition,
        session: &mut Session,
        run: &mut RunRecord,
    ) -> Result<()> {
        let dag = Dag::build(workflow)?;
        let inputs = session.artifacts.clone();
        let state = Arc::new(RunState::new(workflow, inputs));

        self.run_forward_pass(&dag, &state, run.id).await?;
        self.run_loop_controllers(&dag, &state, run.id).await?;

        let artifacts = state.artifacts.read().await.clone();
        let statuses = state.statuses.read().await.clone();

        session.artifacts = artifacts.clone();
        for (node_id, node_artifacts) in &artifacts {
            session.record_artifacts(node_id, node_artifacts.clone());
        }

        for (node_id, status) in &statuses {
            run.node_runs.push(NodeRunRecord {
                node_id: node_id.clone(),
                status: *status,
                started_at: run.created_at,
                completed_at: Some(chrono::Utc::now()),
                error: None,
                retry_count: 0,
            });
        }

        let any_failed = statuses.values().any(|s| *s == NodeRunStatus::Failed);
        if any_failed {
            run.finish(RunStatus::Failed, Some("one or more nodes failed".to_string()));
            session.finish(SessionStatus::Failed);
        } else {
            run.finish(RunStatus::Success, None);
            session.finish(SessionStatus::Completed);
        }

        Ok(())
    }

    async fn run_forward_pass(&self, dag: &Dag, state: &Arc<RunState>, run_id: Uuid) -> Result<()> {
        let mut handles = Vec::new();
        for node_id in dag.topological_order() {
            let dispatcher = self.dispatcher.clone();
            let events = self.events.clone();
            let state = state.clone();
            let dag = dag.clone();
            let node_id = node_id.clone();

            handles.push(tokio::spawn(async move {
                Self::execute_one(&dag, &state, &events, &dispatcher, &node_id, run_id).await;
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
        Ok(())
    }

    async fn execute_one(
        dag: &Dag,
        state: &Arc<RunState>,
        events: &EventBus,
        dispatcher: &NodeDispatcher,
        node_id: &str,
        run_id: Uuid,
    ) {
        let parents = dag.parents(node_id).to_vec();
        for parent in &parents {
            let mut rx = state.receiver(&parent.from);
            while !*rx.borrow() {
                if rx.changed().await.is_err() {
                    break;
                }
            }
        }

        let satisfied = Self::satisfied_edge(&parents, state).await;
        let should_run = parents.is_empty() || satisfied.is_some();

        let node = dag.node(node_id).expect("known node");
        events.publish(Event::node_started(run_id, node_id));

        if !should_run {
            events.publish(Event::node_skipped(run_id, node_id));
            state.statuses.write().await.insert(node_id.to_string(), NodeRunStatus::Skipped);
            state.mark_done(node_id);
            return;
        }

        let inputs = state.artifacts.read().await.clone();
        match dispatcher.dispatch(node, &inputs).await {
            Ok(NodeOutcome::Completed(artifacts)) => {
                state.artifacts.write().await.insert(node_id.to_string(), artifacts);
                state.statuses.write().await.insert(node_id.to_string(), NodeRunStatus::Completed);
                events.publish(Event::node_completed(run_id, node_id));
            }
            Ok(NodeOutcome::Suspended) => {
                state.statuses.write().await.insert(node_id.to_string(), NodeRunStatus::Running);
                events.publish(Event::node_waiting(run_id, node_id));
            }
            Err(err) => {
                warn!(node_id, error = %err, "node dispatch failed");
                state.statuses.write().await.insert(node_id.to_string(), NodeRunStatus::Failed);
                events.publish(Event::node_error(run_id, node_id, err.to_string()));
            }
        }
        state.mark_done(node_id);
    }

    /// Returns the first incoming edge whose trigger rule and condition are
    /// both satisfied, or `None` if the node should be skipped.
    async fn satisfied_edge(parents: &[EdgeDefinition], state: &RunState) -> Option<EdgeDefinition> {
        let statuses = state.statuses.read().await;
        let artifacts = state.artifacts.read().await;
        for edge in parents {
            let parent_status = statuses.get(&edge.from).copied().unwrap_or(NodeRunStatus::Skipped);
            let rule_ok = match edge.trigger_rule {
                TriggerRule::OnSuccess => parent_status == NodeRunStatus::Completed,
                TriggerRule::OnFailure => parent_status == NodeRunStatus::Failed,
                TriggerRule::Always => true,
            };
            if !rule_ok {
                continue;
            }
            let condition_ok = match &edge.condition {
                Some(expr) => flowforge_core::expr::eval_bool(expr, &artifacts).unwrap_or(false),
                None => true,
            };
            if condition_ok {
                return Some(edge.clone());
            }
        }
        None
    }

    /// Replay each back-edge's cycle up to `max_iterations` times, stopping
    /// early once `exit_when` resolves truthy.
    async fn run_loop_controllers(&self, dag: &Dag, state: &Arc<RunState>, run_id: Uuid) -> Result<()> {
        for back_edge in dag.back_edges() {
            let Some(loop_config) = &back_edge.r#loop else { continue };
            let cycle = dag.cycle_nodes(&back_edge.to, &back_edge.from);

            for iteration in 0..loop_config.max_iterations {
                let artifacts = state.artifacts.read().await.clone();
                if flowforge_core::expr::eval_bool(&loop_config.exit_when, &artifacts).unwrap_or(false) {
                    info!(%run_id, iterations = iteration, "loop exit condition satisfied");
                    break;
                }

                for node_id in &cycle {
                    state.reset(node_id);
                }

                let order: Vec<String> = dag
                    .topological_order()
                    .iter()
                    .filter(|id| cycle.contains(id.as_str()))
                    .cloned()
                    .collect();

                for node_id in &order {
                    Self::execute_one(dag, state, &self.events, &self.dispatcher, node_id, run_id).await;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::EchoLlmProvider;
    use crate::tool::ToolRegistry;
    use flowforge_core::{EdgeDefinition, NodeDefinition, NodeKind, TriggerType};
    use serde_json::json;

    fn linear_workflow() -> WorkflowDefinition {
        WorkflowDefinition {
            name: "wf".into(),
            version: 1,
            nodes: vec![
                NodeDefinition { id: "in".into(), kind: NodeKind::Input, config: json!({}) },
                NodeDefinition { id: "out".into(), kind: NodeKind::Output, config: json!({}) },
            ],
            edges: vec![EdgeDefinition {
                from: "in".into(),
                to: "out".into(),
                trigger_rule: TriggerRule::OnSuccess,
                condition: None,
                r#loop: None,
            }],
            groups: vec![],
        }
    }

    #[tokio::test]
    async fn a_linear_workflow_completes_successfully() {
        let dispatcher = Arc::new(NodeDispatcher::new(ToolRegistry::new(), Arc::new(EchoLlmProvider)));
        let runner = WorkflowRunner::new(dispatcher, EventBus::new());
        let workflow = linear_workflow();
        let mut session = Session::new("wf");
        let mut run = RunRecord::new("wf", TriggerType::Manual, None, serde_json::Value::Null);

        runner.execute(&workflow, &mut session, &mut run).await.unwrap();

        assert_eq!(run.status, RunStatus::Success);
        assert_eq!(session.status, SessionStatus::Completed);
        assert!(session.artifacts.contains_key("out"));
    }

    #[tokio::test]
    async fn a_branch_not_satisfying_its_condition_skips_the_child() {
        let dispatcher = Arc::new(NodeDispatcher::new(ToolRegistry::new(), Arc::new(EchoLlmProvider)));
        let runner = WorkflowRunner::new(dispatcher, EventBus::new());
        let workflow = WorkflowDefinition {
            name: "wf".into(),
            version: 1,
            nodes: vec![
                NodeDefinition { id: "in".into(), kind: NodeKind::Input, config: json!({}) },
                NodeDefinition { id: "out".into(), kind: NodeKind::Output, config: json!({}) },
            ],
            edges: vec![EdgeDefinition {
                from: "in".into(),
                to: "out".into(),
                trigger_rule: TriggerRule::OnSuccess,
                condition: Some("false".into()),
                r#loop: None,
            }],
            groups: vec![],
        };
        let mut session = Session::new("wf");
        let mut run = RunRecord::new("wf", TriggerType::Manual, None, serde_json::Value::Null);

        runner.execute(&workflow, &mut session, &mut run).await.unwrap();

        assert!(!session.artifacts.contains_key("out"));
    }
}
