//! Cron-driven dispatch loop (spec §4.8).
//!
//! Polls `ScheduleRepository::list_enabled()` on a fixed interval and fires
//! every schedule whose `next_run_at` has passed, then recomputes the next
//! occurrence from the cron expression in the schedule's own timezone.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::warn;

use flowforge_core::{Schedule, ScheduleTarget, TriggerType};
use flowforge_storage::ScheduleRepository;

use crate::pipeline_runner::PipelineRunner;
use crate::run_manager::RunManager;

pub struct Scheduler {
    schedules: ScheduleRepository,
    run_manager: Arc<RunManager>,
    pipeline_runner: Option<Arc<PipelineRunner>>,
    poll_interval: Duration,
}

impl Scheduler {
    pub fn new(
        schedules: ScheduleRepository,
        run_manager: Arc<RunManager>,
        pipeline_runner: Option<Arc<PipelineRunner>>,
        poll_interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self { schedules, run_manager, pipeline_runner, poll_interval })
    }

    /// Run the poll loop until cancelled. Intended to be spawned as its own
    /// tokio task at process startup.
    pub async fn run(self: Arc<Self>) {
        loop {
            self.tick().await;
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// One poll pass, exposed separately so tests can drive it without
    /// sleeping.
    pub async fn tick(&self) {
        let now = Utc::now();
        for schedule in self.schedules.list_enabled().await {
            if schedule.next_run_at <= now {
                self.fire(schedule, now).await;
            }
        }
    }

    async fn fire(&self, mut schedule: Schedule, now: DateTime<Utc>) {
        match &schedule.target {
            ScheduleTarget::Workflow { workflow_name } => {
                let result = self
                    .run_manager
                    .start_run(
                        workflow_name,
                        TriggerType::Cron,
                        Some(schedule.id.to_string()),
                        schedule.inputs.clone(),
                    )
                    .await;
                if let Err(err) = result {
                    warn!(schedule_id = %schedule.id, error = %err, "scheduled workflow run failed admission");
                }
            }
            ScheduleTarget::Pipeline { pipeline_id } => match &self.pipeline_runner {
                Some(runner) => {
                    if let Err(err) = runner.start(*pipeline_id, schedule.inputs.clone()).await {
                        warn!(schedule_id = %schedule.id, error = %err, "scheduled pipeline run failed to start");
                    }
                }
                None => warn!(schedule_id = %schedule.id, "no pipeline runner configured; skipping"),
            },
        }

        schedule.last_run_at = Some(now);
        schedule.next_run_at = Self::compute_next(&schedule, now).unwrap_or(now + chrono::Duration::minutes(1));
        let _ = self.schedules.put(schedule).await;
    }

    fn compute_next(schedule: &Schedule, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let cron_schedule = cron::Schedule::from_str(&schedule.cron_expr).ok()?;
        let tz = chrono_tz::Tz::from_str(&schedule.timezone).ok()?;
        let after_in_tz = after.with_timezone(&tz);
        let next = cron_schedule.after(&after_in_tz).next()?;
        Some(next.with_timezone(&Utc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::NodeDispatcher;
    use crate::llm::EchoLlmProvider;
    use crate::tool::ToolRegistry;
    use crate::workflow_runner::WorkflowRunner;
    use flowforge_core::event_bus::EventBus;
    use flowforge_core::{ConcurrencyLimits, EdgeDefinition, NodeDefinition, NodeKind, TriggerRule};
    use flowforge_storage::{RunRepository, WorkflowRepository};

    fn linear_workflow(name: &str) -> flowforge_core::WorkflowDefinition {
        flowforge_core::WorkflowDefinition {
            name: name.into(),
            version: 1,
            nodes: vec![
                NodeDefinition { id: "in".into(), kind: NodeKind::Input, config: serde_json::json!({}) },
                NodeDefinition { id: "out".into(), kind: NodeKind::Output, config: serde_json::json!({}) },
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
    async fn a_due_schedule_fires_and_advances_its_next_run_time() {
        let workflows = WorkflowRepository::new();
        workflows.upsert(linear_workflow("wf")).await.unwrap();
        let runs = RunRepository::new();
        let dispatcher = Arc::new(NodeDispatcher::new(ToolRegistry::new(), Arc::new(EchoLlmProvider)));
        let runner = Arc::new(WorkflowRunner::new(dispatcher, EventBus::new()));
        let run_manager = RunManager::new(workflows, runs, runner, ConcurrencyLimits::default());

        let schedules = ScheduleRepository::new();
        let mut schedule = Schedule::new(
            ScheduleTarget::Workflow { workflow_name: "wf".into() },
            "* * * * * *",
            "UTC",
            Utc::now() - chrono::Duration::seconds(1),
        )
        .unwrap();
        schedule.inputs = serde_json::json!({});
        let schedule_id = schedule.id;
        schedules.put(schedule).await;

        let scheduler = Scheduler::new(schedules.clone(), run_manager, None, Duration::from_secs(60));
        scheduler.tick().await;

        let updated = schedules.get(schedule_id).await.unwrap();
        assert!(updated.last_run_at.is_some());
        assert!(updated.next_run_at > Utc::now());
    }
}
