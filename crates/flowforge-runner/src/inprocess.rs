//! Wires the dispatcher, workflow runner, run manager, scheduler, and
//! pipeline runner into the single in-process execution backend used by
//! `flowforge-api` (grounded on the teacher's `InProcessRunner`, which ties
//! its workflow executor and active-run bookkeeping together the same way).

use std::sync::Arc;
use std::time::Duration;

use flowforge_core::event_bus::EventBus;
use flowforge_storage::{
    ConnectionRepository, PipelineRepository, PipelineRunRepository, RunRepository,
    ScheduleRepository, TriggerRepository, WorkflowRepository,
};

use crate::dispatcher::NodeDispatcher;
use crate::execution_handle::ExecutionHandles;
use crate::llm::LlmProvider;
use crate::pipeline_runner::PipelineRunner;
use crate::run_manager::RunManager;
use crate::scheduler::Scheduler;
use crate::tool::ToolRegistry;
use crate::workflow_runner::WorkflowRunner;

/// Every repository and execution component needed to serve the API and
/// run the scheduler, assembled once at process startup.
pub struct InProcessBackend {
    pub workflows: WorkflowRepository,
    pub runs: RunRepository,
    pub pipelines: PipelineRepository,
    pub pipeline_runs: PipelineRunRepository,
    pub schedules: ScheduleRepository,
    pub triggers: TriggerRepository,
    pub connections: ConnectionRepository,
    pub events: EventBus,
    pub handles: Arc<ExecutionHandles>,
    pub run_manager: Arc<RunManager>,
    pub pipeline_runner: Arc<PipelineRunner>,
    pub scheduler: Arc<Scheduler>,
}

impl InProcessBackend {
    pub fn build(tools: ToolRegistry, llm: Arc<dyn LlmProvider>, config: &flowforge_core::AppConfig) -> Self {
        let workflows = WorkflowRepository::new();
        let runs = RunRepository::new();
        let pipelines = PipelineRepository::new();
        let pipeline_runs = PipelineRunRepository::new();
        let schedules = ScheduleRepository::new();
        let triggers = TriggerRepository::new();
        let connections = ConnectionRepository::new();
        let events = EventBus::new();
        let handles = Arc::new(ExecutionHandles::new());

        let dispatcher = Arc::new(NodeDispatcher::new(tools, llm));
        let workflow_runner = Arc::new(WorkflowRunner::new(dispatcher, events.clone()));
        let run_manager = RunManager::new(
            workflows.clone(),
            runs.clone(),
            workflow_runner,
            config.scheduler.limits,
        );
        let pipeline_runner = PipelineRunner::new(
            pipelines.clone(),
            pipeline_runs.clone(),
            run_manager.clone(),
            handles.clone(),
        );
        let scheduler = Scheduler::new(
            schedules.clone(),
            run_manager.clone(),
            Some(pipeline_runner.clone()),
            Duration::from_secs(config.scheduler.poll_interval_secs),
        );

        Self {
            workflows,
            runs,
            pipelines,
            pipeline_runs,
            schedules,
            triggers,
            connections,
            events,
            handles,
            run_manager,
            pipeline_runner,
            scheduler,
        }
    }

    /// Sweep orphaned runs and start the scheduler's poll loop. Call once
    /// at process startup, after `build`.
    pub async fn start(&self) {
        self.run_manager.sweep_orphans().await;
        tokio::spawn(self.scheduler.clone().run());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::EchoLlmProvider;

    #[tokio::test]
    async fn backend_builds_and_starts_without_panicking() {
        let config = flowforge_core::AppConfig::default();
        let backend = InProcessBackend::build(ToolRegistry::new(), Arc::new(EchoLlmProvider), &config);
        backend.start().await;
        assert_eq!(backend.run_manager.active_count().await, 0);
    }
}
