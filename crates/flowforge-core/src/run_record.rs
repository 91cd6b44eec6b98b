//! Durable provenance for an execution (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Manual,
    Cron,
    Webhook,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Success,
    Failed,
    Cancelled,
    Retrying,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Success | RunStatus::Failed | RunStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum NodeRunStatus {
    Running,
    Completed,
    Failed,
    Skipped,
}

/// Per-node outcome recorded on a `RunRecord` (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct NodeRunRecord {
    pub node_id: String,
    pub status: NodeRunStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
}

/// Durable provenance for one execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct RunRecord {
    pub id: Uuid,
    pub workflow_name: String,
    pub trigger_type: TriggerType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_ref: Option<String>,
    pub status: RunStatus,
    pub inputs: Value,
    #[serde(default)]
    pub outputs: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_of: Option<Uuid>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub node_runs: Vec<NodeRunRecord>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl RunRecord {
    pub fn new(
        workflow_name: impl Into<String>,
        trigger_type: TriggerType,
        trigger_ref: Option<String>,
        inputs: Value,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            workflow_name: workflow_name.into(),
            trigger_type,
            trigger_ref,
            status: RunStatus::Pending,
            inputs,
            outputs: Value::Null,
            error: None,
            retry_of: None,
            retry_count: 0,
            node_runs: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Build a linked retry record sharing the retry chain's origin.
    pub fn retry(&self) -> Self {
        let mut record = Self::new(
            self.workflow_name.clone(),
            self.trigger_type,
            self.trigger_ref.clone(),
            self.inputs.clone(),
        );
        record.retry_of = Some(self.retry_of.unwrap_or(self.id));
        record.retry_count = self.retry_count + 1;
        record
    }

    pub fn mark_running(&mut self) {
        self.status = RunStatus::Running;
        self.started_at.get_or_insert_with(Utc::now);
    }

    /// Derives the run's terminal status from its recorded node outcomes
    /// (spec §8 invariant 5: any `error` implies `failed`, else `success`).
    pub fn finish(&mut self, status: RunStatus, error: Option<String>) {
        self.status = status;
        self.error = error;
        self.completed_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_links_back_to_the_original_run() {
        let original = RunRecord::new("wf", TriggerType::Manual, None, Value::Null);
        let first_retry = original.retry();
        assert_eq!(first_retry.retry_of, Some(original.id));
        assert_eq!(first_retry.retry_count, 1);

        let second_retry = first_retry.retry();
        assert_eq!(second_retry.retry_of, Some(original.id));
        assert_eq!(second_retry.retry_count, 2);
    }

    #[test]
    fn terminal_statuses() {
        assert!(RunStatus::Success.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(!RunStatus::Pending.is_terminal());
    }
}
