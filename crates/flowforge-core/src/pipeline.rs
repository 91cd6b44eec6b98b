//! Pipeline — multi-stage composition of workflow runs, approval gates,
//! schedules, triggers, and data transforms (spec §3, §4.9).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum StageType {
    Workflow,
    Approval,
    Schedule,
    Trigger,
    Transform,
    Collect,
    Notification,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Waiting,
    Completed,
    Failed,
    Skipped,
}

/// A single step of a pipeline. `config` fields are type-specific (spec
/// §6): `workflow_name` + `input_mapping` for `workflow`, `timeout` for
/// `approval`, `expression` for `transform`, `sources` for `collect`,
/// `connection_id` + `message` for `notification`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct Stage {
    /// Sequential `stage-N` identifier.
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub stage_type: StageType,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct Pipeline {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub stages: Vec<Stage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>, description: impl Into<String>, stages: Vec<Stage>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            description: description.into(),
            stages,
            created_at: now,
            updated_at: now,
        }
    }

    /// `depends_on` is a monotonicity check: every stage named in
    /// `depends_on` must appear earlier in `stages` (spec §4.9).
    pub fn validate_dependency_order(&self) -> crate::error::Result<()> {
        use crate::error::FlowError;
        use std::collections::HashSet;

        let mut seen = HashSet::new();
        for stage in &self.stages {
            for dep in &stage.depends_on {
                if !seen.contains(dep) {
                    return Err(FlowError::validation(format!(
                        "stage '{}' depends on '{}' which does not precede it",
                        stage.id, dep
                    )));
                }
            }
            seen.insert(stage.id.clone());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct StageResult {
    pub stage_id: String,
    pub status: StageStatus,
    #[serde(default)]
    pub output: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum PipelineRunStatus {
    Pending,
    Running,
    Waiting,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct PipelineRun {
    pub id: Uuid,
    pub pipeline_id: Uuid,
    pub status: PipelineRunStatus,
    /// The most recent non-completed stage's ID (spec §4.9).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<String>,
    #[serde(default)]
    pub stage_results: HashMap<String, StageResult>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    pub fn new(pipeline_id: Uuid) -> Self {
        Self {
            id: Uuid::now_v7(),
            pipeline_id,
            status: PipelineRunStatus::Pending,
            current_stage: None,
            stage_results: HashMap::new(),
            started_at: Utc::now(),
            completed_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(id: &str, depends_on: Vec<&str>) -> Stage {
        Stage {
            id: id.to_string(),
            name: id.to_string(),
            stage_type: StageType::Transform,
            config: serde_json::Value::Null,
            depends_on: depends_on.into_iter().map(String::from).collect(),
        }
    }

    #[test]
    fn dependency_must_precede_dependent_stage() {
        let pipeline = Pipeline::new(
            "p",
            "",
            vec![stage("stage-1", vec![]), stage("stage-2", vec!["stage-1"])],
        );
        assert!(pipeline.validate_dependency_order().is_ok());
    }

    #[test]
    fn forward_reference_is_rejected() {
        let pipeline = Pipeline::new(
            "p",
            "",
            vec![stage("stage-1", vec!["stage-2"]), stage("stage-2", vec![])],
        );
        assert!(pipeline.validate_dependency_order().is_err());
    }
}
