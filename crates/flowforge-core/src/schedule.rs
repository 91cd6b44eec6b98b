//! Schedule — cron-driven recurring execution (spec §3, §4.8).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

use crate::error::{FlowError, Result};
use crate::retry::RetryPolicy;

/// Exactly one of `workflow_name` / `pipeline_id` is set (spec §3 invariant).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ScheduleTarget {
    Workflow { workflow_name: String },
    Pipeline { pipeline_id: Uuid },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct Schedule {
    pub id: Uuid,
    pub target: ScheduleTarget,
    pub cron_expr: String,
    pub timezone: String,
    #[serde(default)]
    pub inputs: serde_json::Value,
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<RetryPolicy>,
    pub next_run_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<DateTime<Utc>>,
}

impl Schedule {
    pub fn new(
        target: ScheduleTarget,
        cron_expr: impl Into<String>,
        timezone: impl Into<String>,
        next_run_at: DateTime<Utc>,
    ) -> Result<Self> {
        let cron_expr = cron_expr.into();
        let timezone = timezone.into();
        if cron_expr.trim().is_empty() {
            return Err(FlowError::validation("cron_expr must not be empty"));
        }
        Ok(Self {
            id: Uuid::now_v7(),
            target,
            cron_expr,
            timezone,
            inputs: serde_json::Value::Null,
            enabled: true,
            retry_policy: None,
            next_run_at,
            last_run_at: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_cron_expression() {
        let result = Schedule::new(
            ScheduleTarget::Workflow {
                workflow_name: "wf".into(),
            },
            "",
            "UTC",
            Utc::now(),
        );
        assert!(result.is_err());
    }
}
