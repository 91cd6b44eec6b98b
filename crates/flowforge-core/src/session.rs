//! Session — one execution's mutable state (spec §3).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

use crate::artifact::Artifact;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
    Paused,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Paused => "paused",
        };
        write!(f, "{s}")
    }
}

/// A single execution's mutable state. Owned by the workflow runner,
/// mutated only via the session manager (serialized — see
/// `flowforge-runner::session_manager`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct Session {
    pub id: Uuid,
    pub workflow_name: String,
    /// Convenience mirror of `artifacts` for quick per-node scalar lookups;
    /// not a second execution path (spec §9 open question #1).
    #[serde(default)]
    pub state: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub artifacts: HashMap<String, Vec<Artifact>>,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(workflow_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            workflow_name: workflow_name.into(),
            state: HashMap::new(),
            artifacts: HashMap::new(),
            status: SessionStatus::Running,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn record_artifacts(&mut self, node_id: &str, artifacts: Vec<Artifact>) {
        if let Some(first) = artifacts.first() {
            if let Some(text) = first.first_text() {
                self.state
                    .insert(node_id.to_string(), serde_json::Value::String(text.to_string()));
            } else if let Some(data) = first.first_data() {
                self.state.insert(node_id.to_string(), data.clone());
            }
        }
        self.artifacts.insert(node_id.to_string(), artifacts);
        self.updated_at = Utc::now();
    }

    pub fn finish(&mut self, status: SessionStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::Artifact;

    #[test]
    fn recording_artifacts_mirrors_first_text_into_state() {
        let mut session = Session::new("wf");
        session.record_artifacts("a", vec![Artifact::from_text("hello")]);
        assert_eq!(
            session.state.get("a"),
            Some(&serde_json::Value::String("hello".into()))
        );
        assert_eq!(session.artifacts.get("a").unwrap().len(), 1);
    }
}
