//! Event protocol.
//!
//! All events follow a consistent structure: id, type, ts, run_id, context,
//! data. Events are best-effort and live — the durable `RunRecord` remains
//! the authoritative record (spec §1, §4.1).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

// ============================================================================
// Event type constants (used as the SSE `event:` line per spec §6)
// ============================================================================

pub const NODE_STARTED: &str = "node.started";
pub const NODE_COMPLETED: &str = "node.completed";
pub const NODE_ERROR: &str = "node.error";
pub const NODE_WAITING: &str = "node.waiting";
pub const NODE_RESUMED: &str = "node.resumed";
pub const NODE_SKIPPED: &str = "node.skipped";
pub const TOOL_CALL: &str = "tool.call";
pub const TOOL_RESULT: &str = "tool.result";
pub const STAGE_WAITING: &str = "stage.waiting";
pub const STAGE_COMPLETED: &str = "stage.completed";
pub const DONE: &str = "done";

// ============================================================================
// Event context
// ============================================================================

/// Correlation context for an event.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct EventContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage_id: Option<String>,
}

impl EventContext {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn for_node(node_id: impl Into<String>) -> Self {
        Self {
            node_id: Some(node_id.into()),
            stage_id: None,
        }
    }

    pub fn for_stage(stage_id: impl Into<String>) -> Self {
        Self {
            node_id: None,
            stage_id: Some(stage_id.into()),
        }
    }
}

// ============================================================================
// Event
// ============================================================================

/// A single event in a run's (or pipeline run's) timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct Event {
    /// Unique event identifier (UUID v7, monotonically increasing).
    pub id: Uuid,

    /// Event type in dot notation, e.g. "node.started".
    #[serde(rename = "type")]
    pub event_type: String,

    pub ts: DateTime<Utc>,

    /// Run (or pipeline run) this event belongs to.
    pub run_id: Uuid,

    pub context: EventContext,

    pub data: serde_json::Value,
}

impl Event {
    pub fn new(
        event_type: impl Into<String>,
        run_id: Uuid,
        context: EventContext,
        data: impl Serialize,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            event_type: event_type.into(),
            ts: Utc::now(),
            run_id,
            context,
            data: serde_json::to_value(data).unwrap_or(serde_json::Value::Null),
        }
    }

    pub fn node_started(run_id: Uuid, node_id: impl Into<String>) -> Self {
        let node_id = node_id.into();
        Self::new(
            NODE_STARTED,
            run_id,
            EventContext::for_node(node_id.clone()),
            serde_json::json!({ "node_id": node_id }),
        )
    }

    pub fn node_completed(run_id: Uuid, node_id: impl Into<String>) -> Self {
        let node_id = node_id.into();
        Self::new(
            NODE_COMPLETED,
            run_id,
            EventContext::for_node(node_id.clone()),
            serde_json::json!({ "node_id": node_id }),
        )
    }

    pub fn node_skipped(run_id: Uuid, node_id: impl Into<String>) -> Self {
        let node_id = node_id.into();
        Self::new(
            NODE_SKIPPED,
            run_id,
            EventContext::for_node(node_id.clone()),
            serde_json::json!({ "node_id": node_id }),
        )
    }

    pub fn node_error(run_id: Uuid, node_id: impl Into<String>, cause: impl Into<String>) -> Self {
        let node_id = node_id.into();
        Self::new(
            NODE_ERROR,
            run_id,
            EventContext::for_node(node_id.clone()),
            serde_json::json!({ "node_id": node_id, "error": cause.into() }),
        )
    }

    pub fn node_waiting(run_id: Uuid, node_id: impl Into<String>) -> Self {
        let node_id = node_id.into();
        Self::new(
            NODE_WAITING,
            run_id,
            EventContext::for_node(node_id.clone()),
            serde_json::json!({ "node_id": node_id }),
        )
    }

    pub fn node_resumed(run_id: Uuid, node_id: impl Into<String>) -> Self {
        let node_id = node_id.into();
        Self::new(
            NODE_RESUMED,
            run_id,
            EventContext::for_node(node_id.clone()),
            serde_json::json!({ "node_id": node_id }),
        )
    }

    pub fn done(run_id: Uuid, status: impl Into<String>) -> Self {
        Self::new(
            DONE,
            run_id,
            EventContext::empty(),
            serde_json::json!({ "status": status.into() }),
        )
    }
}
