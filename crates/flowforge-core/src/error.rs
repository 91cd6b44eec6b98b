//! Error taxonomy shared across the workspace.
//!
//! `FlowError` carries every error kind named in the specification's error
//! handling design. Dependent crates wrap it with `#[from]` and add
//! transport-local variants (HTTP status mapping, gRPC codes, ...).

use thiserror::Error;
use uuid::Uuid;

/// Result type alias used throughout the core crate.
pub type Result<T> = std::result::Result<T, FlowError>;

#[derive(Debug, Error)]
pub enum FlowError {
    /// Entity missing in a repository.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed definition: duplicate ID, bad edge, missing required config.
    #[error("validation error: {0}")]
    Validation(String),

    /// The non-loop subgraph of a workflow definition contains a cycle.
    #[error("graph contains a cycle")]
    GraphCycle,

    /// Concurrency limit reached and the admission context expired before a
    /// slot freed up.
    #[error("admission denied for workflow {workflow}: {reason}")]
    AdmissionDenied { workflow: String, reason: String },

    /// A node's dispatch failed.
    #[error("node {node_id} failed: {cause}")]
    NodeError { node_id: String, cause: String },

    /// Malformed template reference surfaced during explicit evaluation
    /// (branch expressions, loop `exit_when`). Template substitution itself
    /// never errors — unknown keys are left verbatim.
    #[error("template error: {0}")]
    Template(String),

    /// LLM provider adapter failed.
    #[error("provider error: {0}")]
    Provider(String),

    /// Local tool execution returned an error.
    #[error("tool error: {0}")]
    Tool(String),

    /// `resume` was called for a node/stage that is not currently suspended.
    #[error("not waiting: {0}")]
    NotWaiting(String),

    /// Approval, LLM call, or subprocess exceeded its configured limit.
    #[error("timeout after {0:?}")]
    Timeout(std::time::Duration),

    /// A run record's status was `running` at process startup and was swept
    /// to `failed`.
    #[error("run {0} orphaned by process restart")]
    Orphaned(Uuid),

    /// Execution was cancelled.
    #[error("cancelled")]
    Cancelled,

    /// Anything else — wrapped so call sites can still use `?`.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl FlowError {
    pub fn not_found(what: impl Into<String>) -> Self {
        FlowError::NotFound(what.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        FlowError::Validation(msg.into())
    }

    pub fn node(node_id: impl Into<String>, cause: impl Into<String>) -> Self {
        FlowError::NodeError {
            node_id: node_id.into(),
            cause: cause.into(),
        }
    }

    pub fn admission_denied(workflow: impl Into<String>, reason: impl Into<String>) -> Self {
        FlowError::AdmissionDenied {
            workflow: workflow.into(),
            reason: reason.into(),
        }
    }

    /// Whether a run-manager retry should be attempted for this error.
    /// `ValidationError` and `NotFound` are not retriable — retrying a
    /// malformed definition can never succeed.
    pub fn is_retriable(&self) -> bool {
        !matches!(self, FlowError::Validation(_) | FlowError::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_and_not_found_are_not_retriable() {
        assert!(!FlowError::validation("bad").is_retriable());
        assert!(!FlowError::not_found("x").is_retriable());
    }

    #[test]
    fn node_errors_are_retriable() {
        assert!(FlowError::node("n1", "boom").is_retriable());
        assert!(FlowError::Provider("rate limited".into()).is_retriable());
    }
}
