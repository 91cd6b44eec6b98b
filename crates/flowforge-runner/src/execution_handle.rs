//! Suspend/resume handles for `approval`-kind nodes and pipeline approval
//! stages. A suspended unit of work parks on a `tokio::sync::oneshot`
//! receiver keyed by `(run_id, waypoint)`; resuming looks up the sender and
//! completes it.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::oneshot;
use uuid::Uuid;

use flowforge_core::error::{FlowError, Result};

#[derive(Debug, Clone)]
pub enum ApprovalDecision {
    Approved(serde_json::Value),
    Rejected(String),
}

type Waypoint = (Uuid, String);

#[derive(Default)]
pub struct ExecutionHandles {
    waiting: Mutex<HashMap<Waypoint, oneshot::Sender<ApprovalDecision>>>,
}

impl ExecutionHandles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new suspension point, returning the receiver the
    /// suspended task should await.
    pub fn register(&self, run_id: Uuid, waypoint: impl Into<String>) -> oneshot::Receiver<ApprovalDecision> {
        let (tx, rx) = oneshot::channel();
        self.waiting
            .lock()
            .expect("execution handles lock poisoned")
            .insert((run_id, waypoint.into()), tx);
        rx
    }

    /// Resume a suspended waypoint. Errors with `NotWaiting` if nothing is
    /// parked at that key (already resumed, never suspended, or a typo).
    pub fn resume(&self, run_id: Uuid, waypoint: &str, decision: ApprovalDecision) -> Result<()> {
        let sender = self
            .waiting
            .lock()
            .expect("execution handles lock poisoned")
            .remove(&(run_id, waypoint.to_string()))
            .ok_or_else(|| FlowError::NotWaiting(format!("{run_id}/{waypoint}")))?;
        sender
            .send(decision)
            .map_err(|_| FlowError::Internal(anyhow::anyhow!("suspended task dropped its receiver")))
    }

    pub fn is_waiting(&self, run_id: Uuid, waypoint: &str) -> bool {
        self.waiting
            .lock()
            .expect("execution handles lock poisoned")
            .contains_key(&(run_id, waypoint.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resume_delivers_the_decision_to_the_waiting_receiver() {
        let handles = ExecutionHandles::new();
        let run_id = Uuid::now_v7();
        let rx = handles.register(run_id, "node-1");
        assert!(handles.is_waiting(run_id, "node-1"));

        handles
            .resume(run_id, "node-1", ApprovalDecision::Approved(serde_json::json!({"ok": true})))
            .unwrap();

        let decision = rx.await.unwrap();
        assert!(matches!(decision, ApprovalDecision::Approved(_)));
        assert!(!handles.is_waiting(run_id, "node-1"));
    }

    #[test]
    fn resuming_an_unregistered_waypoint_fails() {
        let handles = ExecutionHandles::new();
        let err = handles
            .resume(Uuid::now_v7(), "ghost", ApprovalDecision::Rejected("no".into()))
            .unwrap_err();
        assert!(matches!(err, FlowError::NotWaiting(_)));
    }
}
