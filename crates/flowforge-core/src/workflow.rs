//! Workflow definition data model (spec §3).

use serde::{Deserialize, Serialize};

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// The kind of a node, dispatched polymorphically by the node dispatcher
/// (spec §4.6). New kinds are added by registering a handler, not by
/// changing this enum's consumers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Input,
    Agent,
    Tool,
    Output,
    Branch,
    Iterator,
    Subworkflow,
    Approval,
    Notification,
    Sensor,
}

/// A single node in a workflow DAG. `config` is free-form; required keys
/// depend on `kind` (spec §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct NodeDefinition {
    pub id: String,
    pub kind: NodeKind,
    #[serde(default)]
    pub config: serde_json::Value,
}

/// Trigger rule gating whether an edge "fires" given the parent's outcome
/// (spec §4.5).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum TriggerRule {
    #[default]
    OnSuccess,
    OnFailure,
    Always,
}

/// Bounded re-entry configuration for a back-edge (spec §3, §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct LoopConfig {
    pub max_iterations: u32,
    /// Template expression; truthy result stops re-arming the cycle.
    pub exit_when: String,
}

/// An edge between two nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct EdgeDefinition {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub trigger_rule: TriggerRule,
    /// Template/expression condition; must be truthy (after resolution) for
    /// this edge to be "satisfied".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Present only on back-edges — excludes this edge from the topological
    /// order (spec §3, §4.3).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#loop: Option<LoopConfig>,
}

impl EdgeDefinition {
    pub fn is_back_edge(&self) -> bool {
        self.r#loop.is_some()
    }
}

/// Purely organizational grouping of nodes — carried through for authoring
/// UIs, not interpreted by the execution engine.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct NodeGroup {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub node_ids: Vec<String>,
}

/// A workflow definition: the unit persisted and versioned by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct WorkflowDefinition {
    pub name: String,
    pub version: u32,
    pub nodes: Vec<NodeDefinition>,
    pub edges: Vec<EdgeDefinition>,
    #[serde(default)]
    pub groups: Vec<NodeGroup>,
}

impl WorkflowDefinition {
    /// Structural validation beyond what the DAG builder checks: node ID
    /// uniqueness, edge endpoint resolution, and the presence of at least
    /// one input-kind and one output-kind node (spec §3's invariants).
    /// Acyclicity of the non-loop subgraph is checked by `dag::Dag::build`.
    pub fn validate_shape(&self) -> crate::error::Result<()> {
        use crate::error::FlowError;
        use std::collections::HashSet;

        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.id.as_str()) {
                return Err(FlowError::validation(format!(
                    "duplicate node id '{}'",
                    node.id
                )));
            }
        }

        for edge in &self.edges {
            if !seen.contains(edge.from.as_str()) {
                return Err(FlowError::validation(format!(
                    "edge references unknown node '{}'",
                    edge.from
                )));
            }
            if !seen.contains(edge.to.as_str()) {
                return Err(FlowError::validation(format!(
                    "edge references unknown node '{}'",
                    edge.to
                )));
            }
        }

        if !self.nodes.iter().any(|n| n.kind == NodeKind::Input) {
            return Err(FlowError::validation(
                "workflow must have at least one input-kind node",
            ));
        }
        if !self.nodes.iter().any(|n| n.kind == NodeKind::Output) {
            return Err(FlowError::validation(
                "workflow must have at least one output-kind node",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, kind: NodeKind) -> NodeDefinition {
        NodeDefinition {
            id: id.to_string(),
            kind,
            config: serde_json::Value::Null,
        }
    }

    fn edge(from: &str, to: &str) -> EdgeDefinition {
        EdgeDefinition {
            from: from.to_string(),
            to: to.to_string(),
            trigger_rule: TriggerRule::OnSuccess,
            condition: None,
            r#loop: None,
        }
    }

    #[test]
    fn rejects_duplicate_node_ids() {
        let wf = WorkflowDefinition {
            name: "wf".into(),
            version: 1,
            nodes: vec![node("a", NodeKind::Input), node("a", NodeKind::Output)],
            edges: vec![],
            groups: vec![],
        };
        assert!(wf.validate_shape().is_err());
    }

    #[test]
    fn rejects_missing_input_or_output_kind() {
        let wf = WorkflowDefinition {
            name: "wf".into(),
            version: 1,
            nodes: vec![node("a", NodeKind::Tool)],
            edges: vec![],
            groups: vec![],
        };
        assert!(wf.validate_shape().is_err());
    }

    #[test]
    fn rejects_dangling_edge_endpoint() {
        let wf = WorkflowDefinition {
            name: "wf".into(),
            version: 1,
            nodes: vec![node("a", NodeKind::Input), node("b", NodeKind::Output)],
            edges: vec![edge("a", "ghost")],
            groups: vec![],
        };
        assert!(wf.validate_shape().is_err());
    }

    #[test]
    fn accepts_a_minimal_valid_workflow() {
        let wf = WorkflowDefinition {
            name: "wf".into(),
            version: 1,
            nodes: vec![node("a", NodeKind::Input), node("b", NodeKind::Output)],
            edges: vec![edge("a", "b")],
            groups: vec![],
        };
        assert!(wf.validate_shape().is_ok());
    }
}
