//! DAG builder (spec §4.3).
//!
//! Validates a `WorkflowDefinition` and computes an immutable topology:
//! node lookup, parent/child maps over non-loop edges, a topological order,
//! and the set of back-edges (loop edges, excluded from the order).

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use crate::error::{FlowError, Result};
use crate::workflow::{EdgeDefinition, NodeDefinition, WorkflowDefinition};

/// Immutable DAG computed from a `WorkflowDefinition`.
#[derive(Debug, Clone)]
pub struct Dag {
    nodes_by_id: HashMap<String, NodeDefinition>,
    children: HashMap<String, Vec<EdgeDefinition>>,
    parents: HashMap<String, Vec<EdgeDefinition>>,
    topological_order: Vec<String>,
    back_edges: Vec<EdgeDefinition>,
}

impl Dag {
    /// Build a DAG from a workflow definition.
    ///
    /// Tie-break for the topological order: nodes are popped from the
    /// Kahn ready-queue in ascending definition order (index into
    /// `workflow.nodes`), which is deterministic across a single build.
    pub fn build(workflow: &WorkflowDefinition) -> Result<Self> {
        workflow.validate_shape()?;

        let index_of: HashMap<&str, usize> = workflow
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.as_str(), i))
            .collect();

        let mut nodes_by_id = HashMap::new();
        for node in &workflow.nodes {
            if nodes_by_id.insert(node.id.clone(), node.clone()).is_some() {
                return Err(FlowError::validation(format!(
                    "duplicate node id '{}'",
                    node.id
                )));
            }
        }

        let mut children: HashMap<String, Vec<EdgeDefinition>> = HashMap::new();
        let mut parents: HashMap<String, Vec<EdgeDefinition>> = HashMap::new();
        let mut back_edges = Vec::new();
        let mut in_degree: HashMap<String, usize> =
            workflow.nodes.iter().map(|n| (n.id.clone(), 0)).collect();
        let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();

        for edge in &workflow.edges {
            if edge.is_back_edge() {
                back_edges.push(edge.clone());
                continue;
            }
            children
                .entry(edge.from.clone())
                .or_default()
                .push(edge.clone());
            parents
                .entry(edge.to.clone())
                .or_default()
                .push(edge.clone());
            adjacency
                .entry(edge.from.clone())
                .or_default()
                .push(edge.to.clone());
            *in_degree.entry(edge.to.clone()).or_insert(0) += 1;
        }

        // Kahn's algorithm; ready set ordered by definition index for a
        // deterministic tie-break.
        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(id, _)| index_of[id.as_str()])
            .collect();
        let mut in_degree_mut = in_degree;
        let mut order = Vec::with_capacity(workflow.nodes.len());

        while let Some(&idx) = ready.iter().next() {
            ready.remove(&idx);
            let id = workflow.nodes[idx].id.clone();
            order.push(id.clone());

            if let Some(neighbours) = adjacency.get(&id) {
                for neighbour in neighbours {
                    let deg = in_degree_mut.get_mut(neighbour).expect("known node");
                    *deg -= 1;
                    if *deg == 0 {
                        ready.insert(index_of[neighbour.as_str()]);
                    }
                }
            }
        }

        if order.len() != workflow.nodes.len() {
            return Err(FlowError::GraphCycle);
        }

        Ok(Self {
            nodes_by_id,
            children,
            parents,
            topological_order: order,
            back_edges,
        })
    }

    pub fn node(&self, id: &str) -> Option<&NodeDefinition> {
        self.nodes_by_id.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeDefinition> {
        self.nodes_by_id.values()
    }

    /// Non-loop outgoing edges from `id`.
    pub fn children(&self, id: &str) -> &[EdgeDefinition] {
        self.children.get(id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Non-loop incoming edges to `id`.
    pub fn parents(&self, id: &str) -> &[EdgeDefinition] {
        self.parents.get(id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn topological_order(&self) -> &[String] {
        &self.topological_order
    }

    pub fn back_edges(&self) -> &[EdgeDefinition] {
        &self.back_edges
    }

    pub fn is_root(&self, id: &str) -> bool {
        self.parents(id).is_empty()
    }

    /// Nodes reachable from `from` (inclusive) that can also reach `to`
    /// (inclusive), following only non-loop edges — the set re-armed when a
    /// back-edge `to -> from`-style cycle re-enters (spec §4.5: "reset
    /// signals on the cycle nodes").
    pub fn cycle_nodes(&self, from: &str, to: &str) -> HashSet<String> {
        let reachable_from = self.forward_reachable(from);
        let can_reach_to = self.backward_reachable(to);
        reachable_from
            .intersection(&can_reach_to)
            .cloned()
            .collect()
    }

    fn forward_reachable(&self, start: &str) -> HashSet<String> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([start.to_string()]);
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id.clone()) {
                continue;
            }
            for edge in self.children(&id) {
                queue.push_back(edge.to.clone());
            }
        }
        seen
    }

    fn backward_reachable(&self, start: &str) -> HashSet<String> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([start.to_string()]);
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id.clone()) {
                continue;
            }
            for edge in self.parents(&id) {
                queue.push_back(edge.from.clone());
            }
        }
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{LoopConfig, NodeKind, TriggerRule};

    fn node(id: &str, kind: NodeKind) -> NodeDefinition {
        NodeDefinition {
            id: id.to_string(),
            kind,
            config: serde_json::Value::Null,
        }
    }

    fn plain_edge(from: &str, to: &str) -> EdgeDefinition {
        EdgeDefinition {
            from: from.to_string(),
            to: to.to_string(),
            trigger_rule: TriggerRule::OnSuccess,
            condition: None,
            r#loop: None,
        }
    }

    #[test]
    fn linear_chain_has_length_equal_to_node_count() {
        let wf = WorkflowDefinition {
            name: "wf".into(),
            version: 1,
            nodes: vec![
                node("a", NodeKind::Input),
                node("b", NodeKind::Tool),
                node("c", NodeKind::Output),
            ],
            edges: vec![plain_edge("a", "b"), plain_edge("b", "c")],
            groups: vec![],
        };
        let dag = Dag::build(&wf).unwrap();
        assert_eq!(dag.topological_order(), &["a", "b", "c"]);
    }

    #[test]
    fn fan_out_fan_in_keeps_root_first_and_sink_last() {
        let wf = WorkflowDefinition {
            name: "wf".into(),
            version: 1,
            nodes: vec![
                node("a", NodeKind::Input),
                node("b", NodeKind::Tool),
                node("c", NodeKind::Tool),
                node("d", NodeKind::Output),
            ],
            edges: vec![
                plain_edge("a", "b"),
                plain_edge("a", "c"),
                plain_edge("b", "d"),
                plain_edge("c", "d"),
            ],
            groups: vec![],
        };
        let dag = Dag::build(&wf).unwrap();
        let order = dag.topological_order();
        assert_eq!(order.first().unwrap(), "a");
        assert_eq!(order.last().unwrap(), "d");
        assert_eq!(order.len(), 4);
        assert_eq!(dag.parents("d").len(), 2);
    }

    #[test]
    fn cycle_in_non_loop_subgraph_is_rejected() {
        let wf = WorkflowDefinition {
            name: "wf".into(),
            version: 1,
            nodes: vec![
                node("a", NodeKind::Input),
                node("b", NodeKind::Tool),
                node("c", NodeKind::Output),
            ],
            edges: vec![
                plain_edge("a", "b"),
                plain_edge("b", "c"),
                plain_edge("c", "a"),
            ],
            groups: vec![],
        };
        assert!(matches!(Dag::build(&wf), Err(FlowError::GraphCycle)));
    }

    #[test]
    fn loop_edges_are_excluded_from_topological_order_and_child_maps() {
        let wf = WorkflowDefinition {
            name: "wf".into(),
            version: 1,
            nodes: vec![
                node("a", NodeKind::Input),
                node("b", NodeKind::Tool),
                node("c", NodeKind::Output),
            ],
            edges: vec![
                plain_edge("a", "b"),
                plain_edge("b", "c"),
                EdgeDefinition {
                    from: "c".into(),
                    to: "b".into(),
                    trigger_rule: TriggerRule::Always,
                    condition: None,
                    r#loop: Some(LoopConfig {
                        max_iterations: 3,
                        exit_when: "{{c.data}} == 'stop'".into(),
                    }),
                },
            ],
            groups: vec![],
        };
        let dag = Dag::build(&wf).unwrap();
        assert_eq!(dag.topological_order().len(), 3);
        assert_eq!(dag.back_edges().len(), 1);
        assert!(dag.parents("b").iter().all(|e| e.from != "c"));
    }

    #[test]
    fn cycle_nodes_covers_the_bounded_re_entry_set() {
        let wf = WorkflowDefinition {
            name: "wf".into(),
            version: 1,
            nodes: vec![
                node("a", NodeKind::Input),
                node("b", NodeKind::Tool),
                node("c", NodeKind::Output),
            ],
            edges: vec![
                plain_edge("a", "b"),
                plain_edge("b", "c"),
                EdgeDefinition {
                    from: "c".into(),
                    to: "b".into(),
                    trigger_rule: TriggerRule::Always,
                    condition: None,
                    r#loop: Some(LoopConfig {
                        max_iterations: 3,
                        exit_when: "false".into(),
                    }),
                },
            ],
            groups: vec![],
        };
        let dag = Dag::build(&wf).unwrap();
        let cycle = dag.cycle_nodes("b", "c");
        assert!(cycle.contains("b"));
        assert!(cycle.contains("c"));
        assert!(!cycle.contains("a"));
    }
}
