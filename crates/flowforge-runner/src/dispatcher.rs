//! Node dispatcher — executes a single node's behavior according to its
//! `NodeKind`, dispatched polymorphically off the workflow definition.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use flowforge_core::error::{FlowError, Result};
use flowforge_core::template::{self, ArtifactMap};
use flowforge_core::{Artifact, NodeDefinition, NodeKind};

use crate::llm::{LlmCallConfig, LlmMessage, LlmMessageRole, LlmProvider};
use crate::tool::ToolRegistry;

/// Outcome of dispatching one node.
pub enum NodeOutcome {
    Completed(Vec<Artifact>),
    /// `approval`-kind nodes suspend the run until resumed externally
    /// (see `execution_handle`).
    Suspended,
}

/// Invokes a nested workflow run for `subworkflow`-kind nodes. Implemented
/// by the run manager, which owns run admission and bookkeeping; the
/// dispatcher only needs the narrow callback.
#[async_trait]
pub trait SubworkflowInvoker: Send + Sync {
    async fn invoke(&self, workflow_name: &str, inputs: Value) -> Result<Vec<Artifact>>;
}

/// Delivers `notification`-kind node payloads to an external connection.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, connection_id: Uuid, message: &str) -> Result<()>;
}

pub struct NodeDispatcher {
    pub tools: ToolRegistry,
    pub llm: Arc<dyn LlmProvider>,
    pub subworkflows: Option<Arc<dyn SubworkflowInvoker>>,
    pub notifier: Option<Arc<dyn Notifier>>,
    pub max_agent_iterations: usize,
}

impl NodeDispatcher {
    pub fn new(tools: ToolRegistry, llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            tools,
            llm,
            subworkflows: None,
            notifier: None,
            max_agent_iterations: 8,
        }
    }

    pub async fn dispatch(&self, node: &NodeDefinition, inputs: &ArtifactMap) -> Result<NodeOutcome> {
        match node.kind {
            NodeKind::Input => self.run_input(node, inputs),
            NodeKind::Output => self.run_passthrough(node, inputs),
            NodeKind::Branch => self.run_passthrough(node, inputs),
            NodeKind::Sensor => self.run_sensor(node, inputs),
            NodeKind::Tool => self.run_tool(node, inputs).await,
            NodeKind::Agent => self.run_agent(node, inputs).await,
            NodeKind::Subworkflow => self.run_subworkflow(node, inputs).await,
            NodeKind::Notification => self.run_notification(node, inputs).await,
            NodeKind::Approval => Ok(NodeOutcome::Suspended),
            NodeKind::Iterator => self.run_passthrough(node, inputs),
        }
    }

    fn run_input(&self, node: &NodeDefinition, inputs: &ArtifactMap) -> Result<NodeOutcome> {
        let key = template::user_input_alias(&node.id);
        let artifacts = inputs
            .get(key.as_str())
            .or_else(|| inputs.get(node.id.as_str()))
            .cloned()
            .unwrap_or_else(|| vec![Artifact::from_data(node.config.clone())]);
        Ok(NodeOutcome::Completed(artifacts))
    }

    fn run_passthrough(&self, _node: &NodeDefinition, inputs: &ArtifactMap) -> Result<NodeOutcome> {
        let merged: Vec<Artifact> = inputs.values().flatten().cloned().collect();
        Ok(NodeOutcome::Completed(merged))
    }

    fn run_sensor(&self, node: &NodeDefinition, inputs: &ArtifactMap) -> Result<NodeOutcome> {
        let expr = node
            .config
            .get("expression")
            .and_then(|v| v.as_str())
            .ok_or_else(|| FlowError::validation("sensor node requires config.expression"))?;
        let satisfied = flowforge_core::expr::eval_bool(expr, inputs)?;
        Ok(NodeOutcome::Completed(vec![Artifact::from_data(serde_json::json!({
            "satisfied": satisfied
        }))]))
    }

    async fn run_tool(&self, node: &NodeDefinition, inputs: &ArtifactMap) -> Result<NodeOutcome> {
        let tool_name = node
            .config
            .get("tool")
            .and_then(|v| v.as_str())
            .ok_or_else(|| FlowError::validation("tool node requires config.tool"))?;
        let raw_args = node.config.get("arguments").cloned().unwrap_or(Value::Null);
        let resolved = resolve_value(&raw_args, inputs)?;

        let outcome = self.tools.execute(tool_name, resolved).await;
        let (value, error) = outcome.into_outcome(tool_name);
        match (value, error) {
            (Some(v), _) => Ok(NodeOutcome::Completed(vec![Artifact::from_data(v)])),
            (None, Some(message)) => Err(FlowError::Tool(message)),
            (None, None) => Ok(NodeOutcome::Completed(vec![])),
        }
    }

    async fn run_agent(&self, node: &NodeDefinition, inputs: &ArtifactMap) -> Result<NodeOutcome> {
        let system_prompt = node.config.get("system_prompt").and_then(|v| v.as_str()).map(String::from);
        let model = node
            .config
            .get("model")
            .and_then(|v| v.as_str())
            .unwrap_or("default")
            .to_string();
        let prompt_template = node
            .config
            .get("prompt")
            .and_then(|v| v.as_str())
            .ok_or_else(|| FlowError::validation("agent node requires config.prompt"))?;
        let prompt = template::resolve(prompt_template, inputs);

        let config = LlmCallConfig { model, system_prompt, tool_definitions: Vec::new() };
        let mut messages = vec![LlmMessage::text(LlmMessageRole::User, prompt)];

        for iteration in 0..self.max_agent_iterations {
            let response = self.llm.chat_completion(&messages, &config).await?;
            if !response.needs_tool_execution() {
                return Ok(NodeOutcome::Completed(vec![Artifact::from_text(response.text)]));
            }

            for call in &response.tool_calls {
                let outcome = self.tools.execute(&call.name, call.arguments.clone()).await;
                let (value, error) = outcome.into_outcome(&call.name);
                let content = match (value, error) {
                    (Some(v), _) => v.to_string(),
                    (None, Some(e)) => e,
                    (None, None) => String::new(),
                };
                messages.push(LlmMessage {
                    role: LlmMessageRole::Tool,
                    content,
                    tool_call_id: Some(call.id.clone()),
                });
            }

            if iteration + 1 == self.max_agent_iterations {
                return Err(FlowError::Internal(anyhow::anyhow!(
                    "agent node '{}' exhausted its iteration budget without a final answer",
                    node.id
                )));
            }
        }

        unreachable!("loop always returns before exhausting max_agent_iterations")
    }

    async fn run_subworkflow(&self, node: &NodeDefinition, inputs: &ArtifactMap) -> Result<NodeOutcome> {
        let invoker = self
            .subworkflows
            .as_ref()
            .ok_or_else(|| FlowError::validation("no subworkflow invoker configured"))?;
        let workflow_name = node
            .config
            .get("workflow_name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| FlowError::validation("subworkflow node requires config.workflow_name"))?;
        let raw_inputs = node.config.get("inputs").cloned().unwrap_or(Value::Null);
        let resolved = resolve_value(&raw_inputs, inputs)?;
        let artifacts = invoker.invoke(workflow_name, resolved).await?;
        Ok(NodeOutcome::Completed(artifacts))
    }

    async fn run_notification(&self, node: &NodeDefinition, inputs: &ArtifactMap) -> Result<NodeOutcome> {
        let notifier = self
            .notifier
            .as_ref()
            .ok_or_else(|| FlowError::validation("no notifier configured"))?;
        let connection_id: Uuid = node
            .config
            .get("connection_id")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| FlowError::validation("notification node requires config.connection_id"))?;
        let message_template = node
            .config
            .get("message")
            .and_then(|v| v.as_str())
            .ok_or_else(|| FlowError::validation("notification node requires config.message"))?;
        let message = template::resolve(message_template, inputs);
        notifier.notify(connection_id, &message).await?;
        Ok(NodeOutcome::Completed(vec![Artifact::from_text(message)]))
    }
}

/// Resolve `{{...}}` templates embedded anywhere inside a JSON value's
/// string leaves, recursing into objects and arrays (but never re-scanning
/// substituted text).
fn resolve_value(value: &Value, artifacts: &ArtifactMap) -> Result<Value> {
    match value {
        Value::String(s) => Ok(Value::String(template::resolve(s, artifacts))),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(resolve_value(item, artifacts)?);
            }
            Ok(Value::Array(out))
        }
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), resolve_value(v, artifacts)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}
