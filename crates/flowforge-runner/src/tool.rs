//! Tool abstraction for `agent`-kind nodes.
//!
//! Tools are defined via the [`Tool`] trait and registered with a
//! [`ToolRegistry`] consulted by the node dispatcher's agent loop.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::error;

/// Outcome of a tool execution, distinguishing errors the model is allowed
/// to see from internal failures that must not leak details to it.
#[derive(Debug)]
pub enum ToolExecutionResult {
    Success(Value),
    ToolError(String),
    InternalError(String),
}

impl ToolExecutionResult {
    pub fn success(value: impl Into<Value>) -> Self {
        ToolExecutionResult::Success(value.into())
    }

    pub fn tool_error(message: impl Into<String>) -> Self {
        ToolExecutionResult::ToolError(message.into())
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        ToolExecutionResult::InternalError(message.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ToolExecutionResult::Success(_))
    }

    /// Collapse to `(result, error)` for the dispatcher's `ToolCall` outcome.
    /// Internal errors are logged with full detail and replaced by a
    /// generic message before returning.
    pub fn into_outcome(self, tool_name: &str) -> (Option<Value>, Option<String>) {
        match self {
            ToolExecutionResult::Success(value) => (Some(value), None),
            ToolExecutionResult::ToolError(message) => (None, Some(message)),
            ToolExecutionResult::InternalError(message) => {
                error!(tool_name, error = %message, "tool internal error");
                (None, Some("an internal error occurred while executing the tool".to_string()))
            }
        }
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> Value;
    async fn execute(&self, arguments: Value) -> ToolExecutionResult;
}

#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub async fn execute(&self, name: &str, arguments: Value) -> ToolExecutionResult {
        match self.tools.get(name) {
            Some(tool) => tool.execute(arguments).await,
            None => ToolExecutionResult::tool_error(format!("tool not found: {name}")),
        }
    }
}

/// Echoes back its `message` argument. Useful for dispatcher tests and
/// as a smoke-test tool in demo workflows.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo back the provided message."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": { "message": { "type": "string" } },
            "required": ["message"]
        })
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        let message = arguments.get("message").and_then(|v| v.as_str()).unwrap_or("");
        ToolExecutionResult::success(serde_json::json!({ "echoed": message }))
    }
}

pub struct GetCurrentTimeTool;

#[async_trait]
impl Tool for GetCurrentTimeTool {
    fn name(&self) -> &str {
        "get_current_time"
    }

    fn description(&self) -> &str {
        "Get the current UTC date and time in ISO 8601 format."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _arguments: Value) -> ToolExecutionResult {
        ToolExecutionResult::success(serde_json::json!({
            "datetime": chrono::Utc::now().to_rfc3339(),
        }))
    }
}

/// Always fails; exercises both the tool-error and internal-error paths
/// in tests.
pub struct FailingTool {
    message: String,
    internal: bool,
}

impl FailingTool {
    pub fn with_tool_error(message: impl Into<String>) -> Self {
        Self { message: message.into(), internal: false }
    }

    pub fn with_internal_error(message: impl Into<String>) -> Self {
        Self { message: message.into(), internal: true }
    }
}

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        "failing_tool"
    }

    fn description(&self) -> &str {
        "A tool that always fails."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _arguments: Value) -> ToolExecutionResult {
        if self.internal {
            ToolExecutionResult::internal_error(self.message.clone())
        } else {
            ToolExecutionResult::tool_error(self.message.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_tool_returns_the_message_back() {
        let tool = EchoTool;
        let result = tool.execute(serde_json::json!({"message": "hi"})).await;
        match result {
            ToolExecutionResult::Success(v) => assert_eq!(v["echoed"], "hi"),
            _ => panic!("expected success"),
        }
    }

    #[tokio::test]
    async fn internal_errors_are_replaced_with_a_generic_message() {
        let tool = FailingTool::with_internal_error("db connection refused");
        let result = tool.execute(serde_json::json!({})).await;
        let (value, error) = result.into_outcome("failing_tool");
        assert!(value.is_none());
        assert_eq!(error.unwrap(), "an internal error occurred while executing the tool");
    }

    #[tokio::test]
    async fn tool_errors_pass_through_verbatim() {
        let tool = FailingTool::with_tool_error("bad input");
        let result = tool.execute(serde_json::json!({})).await;
        let (_, error) = result.into_outcome("failing_tool");
        assert_eq!(error.unwrap(), "bad input");
    }

    #[tokio::test]
    async fn registry_executes_by_name_and_reports_missing_tools() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        assert!(registry.has("echo"));

        let result = registry.execute("missing", serde_json::json!({})).await;
        assert!(!result.is_success());
    }
}
