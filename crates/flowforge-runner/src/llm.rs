//! Provider-agnostic LLM call contract consumed by `agent`-kind nodes.
//!
//! No concrete HTTP provider is implemented here — only the trait and
//! in-memory doubles used by tests and local demos. A real provider is
//! wired in by implementing [`LlmProvider`] against whichever API the
//! deployment needs.

use async_trait::async_trait;
use serde_json::Value;

use flowforge_core::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmMessageRole {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone)]
pub struct LlmMessage {
    pub role: LlmMessageRole,
    pub content: String,
    pub tool_call_id: Option<String>,
}

impl LlmMessage {
    pub fn text(role: LlmMessageRole, content: impl Into<String>) -> Self {
        Self { role, content: content.into(), tool_call_id: None }
    }
}

#[derive(Debug, Clone)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, Default)]
pub struct LlmResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl LlmResponse {
    pub fn needs_tool_execution(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct LlmCallConfig {
    pub model: String,
    pub system_prompt: Option<String>,
    pub tool_definitions: Vec<Value>,
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat_completion(&self, messages: &[LlmMessage], config: &LlmCallConfig) -> Result<LlmResponse>;
}

/// Returns the concatenation of all user-role message content, performing
/// no tool calls. Used where a workflow run needs a deterministic,
/// network-free "model" for demos and CI.
pub struct EchoLlmProvider;

#[async_trait]
impl LlmProvider for EchoLlmProvider {
    async fn chat_completion(&self, messages: &[LlmMessage], _config: &LlmCallConfig) -> Result<LlmResponse> {
        let text = messages
            .iter()
            .filter(|m| m.role == LlmMessageRole::User)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        Ok(LlmResponse { text, tool_calls: Vec::new() })
    }
}

/// Replays a fixed sequence of responses, one per call, looping the final
/// entry once exhausted. Used to script multi-turn tool-calling tests.
pub struct ScriptedLlmProvider {
    responses: Vec<LlmResponse>,
    cursor: std::sync::atomic::AtomicUsize,
}

impl ScriptedLlmProvider {
    pub fn new(responses: Vec<LlmResponse>) -> Self {
        Self { responses, cursor: std::sync::atomic::AtomicUsize::new(0) }
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlmProvider {
    async fn chat_completion(&self, _messages: &[LlmMessage], _config: &LlmCallConfig) -> Result<LlmResponse> {
        let idx = self.cursor.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let idx = idx.min(self.responses.len().saturating_sub(1));
        Ok(self.responses[idx].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_provider_joins_user_messages() {
        let provider = EchoLlmProvider;
        let config = LlmCallConfig { model: "mock".into(), system_prompt: None, tool_definitions: vec![] };
        let messages = vec![
            LlmMessage::text(LlmMessageRole::System, "ignored"),
            LlmMessage::text(LlmMessageRole::User, "hello"),
        ];
        let response = provider.chat_completion(&messages, &config).await.unwrap();
        assert_eq!(response.text, "hello");
        assert!(!response.needs_tool_execution());
    }

    #[tokio::test]
    async fn scripted_provider_replays_in_order_then_holds_last() {
        let provider = ScriptedLlmProvider::new(vec![
            LlmResponse { text: "first".into(), tool_calls: vec![] },
            LlmResponse { text: "second".into(), tool_calls: vec![] },
        ]);
        let config = LlmCallConfig { model: "mock".into(), system_prompt: None, tool_definitions: vec![] };
        let r1 = provider.chat_completion(&[], &config).await.unwrap();
        let r2 = provider.chat_completion(&[], &config).await.unwrap();
        let r3 = provider.chat_completion(&[], &config).await.unwrap();
        assert_eq!(r1.text, "first");
        assert_eq!(r2.text, "second");
        assert_eq!(r3.text, "second");
    }
}
