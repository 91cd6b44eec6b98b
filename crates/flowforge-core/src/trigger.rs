//! Trigger — external (webhook, etc.) execution entry point (spec §3, §6).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum TriggerTarget {
    Workflow { workflow_name: String },
    Pipeline { pipeline_id: Uuid },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Webhook,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct TriggerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    /// Maps an incoming payload path to an input key consumed by the run.
    #[serde(default)]
    pub input_mapping: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct Trigger {
    pub id: Uuid,
    pub target: TriggerTarget,
    #[serde(rename = "type")]
    pub kind: TriggerKind,
    pub config: TriggerConfig,
    pub enabled: bool,
}

impl Trigger {
    pub fn webhook(target: TriggerTarget, config: TriggerConfig) -> Self {
        Self {
            id: Uuid::now_v7(),
            target,
            kind: TriggerKind::Webhook,
            config,
            enabled: true,
        }
    }

    /// Apply the trigger's `input_mapping` to a raw JSON payload, producing
    /// the `inputs` map a run is started with.
    pub fn map_inputs(&self, payload: &serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        let mut inputs = serde_json::Map::new();
        for (path, input_key) in &self.config.input_mapping {
            if let Some(value) = lookup_path(payload, path) {
                inputs.insert(input_key.clone(), value.clone());
            }
        }
        inputs
    }
}

/// Resolve a dotted JSON path (`"a.b.c"`) against a payload.
fn lookup_path<'a>(value: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    path.split('.').try_fold(value, |v, segment| v.get(segment))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_a_nested_payload_path_into_an_input_key() {
        let mut input_mapping = HashMap::new();
        input_mapping.insert("body.title".to_string(), "title".to_string());
        let trigger = Trigger::webhook(
            TriggerTarget::Workflow {
                workflow_name: "wf".into(),
            },
            TriggerConfig {
                secret: None,
                input_mapping,
            },
        );
        let payload = serde_json::json!({ "body": { "title": "hello" } });
        let inputs = trigger.map_inputs(&payload);
        assert_eq!(inputs.get("title"), Some(&serde_json::json!("hello")));
    }

    #[test]
    fn missing_path_is_silently_skipped() {
        let mut input_mapping = HashMap::new();
        input_mapping.insert("missing.path".to_string(), "x".to_string());
        let trigger = Trigger::webhook(
            TriggerTarget::Workflow {
                workflow_name: "wf".into(),
            },
            TriggerConfig {
                secret: None,
                input_mapping,
            },
        );
        let inputs = trigger.map_inputs(&serde_json::json!({}));
        assert!(inputs.is_empty());
    }
}
