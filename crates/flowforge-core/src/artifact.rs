//! Artifacts — a node's structured output.

use serde::{Deserialize, Serialize};

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// One part of an artifact: either human-readable text or structured data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ArtifactPart {
    Text {
        text: String,
        #[serde(default = "default_text_mime")]
        mime: String,
    },
    Data {
        data: serde_json::Value,
        #[serde(default = "default_data_mime")]
        mime: String,
    },
}

fn default_text_mime() -> String {
    "text/plain".to_string()
}

fn default_data_mime() -> String {
    "application/json".to_string()
}

impl ArtifactPart {
    pub fn text(text: impl Into<String>) -> Self {
        ArtifactPart::Text {
            text: text.into(),
            mime: default_text_mime(),
        }
    }

    pub fn data(data: serde_json::Value) -> Self {
        ArtifactPart::Data {
            data,
            mime: default_data_mime(),
        }
    }
}

/// A node's structured output: zero or more parts.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct Artifact {
    #[serde(default)]
    pub parts: Vec<ArtifactPart>,
}

impl Artifact {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            parts: vec![ArtifactPart::text(text)],
        }
    }

    pub fn from_data(data: serde_json::Value) -> Self {
        Self {
            parts: vec![ArtifactPart::data(data)],
        }
    }

    /// First text part's text, if any.
    pub fn first_text(&self) -> Option<&str> {
        self.parts.iter().find_map(|p| match p {
            ArtifactPart::Text { text, .. } => Some(text.as_str()),
            ArtifactPart::Data { .. } => None,
        })
    }

    /// First data part's value, if any.
    pub fn first_data(&self) -> Option<&serde_json::Value> {
        self.parts.iter().find_map(|p| match p {
            ArtifactPart::Data { data, .. } => Some(data),
            ArtifactPart::Text { .. } => None,
        })
    }
}

/// A node's output is a list of artifacts (one dispatch may produce several,
/// e.g. one text block per agent turn).
pub type ArtifactList = Vec<Artifact>;

/// Convenience: the first artifact's first text part, used by the template
/// resolver's `{{key}}` rule.
pub fn first_text_of(artifacts: &[Artifact]) -> Option<&str> {
    artifacts.first().and_then(|a| a.first_text())
}

/// Convenience: the first artifact's first data part, used by `{{key.data}}`.
pub fn first_data_of(artifacts: &[Artifact]) -> Option<&serde_json::Value> {
    artifacts.first().and_then(|a| a.first_data())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_exposes_first_text_and_data() {
        let a = Artifact {
            parts: vec![
                ArtifactPart::text("hello"),
                ArtifactPart::data(serde_json::json!({"n": 1})),
            ],
        };
        assert_eq!(a.first_text(), Some("hello"));
        assert_eq!(a.first_data(), Some(&serde_json::json!({"n": 1})));
    }

    #[test]
    fn text_only_artifact_has_no_data() {
        let a = Artifact::from_text("hi");
        assert_eq!(a.first_data(), None);
    }
}
