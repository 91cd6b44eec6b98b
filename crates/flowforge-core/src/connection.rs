//! Connection — credentials for external services (spec §3).
//!
//! Secrets are never surfaced through read APIs; the core exposes only a
//! `ConnectionSafe` projection.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    Telegram,
    Slack,
    Http,
    Smtp,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct ConnectionExtras(pub serde_json::Value);

/// Full connection record, including secrets. Never serialized to an
/// external API response — routes must map through `ConnectionSafe`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ConnectionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default)]
    pub extras: serde_json::Value,
}

/// The only projection of `Connection` that may leave the process over an
/// external API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct ConnectionSafe {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ConnectionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,
    #[serde(default)]
    pub extras: serde_json::Value,
}

impl From<&Connection> for ConnectionSafe {
    fn from(c: &Connection) -> Self {
        Self {
            id: c.id,
            name: c.name.clone(),
            kind: c.kind,
            host: c.host.clone(),
            port: c.port,
            login: c.login.clone(),
            extras: c.extras.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_projection_drops_secrets() {
        let c = Connection {
            id: Uuid::now_v7(),
            name: "prod-slack".into(),
            kind: ConnectionType::Slack,
            host: Some("slack.com".into()),
            port: None,
            login: None,
            password: None,
            token: Some("xoxb-secret".into()),
            extras: serde_json::json!({}),
        };
        let safe = ConnectionSafe::from(&c);
        let json = serde_json::to_value(&safe).unwrap();
        assert!(json.get("token").is_none());
        assert!(json.get("password").is_none());
    }
}
