//! Application configuration, loaded from environment variables with an
//! optional TOML overlay for provider definitions.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::retry::ConcurrencyLimits;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    fn from_env() -> Self {
        let host = std::env::var("FLOWFORGE_SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = std::env::var("FLOWFORGE_SERVER_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8080);
        Self { host, port }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub limits: ConcurrencyLimits,
    pub poll_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            limits: ConcurrencyLimits::default(),
            poll_interval_secs: 30,
        }
    }
}

impl SchedulerConfig {
    fn from_env() -> Self {
        let global_max = std::env::var("FLOWFORGE_SCHEDULER_GLOBAL_MAX")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);
        let per_workflow_max = std::env::var("FLOWFORGE_SCHEDULER_PER_WORKFLOW_MAX")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3);
        let poll_interval_secs = std::env::var("FLOWFORGE_SCHEDULER_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);
        Self {
            limits: ConcurrencyLimits {
                global_max,
                per_workflow_max,
            },
            poll_interval_secs,
        }
    }
}

/// A named external provider endpoint (e.g. a tool-call or LLM backend),
/// declared in a TOML overlay file. The `api_key` field never appears in
/// the parsed struct's `Debug` output path used for logging.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    #[serde(rename = "type")]
    pub provider_type: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ProvidersOverlay {
    #[serde(default)]
    providers: HashMap<String, ProviderConfig>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database_url: Option<String>,
    pub scheduler: SchedulerConfig,
    pub providers: HashMap<String, ProviderConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database_url: None,
            scheduler: SchedulerConfig::default(),
            providers: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables, optionally overlaid
    /// with a `providers.toml`-style file named by `FLOWFORGE_PROVIDERS_CONFIG`.
    pub fn from_env() -> Self {
        let server = ServerConfig::from_env();
        let database_url = std::env::var("DATABASE_URL").ok();
        let scheduler = SchedulerConfig::from_env();

        let providers = std::env::var("FLOWFORGE_PROVIDERS_CONFIG")
            .ok()
            .map(|path| Self::load_providers_overlay(Path::new(&path)))
            .unwrap_or_default();

        Self {
            server,
            database_url,
            scheduler,
            providers,
        }
    }

    fn load_providers_overlay(path: &Path) -> HashMap<String, ProviderConfig> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "providers config file not found, skipping overlay");
            return HashMap::new();
        }
        match std::fs::read_to_string(path).and_then(|s| {
            toml::from_str::<ProvidersOverlay>(&s).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        }) {
            Ok(overlay) => overlay.providers,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to parse providers overlay, ignoring");
                HashMap::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_server_config_binds_all_interfaces_on_8080() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn missing_providers_overlay_yields_empty_map() {
        let providers = AppConfig::load_providers_overlay(Path::new("/nonexistent/providers.toml"));
        assert!(providers.is_empty());
    }

    #[test]
    fn parses_a_providers_overlay_file() {
        let overlay: ProvidersOverlay = toml::from_str(
            r#"
            [providers.slack]
            type = "webhook"
            url = "https://hooks.slack.com/x"
            "#,
        )
        .unwrap();
        assert_eq!(overlay.providers.len(), 1);
        assert_eq!(overlay.providers["slack"].provider_type, "webhook");
    }
}
