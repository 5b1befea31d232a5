/// Config schema: backend API, live channel and local storage.
use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudioConfig {
    pub api: ApiConfig,
    pub channel: ChannelSection,
    pub storage: StorageConfig,
}

/// Backend REST API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Server root, without the `/api/v1` prefix.
    pub url: String,

    pub timeout_secs: u64,

    /// Bearer token. `RAG_STUDIO_API_TOKEN` takes precedence when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8000".into(),
            timeout_secs: 30,
            token: None,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Live progress channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelSection {
    /// Path segment identifying this client: `/api/v1/ws/<client_id>`.
    pub client_id: String,
    pub reconnect: bool,
    pub reconnect_interval_ms: u64,
}

impl Default for ChannelSection {
    fn default() -> Self {
        Self {
            client_id: "upload-client".into(),
            reconnect: true,
            reconnect_interval_ms: 3000,
        }
    }
}

impl ChannelSection {
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Where persisted stores live. Defaults to `~/.rag-studio/`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let cfg: StudioConfig = toml::from_str(
            r#"
            [api]
            url = "https://rag.example.com"

            [channel]
            reconnect_interval_ms = 500
            "#,
        )
        .unwrap();
        assert_eq!(cfg.api.url, "https://rag.example.com");
        assert_eq!(cfg.api.timeout_secs, 30);
        assert_eq!(cfg.channel.client_id, "upload-client");
        assert!(cfg.channel.reconnect);
        assert_eq!(cfg.channel.reconnect_interval(), Duration::from_millis(500));
        assert!(cfg.storage.data_dir.is_none());
    }

    #[test]
    fn test_zero_timeout_is_clamped() {
        let api = ApiConfig {
            timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(api.timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_default_serializes_without_token() {
        let toml_str = toml::to_string_pretty(&StudioConfig::default()).unwrap();
        assert!(toml_str.contains("[api]"));
        assert!(!toml_str.contains("token"));
        let back: StudioConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(back, StudioConfig::default());
    }
}
