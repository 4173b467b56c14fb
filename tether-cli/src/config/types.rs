use std::time::Duration;

use serde::{Deserialize, Serialize};
use tether_core::{ClientConfig, ConfigError, FlushPolicy, ReconnectConfig};

/// Configuration as stored in TOML files (with optional fields for merging)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawTetherConfig {
    #[serde(default)]
    pub host: RawHostConfig,

    #[serde(default)]
    pub listeners: RawListenersConfig,

    #[serde(default)]
    pub reconnect: RawReconnectConfig,
}

/// Host section as stored in TOML
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawHostConfig {
    /// Address of the host, e.g. `http://localhost:8080/api`
    pub url: Option<String>,

    /// Credential passed to the host at connect time
    pub api_key: Option<String>,
}

/// Listener section as stored in TOML
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawListenersConfig {
    /// Keep listeners across disconnects instead of flushing them
    pub retain_on_disconnect: Option<bool>,
}

/// Reconnect section as stored in TOML
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawReconnectConfig {
    pub enabled: Option<bool>,
    pub initial_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub max_attempts: Option<u32>,
}

/// Final configuration with defaults applied
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TetherConfig {
    #[serde(default)]
    pub host: HostConfig,

    #[serde(default)]
    pub listeners: ListenersConfig,

    #[serde(default)]
    pub reconnect: ReconnectSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostConfig {
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ListenersConfig {
    pub retain_on_disconnect: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconnectSection {
    pub enabled: bool,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay_ms: DEFAULT_INITIAL_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            max_attempts: None,
        }
    }
}

impl TetherConfig {
    /// Listener flush policy selected by this configuration
    pub fn flush_policy(&self) -> FlushPolicy {
        if self.listeners.retain_on_disconnect {
            FlushPolicy::RetainOnDisconnect
        } else {
            FlushPolicy::FlushOnDisconnect
        }
    }

    /// Build the client configuration for connecting to the host
    pub fn client_config(&self) -> Result<ClientConfig, ConfigError> {
        let mut config = ClientConfig::new(&self.host.url, self.flush_policy())?
            .with_reconnect(ReconnectConfig {
                enabled: self.reconnect.enabled,
                initial_delay: Duration::from_millis(self.reconnect.initial_delay_ms),
                max_delay: Duration::from_millis(self.reconnect.max_delay_ms),
                max_attempts: self.reconnect.max_attempts,
                ..ReconnectConfig::default()
            });
        if let Some(api_key) = &self.host.api_key {
            config = config.with_api_key(api_key.clone());
        }
        Ok(config)
    }
}

/// Default host address
pub const DEFAULT_URL: &str = "http://localhost:8080";

/// Default first reconnect delay
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 500;

/// Default reconnect delay cap
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = TetherConfig::default();
        assert_eq!(config.host.url, DEFAULT_URL);
        assert!(config.host.api_key.is_none());
        assert!(!config.listeners.retain_on_disconnect);
        assert!(config.reconnect.enabled);
        assert_eq!(config.reconnect.initial_delay_ms, 500);
        assert!(config.reconnect.max_attempts.is_none());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = TetherConfig {
            host: HostConfig {
                url: "https://example.com/wa".to_string(),
                api_key: Some("secret".to_string()),
            },
            listeners: ListenersConfig {
                retain_on_disconnect: true,
            },
            reconnect: ReconnectSection {
                max_attempts: Some(5),
                ..Default::default()
            },
        };

        let toml_str = toml::to_string(&config).unwrap();
        let parsed: TetherConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed, config);
    }

    #[test]
    fn test_client_config_maps_sections() {
        let config = TetherConfig {
            host: HostConfig {
                url: "https://example.com/wa/".to_string(),
                api_key: Some("secret".to_string()),
            },
            listeners: ListenersConfig {
                retain_on_disconnect: true,
            },
            reconnect: ReconnectSection {
                initial_delay_ms: 100,
                ..Default::default()
            },
        };

        let client = config.client_config().unwrap();

        assert_eq!(client.flush_policy, FlushPolicy::RetainOnDisconnect);
        assert_eq!(client.api_key.as_deref(), Some("secret"));
        assert_eq!(client.address.endpoint(), "wss://example.com/wa/socket.io/");
        assert_eq!(client.reconnect.initial_delay, Duration::from_millis(100));
    }

    #[test]
    fn test_default_config_flushes_listeners() {
        assert_eq!(
            TetherConfig::default().flush_policy(),
            FlushPolicy::FlushOnDisconnect
        );
    }

    #[test]
    fn test_client_config_rejects_bad_url() {
        let config = TetherConfig {
            host: HostConfig {
                url: "ftp://example.com".to_string(),
                api_key: None,
            },
            ..Default::default()
        };
        assert!(config.client_config().is_err());
    }

    #[test]
    fn test_raw_config_partial_parsing() {
        let toml_str = r#"
[host]
url = "http://10.0.0.2:9000"
"#;
        let raw: RawTetherConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(raw.host.url.as_deref(), Some("http://10.0.0.2:9000"));
        assert!(raw.host.api_key.is_none());
        assert!(raw.listeners.retain_on_disconnect.is_none());
        assert!(raw.reconnect.enabled.is_none());
    }

    #[test]
    fn test_raw_config_empty_uses_none() {
        let raw: RawTetherConfig = toml::from_str("").unwrap();

        assert!(raw.host.url.is_none());
        assert!(raw.reconnect.max_delay_ms.is_none());
    }
}
