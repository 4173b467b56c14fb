use super::types::{
    DEFAULT_INITIAL_DELAY_MS, DEFAULT_MAX_DELAY_MS, DEFAULT_URL, HostConfig, ListenersConfig,
    RawHostConfig, RawListenersConfig, RawReconnectConfig, RawTetherConfig, ReconnectSection,
    TetherConfig,
};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Env var overriding the project config directory
pub const PROJECT_CONFIG_DIR_ENV: &str = "TETHER_PROJECT_CONFIG_DIR";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load merged configuration (user + project)
    pub fn load() -> Result<TetherConfig> {
        let mut raw = RawTetherConfig::default();

        // Layer 1: User config
        let user_path = Self::user_config_path();
        if user_path.exists() {
            raw = Self::merge_raw(raw, Self::read_raw(&user_path)?);
        }

        // Layer 2: Project config
        let project_path = Self::project_config_path();
        if project_path.exists() {
            raw = Self::merge_raw(raw, Self::read_raw(&project_path)?);
        }

        Ok(Self::finalize(raw))
    }

    /// Get user config path (`$XDG_CONFIG_HOME/tether/config.toml`)
    pub fn user_config_path() -> PathBuf {
        tether_paths::user_config_file()
    }

    /// Get project config path
    /// Can be overridden with TETHER_PROJECT_CONFIG_DIR env var
    pub fn project_config_path() -> PathBuf {
        if let Ok(dir) = std::env::var(PROJECT_CONFIG_DIR_ENV) {
            PathBuf::from(dir).join("config.toml")
        } else {
            PathBuf::from(".tether/config.toml")
        }
    }

    fn read_raw(path: &Path) -> Result<RawTetherConfig> {
        debug!(path = %path.display(), "Reading config layer");
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("Invalid config in {}", path.display()))
    }

    /// Merge two raw configs (overlay values override base only if explicitly set)
    fn merge_raw(base: RawTetherConfig, overlay: RawTetherConfig) -> RawTetherConfig {
        RawTetherConfig {
            host: RawHostConfig {
                url: overlay.host.url.or(base.host.url),
                api_key: overlay.host.api_key.or(base.host.api_key),
            },
            listeners: RawListenersConfig {
                retain_on_disconnect: overlay
                    .listeners
                    .retain_on_disconnect
                    .or(base.listeners.retain_on_disconnect),
            },
            reconnect: RawReconnectConfig {
                enabled: overlay.reconnect.enabled.or(base.reconnect.enabled),
                initial_delay_ms: overlay
                    .reconnect
                    .initial_delay_ms
                    .or(base.reconnect.initial_delay_ms),
                max_delay_ms: overlay.reconnect.max_delay_ms.or(base.reconnect.max_delay_ms),
                max_attempts: overlay.reconnect.max_attempts.or(base.reconnect.max_attempts),
            },
        }
    }

    /// Convert raw config to final config with defaults applied
    fn finalize(raw: RawTetherConfig) -> TetherConfig {
        TetherConfig {
            host: HostConfig {
                url: raw.host.url.unwrap_or_else(|| DEFAULT_URL.to_string()),
                api_key: raw.host.api_key,
            },
            listeners: ListenersConfig {
                retain_on_disconnect: raw.listeners.retain_on_disconnect.unwrap_or(false),
            },
            reconnect: ReconnectSection {
                enabled: raw.reconnect.enabled.unwrap_or(true),
                initial_delay_ms: raw
                    .reconnect
                    .initial_delay_ms
                    .unwrap_or(DEFAULT_INITIAL_DELAY_MS),
                max_delay_ms: raw.reconnect.max_delay_ms.unwrap_or(DEFAULT_MAX_DELAY_MS),
                max_attempts: raw.reconnect.max_attempts,
            },
        }
    }

    /// Load config from a specific path (for testing)
    #[cfg(test)]
    pub fn load_from_path(path: &Path) -> Result<TetherConfig> {
        if path.exists() {
            Ok(Self::finalize(Self::read_raw(path)?))
        } else {
            Ok(TetherConfig::default())
        }
    }
}
