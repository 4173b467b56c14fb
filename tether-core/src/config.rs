//! Client configuration
//!
//! [`ClientConfig`] carries everything the lifecycle controller needs to open
//! and maintain a connection. The flush policy has no default: it changes which
//! callbacks survive a reconnect, so callers must pick one.

use std::fmt;
use std::time::Duration;

use url::Url;

use crate::error::ConfigError;

/// Path segment the host serves the socket endpoint under.
pub const SOCKET_PATH: &str = "socket.io/";

/// Default capacity of the local broadcast bus.
pub const DEFAULT_BUS_CAPACITY: usize = 256;

/// What happens to registered listeners when the transport disconnects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushPolicy {
    /// Clear the subscription table; callers must `listen` again after reconnect.
    FlushOnDisconnect,
    /// Keep the subscription table; listeners are re-announced on reconnect.
    RetainOnDisconnect,
}

impl FlushPolicy {
    pub fn flushes(self) -> bool {
        matches!(self, Self::FlushOnDisconnect)
    }
}

/// Normalized host address: origin plus optional sub-path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectAddress {
    original: String,
    secure: bool,
    authority: String,
    path: String,
}

impl ConnectAddress {
    /// Parse a host address such as `http://localhost:8080` or
    /// `https://example.com/api/`.
    ///
    /// A trailing `/` on the sub-path is stripped.
    pub fn parse(address: &str) -> Result<Self, ConfigError> {
        let url = Url::parse(address).map_err(|e| ConfigError::InvalidAddress {
            address: address.to_string(),
            message: e.to_string(),
        })?;

        let secure = match url.scheme() {
            "http" | "ws" => false,
            "https" | "wss" => true,
            other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
        };

        let host = url.host_str().ok_or_else(|| ConfigError::InvalidAddress {
            address: address.to_string(),
            message: "missing host".to_string(),
        })?;
        let authority = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        let path = url.path().trim_end_matches('/').to_string();

        Ok(Self {
            original: address.to_string(),
            secure,
            authority,
            path,
        })
    }

    /// The address as given by the caller.
    pub fn as_str(&self) -> &str {
        &self.original
    }

    /// Origin in http(s) form, e.g. `http://localhost:8080`.
    pub fn origin(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}", scheme, self.authority)
    }

    /// Normalized sub-path without trailing separator (empty when absent).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// WebSocket endpoint the transport connects to.
    pub fn endpoint(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{}://{}{}/{}", scheme, self.authority, self.path, SOCKET_PATH)
    }
}

impl fmt::Display for ConnectAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

/// Exponential backoff configuration for automatic reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Whether the transport reconnects on its own after an unexpected drop.
    pub enabled: bool,
    /// Initial delay between reconnection attempts.
    pub initial_delay: Duration,
    /// Maximum delay between attempts.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub multiplier: f64,
    /// Maximum number of attempts (None = unlimited).
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_attempts: None,
        }
    }
}

impl ReconnectConfig {
    /// Reconnection switched off entirely.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        Duration::from_millis(delay_ms.min(self.max_delay.as_millis() as f64) as u64)
    }

    /// Whether another attempt is allowed after `attempts` failed ones.
    pub fn allows_attempt(&self, attempts: u32) -> bool {
        self.enabled && self.max_attempts.is_none_or(|max| attempts < max)
    }
}

/// Everything needed to open a [`SocketClient`](crate::SocketClient)
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub address: ConnectAddress,
    /// Opaque credential passed to the host at connect time
    pub api_key: Option<String>,
    pub flush_policy: FlushPolicy,
    pub reconnect: ReconnectConfig,
    /// Capacity of the local broadcast bus
    pub bus_capacity: usize,
}

impl ClientConfig {
    /// Build a configuration for `address` with an explicit flush policy.
    pub fn new(address: &str, flush_policy: FlushPolicy) -> Result<Self, ConfigError> {
        Ok(Self {
            address: ConnectAddress::parse(address)?,
            api_key: None,
            flush_policy,
            reconnect: ReconnectConfig::default(),
            bus_capacity: DEFAULT_BUS_CAPACITY,
        })
    }

    /// Set the credential sent during the handshake.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the reconnection policy.
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Set the broadcast bus capacity.
    #[must_use]
    pub fn with_bus_capacity(mut self, capacity: usize) -> Self {
        self.bus_capacity = capacity;
        self
    }
}
