//! Error types for tether-core

use thiserror::Error;

use crate::collector::{Collection, EndReason};

/// Top-level error type for tether-core
#[derive(Error, Debug)]
pub enum TetherError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    #[error("Collector error: {0}")]
    Collector(#[from] CollectorError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors raised by a transport adapter
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Failed to connect to {url}: {message}")]
    Connect { url: String, message: String },

    #[error("Transport is closed")]
    Closed,

    #[error("Failed to emit '{event}': {message}")]
    Emit { event: String, message: String },

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Errors surfaced by the socket client
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Acknowledgement for '{method}' was dropped before the host answered")]
    AckDropped { method: String },

    #[error("'{0}' is not a remote method")]
    NotRemoteMethod(String),

    #[error("'{0}' is not a listener name")]
    NotListenerName(String),

    #[error("Client is closed")]
    Closed,

    #[error("Host returned an unexpected value for '{method}': {message}")]
    UnexpectedResponse { method: String, message: String },

    #[error("Could not resolve a chat id from the collector target")]
    UnresolvedTarget,
}

/// Errors from message collection
#[derive(Error, Debug)]
pub enum CollectorError {
    /// The collector ended for a reason the caller listed as an error.
    /// Partial results are kept in `collection`.
    #[error("Collector ended with reason {reason} after {} message(s)", collection.len())]
    Ended {
        reason: EndReason,
        collection: Collection,
    },

    #[error("Collector task stopped without reporting a result")]
    Aborted,

    #[error("Client error: {0}")]
    Client(#[from] ClientError),
}

/// Errors from building a client configuration
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid address '{address}': {message}")]
    InvalidAddress { address: String, message: String },

    #[error("Unsupported scheme '{0}' (expected http, https, ws or wss)")]
    UnsupportedScheme(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_connect_error_displays_url() {
        let error = TransportError::Connect {
            url: "ws://localhost:8080/socket.io/".to_string(),
            message: "connection refused".to_string(),
        };
        assert!(error.to_string().contains("ws://localhost:8080/socket.io/"));
        assert!(error.to_string().contains("connection refused"));
    }

    #[test]
    fn client_error_ack_dropped_names_method() {
        let error = ClientError::AckDropped {
            method: "sendText".to_string(),
        };
        assert!(error.to_string().contains("sendText"));
    }

    #[test]
    fn client_error_converts_from_transport_error() {
        let error: ClientError = TransportError::Closed.into();
        assert!(matches!(error, ClientError::Transport(TransportError::Closed)));
    }

    #[test]
    fn collector_error_ended_reports_reason_and_count() {
        let error = CollectorError::Ended {
            reason: EndReason::IdleLimit,
            collection: Collection::new(),
        };
        let text = error.to_string();
        assert!(text.contains("idle-limit"));
        assert!(text.contains("0 message"));
    }

    #[test]
    fn tether_error_converts_from_config_error() {
        let error: TetherError = ConfigError::UnsupportedScheme("ftp".to_string()).into();
        assert!(matches!(error, TetherError::Config(_)));
        assert!(error.to_string().contains("ftp"));
    }
}
