//! Transport trait and lifecycle types
//!
//! The transport is the duplex event channel between the client and the
//! remote host. The client core only depends on this trait, so the WebSocket
//! adapter and the in-memory mock are interchangeable.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, oneshot};

use crate::error::TransportError;

/// Handler attached to one named inbound event.
pub type EventHandler =
    Arc<dyn Fn(Value) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Catch-all handler observing every inbound event.
pub type AnyHandler = Arc<dyn Fn(&str, &Value) + Send + Sync>;

/// Why a connection went away
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The client asked for it (`disconnect` or `close`)
    ClientDisconnect,
    /// The host closed the connection
    ServerDisconnect,
    /// The underlying stream ended
    TransportClose,
    /// The underlying stream failed
    TransportError(String),
}

impl DisconnectReason {
    pub fn as_str(&self) -> &str {
        match self {
            Self::ClientDisconnect => "client disconnect",
            Self::ServerDisconnect => "server disconnect",
            Self::TransportClose => "transport close",
            Self::TransportError(message) => message,
        }
    }
}

/// Connection lifecycle notifications published by a transport
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    /// A connection is established (initial or after reconnect)
    Connected,
    /// The connection dropped
    Disconnected { reason: DisconnectReason },
    /// An automatic reconnection attempt is starting
    ReconnectAttempt { attempt: u32 },
    /// An automatic reconnection attempt succeeded
    Reconnected { attempt: u32 },
    /// A connection attempt failed
    ConnectError { message: String },
    /// The transport was closed for good
    Closed,
}

/// Bidirectional event channel to the remote host
///
/// Implementations must:
/// - buffer emissions made while disconnected and send them once connected
/// - keep named and catch-all handlers across reconnects
/// - correlate each acknowledgement with the request that asked for it
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a connection. Resolves once connected; no-op when already connected.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Drop the current connection without preventing a later `connect`.
    async fn disconnect(&self);

    /// Drop the connection and release every background task.
    ///
    /// Pending acknowledgements are dropped.
    async fn close(&self);

    /// Whether a connection is currently established.
    fn is_connected(&self) -> bool;

    /// Emit an event without waiting for an answer.
    async fn emit(&self, event: &str, data: Value) -> Result<(), TransportError>;

    /// Emit an event and receive the host's single acknowledgement.
    async fn emit_with_ack(
        &self,
        event: &str,
        data: Value,
    ) -> Result<oneshot::Receiver<Value>, TransportError>;

    /// Attach a handler for a named inbound event.
    async fn on(&self, event: &str, handler: EventHandler);

    /// Number of handlers attached for a named inbound event.
    async fn listener_count(&self, event: &str) -> usize;

    /// Attach a handler observing every inbound event.
    async fn on_any(&self, handler: AnyHandler);

    /// Subscribe to lifecycle notifications.
    fn lifecycle(&self) -> broadcast::Receiver<LifecycleEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disconnect_reason_as_str() {
        assert_eq!(DisconnectReason::ClientDisconnect.as_str(), "client disconnect");
        assert_eq!(
            DisconnectReason::TransportError("reset by peer".to_string()).as_str(),
            "reset by peer"
        );
    }

    #[test]
    fn lifecycle_event_debug_names_variant() {
        let event = LifecycleEvent::ReconnectAttempt { attempt: 3 };
        assert!(format!("{:?}", event).contains("ReconnectAttempt"));
    }
}
