//! tether-core: resilient ask/listen client for a remote host
//!
//! This crate provides the pieces of a socket client that survives
//! disconnects without losing or duplicating subscriptions:
//!
//! - **Transport** - [`Transport`] trait with [`WsTransport`] (WebSocket) and
//!   [`MockTransport`] (in-memory scripted host)
//! - **Client** - [`SocketClient`] with `ask`, `listen` and the lifecycle
//!   operations
//! - **Subscription table** - [`SubscriptionRegistry`] mapping event names to
//!   callbacks, fanned out from a single transport subscription per name
//! - **Router** - [`SocketClient::invoke`] and [`SocketClient::on`] for
//!   callers that only know an operation by name
//! - **Local bus** - [`LocalBus`] mirroring every inbound event
//! - **Collector** - [`MessageCollector`] gathering messages for one chat
//!   within count, time and idle limits
//!
//! # Quick Start
//!
//! ```no_run
//! use tether_core::{ClientConfig, FlushPolicy, SocketClient};
//! use serde_json::json;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::new("http://localhost:8080", FlushPolicy::RetainOnDisconnect)?
//!         .with_api_key("secret");
//!     let client = SocketClient::connect(config).await?;
//!
//!     client
//!         .listen("onMessage", |message| async move {
//!             println!("message: {}", message);
//!         })
//!         .await?;
//!
//!     client
//!         .ask("sendText", json!({"to": "44771234567@c.us", "content": "hello"}))
//!         .await?;
//!
//!     client.close().await;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! caller ──► router ──► ask ──────────────┐
//!                 └───► listen ─► registry ┤
//!                                          ▼
//!                                      Transport ◄──► host
//!                                          │
//!          callbacks ◄── fan-out ◄─────────┤
//!          collector ◄── LocalBus ◄────────┘
//! ```

pub mod client;
pub mod collector;
pub mod config;
pub mod error;
pub mod events;
pub mod transport;

// Re-export key types for convenience
pub use client::{
    Args, ConcreteOp, ListenerCallback, ListenerId, Route, SocketClient, SubscriptionRegistry,
};
pub use collector::{
    AwaitMessagesOptions, ChatTarget, CollectedMessage, Collection, CollectorEnd,
    CollectorFilter, CollectorOptions, CollectorScope, EndReason, MessageCollector, accept_all,
};
pub use config::{ClientConfig, ConnectAddress, FlushPolicy, ReconnectConfig};
pub use error::{ClientError, CollectorError, ConfigError, TetherError, TransportError};
pub use events::{InboundEvent, LocalBus};
pub use transport::{
    DisconnectReason, LifecycleEvent, MockTransport, Transport, WsTransport,
};
