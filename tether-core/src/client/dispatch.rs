//! Name-based method router
//!
//! Callers that only know an operation by name (scripts, the CLI, bindings)
//! go through [`SocketClient::invoke`] and [`SocketClient::on`]. Names are
//! resolved in this order:
//!
//! 1. a concrete client operation (`connect`, `listen`, `killSession`, ...)
//! 2. a listener name, i.e. anything starting with `on`
//! 3. a remote method, forwarded to `ask`

use std::future::Future;

use serde_json::Value;
use tracing::debug;

use super::SocketClient;
use super::args::Args;
use super::registry::ListenerId;
use crate::error::ClientError;

/// Names starting with this prefix are listener names
pub const LISTENER_PREFIX: &str = "on";

/// Operations implemented by the client itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConcreteOp {
    Connect,
    Disconnect,
    Ask,
    Listen,
    StopListener,
    FlushListeners,
    Reconnect,
    Close,
    KillSession,
    OnConnected,
    /// The local event bus
    EventBus,
}

impl ConcreteOp {
    /// Look up a concrete operation by its snake_case or camelCase name.
    pub fn from_name(name: &str) -> Option<Self> {
        let op = match name {
            "connect" => Self::Connect,
            "disconnect" => Self::Disconnect,
            "ask" => Self::Ask,
            "listen" => Self::Listen,
            "stop_listener" | "stopListener" => Self::StopListener,
            "flush_listeners" | "flushListeners" => Self::FlushListeners,
            "reconnect" => Self::Reconnect,
            "close" => Self::Close,
            "kill_session" | "killSession" => Self::KillSession,
            "on_connected" | "onConnected" => Self::OnConnected,
            "ev" => Self::EventBus,
            _ => return None,
        };
        Some(op)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::Ask => "ask",
            Self::Listen => "listen",
            Self::StopListener => "stop_listener",
            Self::FlushListeners => "flush_listeners",
            Self::Reconnect => "reconnect",
            Self::Close => "close",
            Self::KillSession => "kill_session",
            Self::OnConnected => "on_connected",
            Self::EventBus => "ev",
        }
    }
}

/// Where a name is routed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Concrete(ConcreteOp),
    Listen,
    Ask,
}

/// Whether `name` is a listener name such as `onMessage`.
pub fn is_listener_name(name: &str) -> bool {
    name.starts_with(LISTENER_PREFIX)
}

impl SocketClient {
    /// Classify `name`.
    pub fn route(name: &str) -> Route {
        if let Some(op) = ConcreteOp::from_name(name) {
            Route::Concrete(op)
        } else if is_listener_name(name) {
            Route::Listen
        } else {
            Route::Ask
        }
    }

    /// Call the remote method `name` with method-style arguments.
    ///
    /// A single object argument becomes a keyed bag; anything else is sent as
    /// the full positional sequence. Concrete operations and listener names
    /// are rejected.
    pub async fn invoke(&self, name: &str, call_args: Vec<Value>) -> Result<Value, ClientError> {
        match Self::route(name) {
            Route::Ask => {
                debug!(method = %name, args = call_args.len(), "invoke");
                self.ask(name, Args::from_call(call_args)).await
            }
            Route::Concrete(_) | Route::Listen => {
                Err(ClientError::NotRemoteMethod(name.to_string()))
            }
        }
    }

    /// Register `callback` for the listener name `name`.
    pub async fn on<F, Fut>(&self, name: &str, callback: F) -> Result<ListenerId, ClientError>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        match Self::route(name) {
            Route::Listen => self.listen(name, callback).await,
            Route::Concrete(_) | Route::Ask => Err(ClientError::NotListenerName(name.to_string())),
        }
    }
}
