//! Connection lifecycle handling
//!
//! A driver task follows the transport's lifecycle notifications. Every
//! `Connected` runs the post-connect setup:
//!
//! 1. make sure the local bus exists
//! 2. ask the host to mirror raw events (`register_ev`)
//! 3. attach the catch-all forwarder from transport to bus (once)
//! 4. re-announce every event name in the subscription table and attach a
//!    transport subscription where none exists
//!
//! Step 4 is idempotent: running it twice never adds a second transport
//! handler for a name. Completed setups are counted on a watch channel so
//! `connect` and `reconnect` can wait for them.
//!
//! Each connection's setup runs in its own task. The next lifecycle
//! notification cancels it, so a re-announcement the host never answers
//! cannot hold up later connections.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};

use futures_util::future::join_all;
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::ClientInner;
use super::args::Args;
use crate::error::ClientError;
use crate::events::LocalBus;
use crate::transport::{AnyHandler, DisconnectReason, LifecycleEvent};

/// Reserved event asking the host to mirror every event to this client.
pub const REGISTER_EV: &str = "register_ev";

impl ClientInner {
    pub(super) fn ensure_bus(&self) -> &LocalBus {
        self.bus
            .get_or_init(|| LocalBus::new(self.config.bus_capacity))
    }

    /// First part of post-connect setup: bus, mirroring request, forwarder.
    ///
    /// Never cancelled midway, so the forwarder is attached exactly once.
    async fn prepare_connection(&self) {
        debug!("_connected: running post-connect setup");

        let bus = self.ensure_bus().clone();

        if let Err(e) = self.transport.emit(REGISTER_EV, json!({})).await {
            warn!(error = %e, "Failed to request event mirroring");
        }

        if !self.mirror_attached.swap(true, Ordering::SeqCst) {
            let mirror: AnyHandler = Arc::new(move |name: &str, payload: &Value| {
                bus.publish(name, payload.clone());
            });
            self.transport.on_any(mirror).await;
        }
    }

    pub(super) async fn on_transport_disconnected(&self, reason: &DisconnectReason) {
        info!(reason = %reason.as_str(), "Disconnected");
        if self.config.flush_policy.flushes() {
            self.registry.flush().await;
        }
    }

    /// Re-announce every registered event name to the host.
    pub(super) async fn ensure_listeners_registered(&self) {
        let names = self.registry.event_names().await;
        debug!(count = names.len(), "Listeners, reregistering...");

        let results = join_all(names.iter().map(|name| self.register_listener(name))).await;
        for (name, result) in names.iter().zip(results) {
            if let Err(e) = result {
                warn!(event = %name, error = %e, "Failed to re-register listener");
            }
        }
    }

    /// Announce interest in `event` and make sure exactly one transport
    /// subscription fans it out.
    pub(super) async fn register_listener(&self, event: &str) -> Result<(), ClientError> {
        self.ask(event, Args::None).await?;
        self.registry
            .ensure_transport_subscription(self.transport.as_ref(), event)
            .await;
        Ok(())
    }
}

/// Run post-connect setup for one connection until it completes or `token`
/// is cancelled.
async fn run_setup(client: Weak<ClientInner>, token: CancellationToken) {
    if token.is_cancelled() {
        return;
    }
    let Some(inner) = client.upgrade() else {
        return;
    };
    inner.prepare_connection().await;

    tokio::select! {
        _ = token.cancelled() => {
            debug!("Post-connect setup abandoned");
        }
        _ = inner.ensure_listeners_registered() => {
            inner.setups.send_modify(|completed| *completed += 1);
        }
    }
}

/// Follow lifecycle notifications until the client shuts down.
pub(super) async fn drive(
    client: Weak<ClientInner>,
    mut events: broadcast::Receiver<LifecycleEvent>,
    shutdown: CancellationToken,
) {
    let mut setup: Option<CancellationToken> = None;

    loop {
        let received = tokio::select! {
            _ = shutdown.cancelled() => break,
            received = events.recv() => received,
        };

        let event = match received {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Lifecycle notifications lagged");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        let Some(inner) = client.upgrade() else {
            break;
        };

        match event {
            LifecycleEvent::Connected => {
                if let Some(previous) = setup.take() {
                    previous.cancel();
                }
                let token = shutdown.child_token();
                setup = Some(token.clone());
                tokio::spawn(run_setup(Arc::downgrade(&inner), token));
            }
            LifecycleEvent::Disconnected { reason } => {
                if let Some(previous) = setup.take() {
                    previous.cancel();
                }
                // Client-initiated disconnects are flushed inline by `disconnect`
                if reason != DisconnectReason::ClientDisconnect {
                    inner.on_transport_disconnected(&reason).await;
                }
            }
            LifecycleEvent::ReconnectAttempt { attempt } => {
                debug!(attempt, "Reconnecting...");
            }
            LifecycleEvent::Reconnected { attempt } => {
                debug!(attempt, "reconnected");
            }
            LifecycleEvent::ConnectError { message } => {
                warn!(error = %message, "Socket connection error");
            }
            LifecycleEvent::Closed => break,
        }
    }
    debug!("Lifecycle driver stopped");
}
