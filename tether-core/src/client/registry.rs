//! Subscription table and fan-out
//!
//! Maps each event name to the callbacks registered for it. The transport
//! only ever sees one handler per event name: a fan-out closure that looks up
//! the callbacks registered at delivery time.
//!
//! Events for one name are queued and fanned out one after another, so every
//! callback sees them in arrival order.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};

use serde_json::Value;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error};
use uuid::Uuid;

use crate::transport::{EventHandler, Transport};

/// Identifier returned by `listen`, used to remove one callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl ListenerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Callback invoked with the payload of a pushed event
pub type ListenerCallback =
    Arc<dyn Fn(Value) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Event name → (listener id → callback)
#[derive(Default)]
pub struct SubscriptionRegistry {
    table: RwLock<HashMap<String, HashMap<ListenerId, ListenerCallback>>>,
    /// Serializes "check then attach" against the transport
    attach_lock: Mutex<()>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback. The flag is true when this created the entry for
    /// `event`, meaning the caller must announce interest to the host.
    pub async fn insert(&self, event: &str, callback: ListenerCallback) -> (ListenerId, bool) {
        let id = ListenerId::new();
        let mut table = self.table.write().await;
        let first = !table.contains_key(event);
        table.entry(event.to_string()).or_default().insert(id, callback);
        (id, first)
    }

    /// Remove one callback. Unknown event names and ids yield `false`.
    ///
    /// The entry for `event` stays even when it becomes empty.
    pub async fn remove(&self, event: &str, id: &ListenerId) -> bool {
        self.table
            .write()
            .await
            .get_mut(event)
            .is_some_and(|callbacks| callbacks.remove(id).is_some())
    }

    /// Remove one callback and drop the entry when nothing is left, so the
    /// next `listen` announces again.
    pub async fn discard(&self, event: &str, id: &ListenerId) {
        let mut table = self.table.write().await;
        if let Some(callbacks) = table.get_mut(event) {
            callbacks.remove(id);
            if callbacks.is_empty() {
                table.remove(event);
            }
        }
    }

    /// Clear every event name and callback.
    pub async fn flush(&self) {
        let mut table = self.table.write().await;
        debug!(events = table.len(), "Listeners, flushing...");
        table.clear();
    }

    /// Event names currently present in the table.
    pub async fn event_names(&self) -> Vec<String> {
        self.table.read().await.keys().cloned().collect()
    }

    pub async fn contains(&self, event: &str) -> bool {
        self.table.read().await.contains_key(event)
    }

    /// Number of callbacks registered for `event`.
    pub async fn callback_count(&self, event: &str) -> usize {
        self.table.read().await.get(event).map_or(0, HashMap::len)
    }

    pub async fn is_empty(&self) -> bool {
        self.table.read().await.is_empty()
    }

    async fn callbacks(&self, event: &str) -> Vec<ListenerCallback> {
        self.table
            .read()
            .await
            .get(event)
            .map(|callbacks| callbacks.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Attach the fan-out handler for `event` unless the transport already
    /// has one. Returns true when a handler was attached.
    pub async fn ensure_transport_subscription(
        self: &Arc<Self>,
        transport: &dyn Transport,
        event: &str,
    ) -> bool {
        let _guard = self.attach_lock.lock().await;
        if transport.listener_count(event).await > 0 {
            return false;
        }
        debug!(event = %event, "Attaching transport subscription");
        transport
            .on(event, fan_out_handler(Arc::downgrade(self), event))
            .await;
        true
    }

    /// Invoke every callback registered for `event` and wait for all of them.
    ///
    /// Each callback runs in its own task so a slow or panicking callback does
    /// not hold back the others. Returns the number of callbacks invoked.
    pub async fn fan_out(&self, event: &str, data: Value) -> usize {
        let callbacks = self.callbacks(event).await;
        let count = callbacks.len();

        let mut tasks = JoinSet::new();
        for callback in callbacks {
            tasks.spawn(callback(data.clone()));
        }
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!(event = %event, error = %e, "Listener callback failed");
            }
        }
        count
    }
}

/// Transport handler for `event`: enqueue the payload for a single delivery
/// task that fans out each event before taking the next.
fn fan_out_handler(registry: Weak<SubscriptionRegistry>, event: &str) -> EventHandler {
    let (tx, mut rx) = mpsc::unbounded_channel::<Value>();

    let name = event.to_string();
    tokio::spawn(async move {
        while let Some(data) = rx.recv().await {
            let Some(registry) = registry.upgrade() else {
                break;
            };
            registry.fan_out(&name, data).await;
        }
        debug!(event = %name, "Fan-out queue closed");
    });

    Arc::new(move |data| {
        // Enqueued at dispatch time, before the returned future is polled
        let _ = tx.send(data);
        Box::pin(async {})
    })
}
