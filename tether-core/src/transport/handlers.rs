//! Handler bookkeeping shared by transport implementations

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::trace;

use super::traits::{AnyHandler, EventHandler};

/// Named and catch-all handlers attached to a transport
///
/// Handlers live as long as the transport, not the connection, so they
/// survive reconnects.
#[derive(Default)]
pub struct HandlerRegistry {
    named: RwLock<HashMap<String, Vec<EventHandler>>>,
    any: RwLock<Vec<AnyHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, event: &str, handler: EventHandler) {
        self.named
            .write()
            .await
            .entry(event.to_string())
            .or_default()
            .push(handler);
    }

    pub async fn add_any(&self, handler: AnyHandler) {
        self.any.write().await.push(handler);
    }

    pub async fn count(&self, event: &str) -> usize {
        self.named.read().await.get(event).map_or(0, Vec::len)
    }

    /// Deliver an inbound event.
    ///
    /// Catch-all handlers run inline. Named handlers are called in arrival
    /// order and the futures they return run in their own tasks, so a slow
    /// handler never stalls the read loop.
    pub async fn dispatch(&self, event: &str, data: Value) {
        let any = self.any.read().await.clone();
        for handler in &any {
            handler(event, &data);
        }

        let named = self
            .named
            .read()
            .await
            .get(event)
            .cloned()
            .unwrap_or_default();
        trace!(event = %event, handlers = named.len(), "Dispatching inbound event");
        for handler in named {
            tokio::spawn(handler(data.clone()));
        }
    }
}
