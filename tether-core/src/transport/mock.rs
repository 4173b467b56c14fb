//! In-memory transport with a scriptable host
//!
//! MockTransport plays both ends: it implements [`Transport`] for the client
//! and exposes host-side controls (`respond`, `push`, `drop_connection`) so
//! tests can drive the connection lifecycle deterministically.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, broadcast, oneshot};
use tracing::debug;

use super::handlers::HandlerRegistry;
use super::traits::{AnyHandler, DisconnectReason, EventHandler, LifecycleEvent, Transport};
use crate::error::TransportError;

/// Host-side answer to a request. `None` leaves the request unanswered.
pub type Responder = Arc<dyn Fn(Value) -> Option<Value> + Send + Sync>;

/// A frame the host received from the client
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedFrame {
    pub event: String,
    pub data: Value,
    /// Whether the client asked for an acknowledgement
    pub with_ack: bool,
}

#[derive(Default)]
struct MockState {
    responders: HashMap<String, Responder>,
    received: Vec<ReceivedFrame>,
    /// Emissions made while disconnected, delivered on the next connect
    queued: Vec<(ReceivedFrame, Option<oneshot::Sender<Value>>)>,
    /// Requests the host never answered
    unanswered: Vec<oneshot::Sender<Value>>,
    failing_connects: u32,
    fail_emits: bool,
}

/// Mock implementation of Transport for testing
pub struct MockTransport {
    handlers: HandlerRegistry,
    lifecycle: broadcast::Sender<LifecycleEvent>,
    connected: AtomicBool,
    closed: AtomicBool,
    state: Mutex<MockState>,
}

impl MockTransport {
    pub fn new() -> Self {
        let (lifecycle, _) = broadcast::channel(64);
        Self {
            handlers: HandlerRegistry::new(),
            lifecycle,
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            state: Mutex::new(MockState::default()),
        }
    }

    fn notify(&self, event: LifecycleEvent) {
        let _ = self.lifecycle.send(event);
    }

    /// Answer requests for `method` with `responder`.
    ///
    /// Methods without a responder are acknowledged with `null`.
    pub async fn respond<F>(&self, method: &str, responder: F)
    where
        F: Fn(Value) -> Option<Value> + Send + Sync + 'static,
    {
        self.state
            .lock()
            .await
            .responders
            .insert(method.to_string(), Arc::new(responder));
    }

    /// Always acknowledge `method` with `value`.
    pub async fn respond_with(&self, method: &str, value: Value) {
        self.respond(method, move |_| Some(value.clone())).await;
    }

    /// Never acknowledge `method`.
    pub async fn never_answer(&self, method: &str) {
        self.respond(method, |_| None).await;
    }

    /// Make the next `count` connection attempts fail.
    pub async fn fail_next_connects(&self, count: u32) {
        self.state.lock().await.failing_connects = count;
    }

    /// Make every emission fail synchronously.
    pub async fn fail_emits(&self, fail: bool) {
        self.state.lock().await.fail_emits = fail;
    }

    /// Push an event from the host. Returns false when not connected.
    pub async fn push(&self, event: &str, data: Value) -> bool {
        if !self.is_connected() {
            return false;
        }
        self.handlers.dispatch(event, data).await;
        true
    }

    /// Simulate the host dropping the connection.
    pub fn drop_connection(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.notify(LifecycleEvent::Disconnected {
                reason: DisconnectReason::TransportClose,
            });
        }
    }

    /// Simulate the transport's own reconnection succeeding.
    pub async fn auto_reconnect(&self, attempt: u32) {
        self.notify(LifecycleEvent::ReconnectAttempt { attempt });
        self.establish().await;
        self.notify(LifecycleEvent::Reconnected { attempt });
    }

    /// Every frame the host received, in order.
    pub async fn received(&self) -> Vec<ReceivedFrame> {
        self.state.lock().await.received.clone()
    }

    /// Frames the host received for one event name.
    pub async fn received_for(&self, event: &str) -> Vec<ReceivedFrame> {
        self.received()
            .await
            .into_iter()
            .filter(|frame| frame.event == event)
            .collect()
    }

    async fn establish(&self) {
        self.connected.store(true, Ordering::SeqCst);
        let queued = std::mem::take(&mut self.state.lock().await.queued);
        for (frame, ack) in queued {
            self.deliver(frame, ack).await;
        }
        self.notify(LifecycleEvent::Connected);
    }

    async fn deliver(&self, frame: ReceivedFrame, ack: Option<oneshot::Sender<Value>>) {
        let mut state = self.state.lock().await;
        debug!(event = %frame.event, "Mock host received frame");
        let responder = state.responders.get(&frame.event).cloned();
        let data = frame.data.clone();
        state.received.push(frame);

        let Some(tx) = ack else { return };
        let answer = match responder {
            Some(responder) => responder(data),
            None => Some(Value::Null),
        };
        match answer {
            Some(value) => {
                let _ = tx.send(value);
            }
            None => state.unanswered.push(tx),
        }
    }

    async fn send(
        &self,
        event: &str,
        data: Value,
        ack: Option<oneshot::Sender<Value>>,
    ) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let frame = ReceivedFrame {
            event: event.to_string(),
            data,
            with_ack: ack.is_some(),
        };

        {
            let mut state = self.state.lock().await;
            if state.fail_emits {
                return Err(TransportError::Emit {
                    event: event.to_string(),
                    message: "emission rejected by mock".to_string(),
                });
            }
            if !self.is_connected() {
                state.queued.push((frame, ack));
                return Ok(());
            }
        }

        self.deliver(frame, ack).await;
        Ok(())
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if self.is_connected() {
            return Ok(());
        }

        {
            let mut state = self.state.lock().await;
            if state.failing_connects > 0 {
                state.failing_connects -= 1;
                drop(state);
                let message = "mock host refused connection".to_string();
                self.notify(LifecycleEvent::ConnectError {
                    message: message.clone(),
                });
                return Err(TransportError::Connect {
                    url: "mock://host".to_string(),
                    message,
                });
            }
        }

        self.establish().await;
        Ok(())
    }

    async fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.notify(LifecycleEvent::Disconnected {
                reason: DisconnectReason::ClientDisconnect,
            });
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.disconnect().await;
        let mut state = self.state.lock().await;
        state.queued.clear();
        state.unanswered.clear();
        drop(state);
        self.notify(LifecycleEvent::Closed);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn emit(&self, event: &str, data: Value) -> Result<(), TransportError> {
        self.send(event, data, None).await
    }

    async fn emit_with_ack(
        &self,
        event: &str,
        data: Value,
    ) -> Result<oneshot::Receiver<Value>, TransportError> {
        let (tx, rx) = oneshot::channel();
        self.send(event, data, Some(tx)).await?;
        Ok(rx)
    }

    async fn on(&self, event: &str, handler: EventHandler) {
        self.handlers.add(event, handler).await;
    }

    async fn listener_count(&self, event: &str) -> usize {
        self.handlers.count(event).await
    }

    async fn on_any(&self, handler: AnyHandler) {
        self.handlers.add_any(handler).await;
    }

    fn lifecycle(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.lifecycle.subscribe()
    }
}
