//! WebSocket transport
//!
//! Speaks the JSON frame protocol from [`super::frame`] over
//! `tokio-tungstenite`. One session task owns the socket while connected;
//! outgoing frames go through a queue that outlives sessions, so anything
//! emitted while disconnected is sent after the next successful connect.
//!
//! Unexpected drops trigger automatic reconnection with exponential backoff
//! (see [`ReconnectConfig`]). A client-requested `disconnect` does not.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, broadcast, mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::frame::Frame;
use super::handlers::HandlerRegistry;
use super::traits::{AnyHandler, DisconnectReason, EventHandler, LifecycleEvent, Transport};
use crate::config::{ClientConfig, ConnectAddress, ReconnectConfig};
use crate::error::TransportError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Transport over a WebSocket connection to the host
#[derive(Clone)]
pub struct WsTransport {
    inner: Arc<WsInner>,
}

impl std::fmt::Debug for WsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsTransport")
            .field("endpoint", &self.inner.endpoint)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

struct WsInner {
    endpoint: String,
    api_key: Option<String>,
    reconnect: ReconnectConfig,
    handlers: HandlerRegistry,
    lifecycle: broadcast::Sender<LifecycleEvent>,
    connected: AtomicBool,
    /// Set by `disconnect`; suppresses automatic reconnection
    manual: AtomicBool,
    outgoing_tx: mpsc::UnboundedSender<Frame>,
    outgoing_rx: Arc<Mutex<mpsc::UnboundedReceiver<Frame>>>,
    pending: Mutex<HashMap<u64, oneshot::Sender<Value>>>,
    next_ack: AtomicU64,
    /// Cancels the current session task
    session: Mutex<Option<CancellationToken>>,
    /// Serializes connection attempts
    connect_lock: Mutex<()>,
    shutdown: CancellationToken,
}

impl WsTransport {
    /// Create a transport for `address`. Nothing connects until [`Transport::connect`].
    pub fn new(address: &ConnectAddress, api_key: Option<String>, reconnect: ReconnectConfig) -> Self {
        let (lifecycle, _) = broadcast::channel(64);
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(WsInner {
                endpoint: address.endpoint(),
                api_key,
                reconnect,
                handlers: HandlerRegistry::new(),
                lifecycle,
                connected: AtomicBool::new(false),
                manual: AtomicBool::new(false),
                outgoing_tx,
                outgoing_rx: Arc::new(Mutex::new(outgoing_rx)),
                pending: Mutex::new(HashMap::new()),
                next_ack: AtomicU64::new(0),
                session: Mutex::new(None),
                connect_lock: Mutex::new(()),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(
            &config.address,
            config.api_key.clone(),
            config.reconnect.clone(),
        )
    }

    /// Endpoint URL the transport dials.
    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }
}

impl WsInner {
    fn notify(&self, event: LifecycleEvent) {
        // No receivers is fine
        let _ = self.lifecycle.send(event);
    }

    /// Dial the endpoint, send the handshake and start a session task.
    async fn open(self: &Arc<Self>) -> Result<(), TransportError> {
        let connect_error = |message: String| TransportError::Connect {
            url: self.endpoint.clone(),
            message,
        };

        let (ws_stream, _response) = connect_async(self.endpoint.as_str())
            .await
            .map_err(|e| connect_error(e.to_string()))?;
        let (mut sink, source) = ws_stream.split();

        let handshake = Frame::handshake(self.api_key.clone()).encode()?;
        sink.send(Message::Text(handshake.into()))
            .await
            .map_err(|e| connect_error(e.to_string()))?;

        let token = self.shutdown.child_token();
        *self.session.lock().await = Some(token.clone());
        self.connected.store(true, Ordering::SeqCst);

        tokio::spawn(Arc::clone(self).run_session(sink, source, token));
        Ok(())
    }

    /// Pump frames until the session is cancelled or the socket drops.
    async fn run_session(self: Arc<Self>, mut sink: WsSink, mut source: WsSource, token: CancellationToken) {
        let mut outgoing = Arc::clone(&self.outgoing_rx).lock_owned().await;

        let dropped = loop {
            tokio::select! {
                _ = token.cancelled() => {
                    let _ = sink.close().await;
                    break None;
                }
                frame = outgoing.recv() => {
                    let Some(frame) = frame else { break None };
                    match frame.encode() {
                        Ok(json) => {
                            debug!("Sending: {}", json);
                            if let Err(e) = sink.send(Message::Text(json.into())).await {
                                warn!("Failed to send WebSocket message: {}", e);
                                break Some(DisconnectReason::TransportError(e.to_string()));
                            }
                        }
                        Err(e) => warn!("Failed to serialize frame: {}", e),
                    }
                }
                message = source.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            let text_str: &str = &text;
                            self.handle_text(text_str).await;
                        }
                        Some(Ok(Message::Close(_))) => {
                            debug!("Received close message");
                            break Some(DisconnectReason::ServerDisconnect);
                        }
                        Some(Ok(
                            Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_),
                        )) => {}
                        Some(Err(e)) => {
                            warn!("WebSocket error: {}", e);
                            break Some(DisconnectReason::TransportError(e.to_string()));
                        }
                        None => break Some(DisconnectReason::TransportClose),
                    }
                }
            }
        };
        drop(outgoing);

        let Some(reason) = dropped else {
            return;
        };

        if self.connected.swap(false, Ordering::SeqCst) {
            info!(reason = %reason.as_str(), "Disconnected from host");
            self.notify(LifecycleEvent::Disconnected { reason });
        }

        if !self.manual.load(Ordering::SeqCst)
            && !self.shutdown.is_cancelled()
            && self.reconnect.enabled
        {
            tokio::spawn(self.reconnect_loop());
        }
    }

    async fn handle_text(&self, text: &str) {
        debug!("Received: {}", text);
        match Frame::decode(text) {
            Ok(Frame::Event { event, data, ack }) => {
                if ack.is_some() {
                    debug!(event = %event, "Host requested an ack; not supported, ignoring id");
                }
                self.handlers.dispatch(&event, data).await;
            }
            Ok(Frame::Ack { id, data }) => match self.pending.lock().await.remove(&id) {
                Some(tx) => {
                    let _ = tx.send(data);
                }
                None => debug!(id, "Ack for unknown request"),
            },
            Ok(Frame::Handshake { .. }) => debug!("Ignoring handshake frame from host"),
            Err(e) => warn!("Failed to parse host frame: {}", e),
        }
    }

    /// Retry until connected, reconnection is disabled, or attempts run out.
    ///
    /// Boxed because sessions and this loop spawn each other.
    fn reconnect_loop(self: Arc<Self>) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
            let mut attempt = 0;
            while self.reconnect.allows_attempt(attempt) {
                let delay = self.reconnect.delay_for_attempt(attempt);
                attempt += 1;

                tokio::select! {
                    _ = self.shutdown.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
                if self.manual.load(Ordering::SeqCst) {
                    return;
                }

                let _guard = self.connect_lock.lock().await;
                if self.connected.load(Ordering::SeqCst) {
                    return;
                }

                debug!(attempt, "Reconnecting...");
                self.notify(LifecycleEvent::ReconnectAttempt { attempt });
                match self.open().await {
                    Ok(()) => {
                        info!(attempt, "Reconnected to host");
                        self.notify(LifecycleEvent::Connected);
                        self.notify(LifecycleEvent::Reconnected { attempt });
                        return;
                    }
                    Err(e) => {
                        warn!(attempt, error = %e, "Reconnection attempt failed");
                        self.notify(LifecycleEvent::ConnectError {
                            message: e.to_string(),
                        });
                    }
                }
            }
            warn!(attempts = attempt, "Giving up on reconnection");
        })
    }

    async fn end_session(&self) -> bool {
        if let Some(token) = self.session.lock().await.take() {
            token.cancel();
        }
        self.connected.swap(false, Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let inner = &self.inner;
        if inner.shutdown.is_cancelled() {
            return Err(TransportError::Closed);
        }

        let _guard = inner.connect_lock.lock().await;
        if inner.connected.load(Ordering::SeqCst) {
            return Ok(());
        }
        inner.manual.store(false, Ordering::SeqCst);

        match inner.open().await {
            Ok(()) => {
                info!(endpoint = %inner.endpoint, "Connected to host");
                inner.notify(LifecycleEvent::Connected);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Socket connection error");
                inner.notify(LifecycleEvent::ConnectError {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn disconnect(&self) {
        self.inner.manual.store(true, Ordering::SeqCst);
        if self.inner.end_session().await {
            info!("Disconnected by client");
            self.inner.notify(LifecycleEvent::Disconnected {
                reason: DisconnectReason::ClientDisconnect,
            });
        }
    }

    async fn close(&self) {
        let inner = &self.inner;
        inner.manual.store(true, Ordering::SeqCst);
        let was_connected = inner.end_session().await;
        inner.shutdown.cancel();
        inner.pending.lock().await.clear();

        if was_connected {
            inner.notify(LifecycleEvent::Disconnected {
                reason: DisconnectReason::ClientDisconnect,
            });
        }
        inner.notify(LifecycleEvent::Closed);
        info!("Transport closed");
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    async fn emit(&self, event: &str, data: Value) -> Result<(), TransportError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(TransportError::Closed);
        }
        self.inner
            .outgoing_tx
            .send(Frame::event(event, data, None))
            .map_err(|_| TransportError::Closed)
    }

    async fn emit_with_ack(
        &self,
        event: &str,
        data: Value,
    ) -> Result<oneshot::Receiver<Value>, TransportError> {
        let inner = &self.inner;
        if inner.shutdown.is_cancelled() {
            return Err(TransportError::Closed);
        }

        let id = inner.next_ack.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        inner.pending.lock().await.insert(id, tx);

        if inner
            .outgoing_tx
            .send(Frame::event(event, data, Some(id)))
            .is_err()
        {
            inner.pending.lock().await.remove(&id);
            return Err(TransportError::Closed);
        }
        Ok(rx)
    }

    async fn on(&self, event: &str, handler: EventHandler) {
        self.inner.handlers.add(event, handler).await;
    }

    async fn listener_count(&self, event: &str) -> usize {
        self.inner.handlers.count(event).await
    }

    async fn on_any(&self, handler: AnyHandler) {
        self.inner.handlers.add_any(handler).await;
    }

    fn lifecycle(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.inner.lifecycle.subscribe()
    }
}
