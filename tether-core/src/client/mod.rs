//! The socket client
//!
//! [`SocketClient`] ties the transport, the subscription table and the local
//! bus together. Two primitives carry everything else:
//!
//! - `ask` sends one request and resolves with the host's acknowledgement
//! - `listen` registers a callback for a pushed event
//!
//! The client survives reconnects: listener registrations are re-announced
//! after every successful connection, and a transport-level subscription is
//! only ever attached once per event name.

pub mod args;
pub mod dispatch;
mod lifecycle;
pub mod registry;

use std::future::Future;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, OnceLock};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub use args::Args;
pub use dispatch::{ConcreteOp, LISTENER_PREFIX, Route, is_listener_name};
pub use lifecycle::REGISTER_EV;
pub use registry::{ListenerCallback, ListenerId, SubscriptionRegistry};

use crate::collector::{
    AwaitMessagesOptions, ChatTarget, Collection, CollectorFilter, CollectorOptions,
    CollectorScope, MessageCollector,
};
use crate::config::ClientConfig;
use crate::error::{ClientError, CollectorError};
use crate::events::LocalBus;
use crate::transport::{Transport, WsTransport};

/// Remote method that ends the host session
pub const KILL_METHOD: &str = "kill";

/// Client for a remote host reachable over a socket transport
#[derive(Clone)]
pub struct SocketClient {
    inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    registry: Arc<SubscriptionRegistry>,
    bus: OnceLock<LocalBus>,
    /// Whether the transport → bus forwarder is attached
    mirror_attached: AtomicBool,
    /// Number of completed post-connect setups
    setups: watch::Sender<u64>,
    shutdown: CancellationToken,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl ClientInner {
    fn ensure_open(&self) -> Result<(), ClientError> {
        if self.shutdown.is_cancelled() {
            return Err(ClientError::Closed);
        }
        Ok(())
    }

    pub(super) async fn ask(&self, method: &str, args: Args) -> Result<Value, ClientError> {
        self.ensure_open()?;
        debug!(method = %method, "ask");
        let ack = self
            .transport
            .emit_with_ack(method, args.into_payload())
            .await?;
        ack.await.map_err(|_| ClientError::AckDropped {
            method: method.to_string(),
        })
    }

    /// Wait until more than `baseline` post-connect setups have completed.
    async fn wait_for_setup(
        &self,
        setups: &mut watch::Receiver<u64>,
        baseline: u64,
    ) -> Result<(), ClientError> {
        tokio::select! {
            _ = self.shutdown.cancelled() => Err(ClientError::Closed),
            result = setups.wait_for(|completed| *completed > baseline) => {
                result.map(|_| ()).map_err(|_| ClientError::Closed)
            }
        }
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl SocketClient {
    /// Connect to the host described by `config` over a WebSocket.
    ///
    /// Resolves once the first connection is up and post-connect setup has
    /// completed. Fails if that first attempt fails.
    pub async fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        let transport = Arc::new(WsTransport::from_config(&config));
        Self::connect_with(config, transport).await
    }

    /// Connect over an already constructed transport.
    pub async fn connect_with(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ClientError> {
        let lifecycle_events = transport.lifecycle();
        let (setups, _) = watch::channel(0);
        let inner = Arc::new(ClientInner {
            config,
            transport,
            registry: Arc::new(SubscriptionRegistry::new()),
            bus: OnceLock::new(),
            mirror_attached: AtomicBool::new(false),
            setups,
            shutdown: CancellationToken::new(),
            driver: Mutex::new(None),
        });

        let driver = tokio::spawn(lifecycle::drive(
            Arc::downgrade(&inner),
            lifecycle_events,
            inner.shutdown.clone(),
        ));
        *inner.driver.lock().await = Some(driver);

        let client = Self { inner };
        info!(address = %client.inner.config.address, "Connecting");

        let mut setups = client.inner.setups.subscribe();
        if let Err(e) = client.inner.transport.connect().await {
            client.close().await;
            return Err(e.into());
        }
        client.inner.wait_for_setup(&mut setups, 0).await?;

        info!(address = %client.inner.config.address, "Connected");
        Ok(client)
    }

    /// Force a new connection attempt and wait for post-connect setup.
    ///
    /// Returns immediately when already connected.
    pub async fn reconnect(&self) -> Result<(), ClientError> {
        self.inner.ensure_open()?;
        if self.is_connected() {
            return Ok(());
        }

        let mut setups = self.inner.setups.subscribe();
        let baseline = *setups.borrow_and_update();
        self.inner.transport.connect().await?;
        self.inner.wait_for_setup(&mut setups, baseline).await
    }

    /// Drop the connection. A later [`reconnect`](Self::reconnect) restores it.
    pub async fn disconnect(&self) {
        info!("Disconnecting");
        self.inner.transport.disconnect().await;
        if self.inner.config.flush_policy.flushes() {
            self.inner.registry.flush().await;
        }
    }

    /// Release the transport and stop every background task.
    ///
    /// Pending requests fail with [`ClientError::AckDropped`]; later calls
    /// fail with [`ClientError::Closed`].
    pub async fn close(&self) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        info!("Closing client");
        self.inner.shutdown.cancel();
        self.inner.transport.close().await;
        if let Some(driver) = self.inner.driver.lock().await.take() {
            driver.abort();
        }
    }

    /// Ask the host to end its session, then close.
    pub async fn kill_session(&self) -> Result<(), ClientError> {
        let result = self.inner.ask(KILL_METHOD, Args::None).await;
        self.close().await;
        result.map(|_| ())
    }

    /// Run `callback` once connected: immediately when the connection is up,
    /// otherwise after the next completed post-connect setup.
    pub fn on_connected<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_connected() {
            callback();
            return;
        }

        let mut setups = self.inner.setups.subscribe();
        let baseline = *setups.borrow_and_update();
        let shutdown = self.inner.shutdown.clone();
        tokio::spawn(async move {
            let ready = tokio::select! {
                _ = shutdown.cancelled() => false,
                result = setups.wait_for(|completed| *completed > baseline) => result.is_ok(),
            };
            if ready {
                callback();
            }
        });
    }

    pub fn is_connected(&self) -> bool {
        self.inner.transport.is_connected()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Invoke `method` on the host and wait for its acknowledgement.
    ///
    /// There is no timeout. While disconnected the request is buffered and
    /// completes after the connection comes back.
    pub async fn ask(&self, method: &str, args: impl Into<Args>) -> Result<Value, ClientError> {
        self.inner.ask(method, args.into()).await
    }

    /// [`ask`](Self::ask) and deserialize the acknowledgement.
    pub async fn ask_as<T: DeserializeOwned>(
        &self,
        method: &str,
        args: impl Into<Args>,
    ) -> Result<T, ClientError> {
        let value = self.ask(method, args).await?;
        serde_json::from_value(value).map_err(|e| ClientError::UnexpectedResponse {
            method: method.to_string(),
            message: e.to_string(),
        })
    }

    /// Register `callback` for the pushed event `event`.
    ///
    /// The first callback for an event announces interest to the host and
    /// attaches the transport subscription. Every callback registered at
    /// delivery time is invoked once per event.
    pub async fn listen<F, Fut>(&self, event: &str, callback: F) -> Result<ListenerId, ClientError>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let callback: ListenerCallback = Arc::new(move |data| Box::pin(callback(data)));
        self.listen_boxed(event, callback).await
    }

    pub async fn listen_boxed(
        &self,
        event: &str,
        callback: ListenerCallback,
    ) -> Result<ListenerId, ClientError> {
        self.inner.ensure_open()?;
        debug!(event = %event, "listen");

        let (id, first) = self.inner.registry.insert(event, callback).await;
        if first && let Err(e) = self.inner.register_listener(event).await {
            self.inner.registry.discard(event, &id).await;
            return Err(e);
        }
        Ok(id)
    }

    /// Remove one callback. Returns false when `event` or `id` is unknown.
    ///
    /// The transport subscription for `event` stays attached.
    pub async fn stop_listener(&self, event: &str, id: &ListenerId) -> bool {
        debug!(event = %event, id = %id, "stop listener");
        self.inner.registry.remove(event, id).await
    }

    /// Remove every registered callback.
    pub async fn flush_listeners(&self) {
        self.inner.registry.flush().await;
    }

    /// Number of callbacks registered for `event`.
    pub async fn listener_count(&self, event: &str) -> usize {
        self.inner.registry.callback_count(event).await
    }

    /// The local bus mirroring every inbound event.
    pub fn bus(&self) -> &LocalBus {
        self.inner.ensure_bus()
    }

    /// Start collecting messages for the chat identified by `target`.
    ///
    /// `target` may be a message (`chat.id` or `chatId`), a chat (`id`) or a
    /// plain chat id string. The window is scoped to the host's current
    /// session and instance.
    pub async fn create_message_collector(
        &self,
        target: &Value,
        filter: CollectorFilter,
        options: CollectorOptions,
    ) -> Result<MessageCollector, ClientError> {
        let chat_id = ChatTarget::from_value(target).ok_or(ClientError::UnresolvedTarget)?;
        let session_id: String = self.ask_as("getSessionId", Args::None).await?;
        let instance_id: String = self.ask_as("getInstanceId", Args::None).await?;

        let scope = CollectorScope {
            session_id,
            instance_id,
            chat_id,
        };
        Ok(MessageCollector::new(self.bus(), scope, filter, options))
    }

    /// Collect messages and wait for the window to end.
    ///
    /// Resolves with whatever was collected unless the end reason is listed in
    /// `options.errors`, in which case the partial collection travels with
    /// [`CollectorError::Ended`].
    pub async fn await_messages(
        &self,
        target: &Value,
        filter: CollectorFilter,
        options: AwaitMessagesOptions,
    ) -> Result<Collection, CollectorError> {
        let mut collector = self
            .create_message_collector(target, filter, options.collector.clone())
            .await?;
        let end = collector.ended().await?;

        if options.is_error(end.reason) {
            return Err(CollectorError::Ended {
                reason: end.reason,
                collection: end.collection,
            });
        }
        Ok(end.collection)
    }
}

impl std::fmt::Debug for SocketClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketClient")
            .field("address", &self.inner.config.address)
            .field("connected", &self.is_connected())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
