//! Shared test utilities for tether-core integration tests

pub mod host;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tether_core::{ClientConfig, FlushPolicy, ListenerCallback, MockTransport, SocketClient};
use tokio::sync::mpsc;

/// Connects a client to a fresh mock host
#[allow(dead_code)]
pub async fn connect_mock(policy: FlushPolicy) -> (SocketClient, Arc<MockTransport>) {
    let transport = Arc::new(MockTransport::new());
    transport.respond_with("getSessionId", Value::from("abc123")).await;
    transport.respond_with("getInstanceId", Value::from("inst-1")).await;

    let config = ClientConfig::new("http://localhost:8080", policy).unwrap();
    let client = SocketClient::connect_with(config, transport.clone())
        .await
        .expect("Failed to connect to mock host");
    (client, transport)
}

/// Callback that forwards every payload into a channel
#[allow(dead_code)]
pub fn recorder() -> (ListenerCallback, mpsc::UnboundedReceiver<Value>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let callback: ListenerCallback = Arc::new(move |data| {
        let tx = tx.clone();
        Box::pin(async move {
            let _ = tx.send(data);
        })
    });
    (callback, rx)
}

/// Receive the next payload or panic after a generous timeout
#[allow(dead_code)]
pub async fn next_payload(rx: &mut mpsc::UnboundedReceiver<Value>) -> Value {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("Timed out waiting for callback")
        .expect("Callback channel closed")
}

/// Assert nothing else arrives within a short window
#[allow(dead_code)]
pub async fn assert_quiet(rx: &mut mpsc::UnboundedReceiver<Value>) {
    let extra = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
    assert!(extra.is_err(), "Unexpected extra delivery: {:?}", extra);
}

/// Let spawned fan-out and lifecycle tasks run
#[allow(dead_code)]
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}
