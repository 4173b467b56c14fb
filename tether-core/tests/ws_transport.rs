//! WebSocket transport against an in-process stub host

mod common;

use std::time::Duration;

use common::host::StubHost;
use common::{assert_quiet, next_payload, recorder};
use serde_json::json;
use tether_core::transport::{Frame, HandshakeAuth};
use tether_core::{
    Args, ClientConfig, ClientError, FlushPolicy, ReconnectConfig, SocketClient, TransportError,
};
use tokio::net::TcpListener;

fn fast_reconnect() -> ReconnectConfig {
    ReconnectConfig {
        initial_delay: Duration::from_millis(20),
        max_delay: Duration::from_millis(200),
        ..ReconnectConfig::default()
    }
}

async fn connect(host: &StubHost, policy: FlushPolicy) -> SocketClient {
    let config = ClientConfig::new(&host.url, policy)
        .unwrap()
        .with_api_key("secret")
        .with_reconnect(fast_reconnect());
    SocketClient::connect(config).await.expect("Failed to connect")
}

#[tokio::test]
async fn handshake_carries_credential_then_mirroring_request() {
    let mut host = StubHost::spawn("/api/").await;
    let client = connect(&host, FlushPolicy::FlushOnDisconnect).await;

    assert_eq!(
        host.next_frame().await,
        Frame::Handshake {
            auth: HandshakeAuth {
                api_key: Some("secret".to_string())
            }
        }
    );
    assert_eq!(
        host.next_frame().await,
        Frame::event("register_ev", json!({}), None)
    );

    client.close().await;
}

#[tokio::test]
async fn ask_round_trips_through_host() {
    let host = StubHost::spawn("").await;
    let client = connect(&host, FlushPolicy::FlushOnDisconnect).await;

    let session = client.ask("getSessionId", Args::None).await.unwrap();
    let echoed = client.ask("echo", json!({"a": 1})).await.unwrap();

    assert_eq!(session, json!("abc123"));
    assert_eq!(echoed, json!({"a": 1}));
    client.close().await;
}

#[tokio::test]
async fn pushed_events_reach_listener_once() {
    let mut host = StubHost::spawn("").await;
    let client = connect(&host, FlushPolicy::FlushOnDisconnect).await;
    let (callback, mut rx) = recorder();

    client.listen_boxed("onMessage", callback).await.unwrap();
    let announcement = host.next_event("onMessage").await;
    assert!(matches!(announcement, Frame::Event { ack: Some(_), .. }));

    host.push("onMessage", json!({"body": "hi"}));

    assert_eq!(next_payload(&mut rx).await, json!({"body": "hi"}));
    assert_quiet(&mut rx).await;
    client.close().await;
}

#[tokio::test]
async fn host_drop_triggers_reconnect_and_replay() {
    let mut host = StubHost::spawn("").await;
    let client = connect(&host, FlushPolicy::RetainOnDisconnect).await;
    let (callback, mut rx) = recorder();
    client.listen_boxed("onMessage", callback).await.unwrap();
    host.next_event("onMessage").await;

    host.drop_connections();

    // Re-announcement arrives on the new connection
    host.next_event("onMessage").await;
    assert_eq!(host.connections(), 2);
    tokio::time::sleep(Duration::from_millis(50)).await;

    host.push("onMessage", json!("after reconnect"));
    assert_eq!(next_payload(&mut rx).await, json!("after reconnect"));
    assert_quiet(&mut rx).await;
    client.close().await;
}

#[tokio::test]
async fn manual_disconnect_does_not_reconnect() {
    let host = StubHost::spawn("").await;
    let client = connect(&host, FlushPolicy::RetainOnDisconnect).await;

    client.disconnect().await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(!client.is_connected());
    assert_eq!(host.connections(), 1);

    client.reconnect().await.unwrap();
    assert!(client.is_connected());
    assert_eq!(host.connections(), 2);
    client.close().await;
}

#[tokio::test]
async fn connect_to_closed_port_fails() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = ClientConfig::new(&format!("http://{}", addr), FlushPolicy::FlushOnDisconnect)
        .unwrap()
        .with_reconnect(ReconnectConfig::disabled());
    let err = SocketClient::connect(config).await.unwrap_err();

    assert!(matches!(
        err,
        ClientError::Transport(TransportError::Connect { .. })
    ));
}
