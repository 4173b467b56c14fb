//! Stub WebSocket host speaking the tether frame protocol
//!
//! Note: Some methods may appear unused because they're only used in specific
//! test files and clippy checks each test independently.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tether_core::transport::Frame;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

#[derive(Debug, Clone)]
enum HostCommand {
    Push { event: String, data: Value },
    DropAll,
}

/// In-process host bound to 127.0.0.1 on an ephemeral port
pub struct StubHost {
    /// Address to hand to `ClientConfig::new`
    pub url: String,
    frames: mpsc::UnboundedReceiver<Frame>,
    commands: broadcast::Sender<HostCommand>,
    connections: Arc<AtomicUsize>,
}

impl StubHost {
    /// Spawn a host serving under `path` (e.g. "" or "/api")
    pub async fn spawn(path: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (frames_tx, frames) = mpsc::unbounded_channel();
        let (commands, _) = broadcast::channel(64);
        let connections = Arc::new(AtomicUsize::new(0));

        let accept_commands = commands.clone();
        let accept_connections = Arc::clone(&connections);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                accept_connections.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(
                    stream,
                    frames_tx.clone(),
                    accept_commands.subscribe(),
                ));
            }
        });

        Self {
            url: format!("http://{}{}", addr, path),
            frames,
            commands,
            connections,
        }
    }

    /// Next frame the host received from any connection
    pub async fn next_frame(&mut self) -> Frame {
        tokio::time::timeout(Duration::from_secs(5), self.frames.recv())
            .await
            .expect("Timed out waiting for a frame")
            .expect("Host stopped")
    }

    /// Skip frames until an event named `name` arrives
    pub async fn next_event(&mut self, name: &str) -> Frame {
        loop {
            let frame = self.next_frame().await;
            if matches!(&frame, Frame::Event { event, .. } if event == name) {
                return frame;
            }
        }
    }

    /// Push an event to every open connection
    pub fn push(&self, event: &str, data: Value) {
        let _ = self.commands.send(HostCommand::Push {
            event: event.to_string(),
            data,
        });
    }

    /// Close every open connection from the host side
    pub fn drop_connections(&self) {
        let _ = self.commands.send(HostCommand::DropAll);
    }

    /// Number of connections accepted so far
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

/// Canned answers for requests
fn answer(event: &str, data: &Value) -> Value {
    match event {
        "getSessionId" => json!("abc123"),
        "getInstanceId" => json!("inst-1"),
        "echo" => data.get("args").cloned().unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

async fn serve(
    stream: TcpStream,
    frames: mpsc::UnboundedSender<Frame>,
    mut commands: broadcast::Receiver<HostCommand>,
) {
    let Ok(ws) = accept_async(stream).await else {
        return;
    };
    let (mut sink, mut source) = ws.split();

    loop {
        tokio::select! {
            message = source.next() => {
                let text = match message {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(_)) => continue,
                    _ => break,
                };
                let Ok(frame) = Frame::decode(&text) else { continue };

                if let Frame::Event { event, data, ack: Some(id) } = &frame {
                    let reply = Frame::Ack { id: *id, data: answer(event, data) };
                    let json = reply.encode().unwrap();
                    if sink.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                let _ = frames.send(frame);
            }
            command = commands.recv() => match command {
                Ok(HostCommand::Push { event, data }) => {
                    let json = Frame::event(event, data, None).encode().unwrap();
                    if sink.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Ok(HostCommand::DropAll) | Err(_) => {
                    let _ = sink.close().await;
                    break;
                }
            },
        }
    }
}
