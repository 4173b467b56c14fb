//! Local broadcast bus
//!
//! Mirrors every event received from the transport, independent of the
//! named-listener bookkeeping. Consumers such as the message collector
//! subscribe here to observe raw traffic.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::warn;

/// An event as received from the host
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InboundEvent {
    pub name: String,
    pub payload: Value,
    pub received_at: DateTime<Utc>,
}

/// Process-local publish/subscribe channel for inbound events
#[derive(Debug, Clone)]
pub struct LocalBus {
    tx: broadcast::Sender<InboundEvent>,
}

impl LocalBus {
    /// Create a bus with the given broadcast channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event, returning how many subscribers saw it.
    pub fn publish(&self, name: &str, payload: Value) -> usize {
        let event = InboundEvent {
            name: name.to_string(),
            payload,
            received_at: Utc::now(),
        };
        // Zero subscribers is not an error
        self.tx.send(event).unwrap_or(0)
    }

    /// Subscribe to every event from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<InboundEvent> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Run `callback` for every event whose name matches `pattern`.
    ///
    /// Patterns are dot-separated; `*` matches one segment and `**` matches
    /// any number of segments (including none). Dropping or cancelling the
    /// returned [`BusSubscription`] stops delivery.
    pub fn on<F, Fut>(&self, pattern: &str, callback: F) -> BusSubscription
    where
        F: Fn(InboundEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut rx = self.subscribe();
        let pattern = pattern.to_string();
        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if matches_pattern(&pattern, &event.name) {
                            callback(event).await;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(pattern = %pattern, skipped, "Bus subscriber lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        BusSubscription { task }
    }
}

/// Handle to a callback registered with [`LocalBus::on`]
#[derive(Debug)]
pub struct BusSubscription {
    task: JoinHandle<()>,
}

impl BusSubscription {
    pub fn cancel(&self) {
        self.task.abort();
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for BusSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Match an event name against a dot-separated wildcard pattern.
pub fn matches_pattern(pattern: &str, name: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let name: Vec<&str> = name.split('.').collect();
    matches_segments(&pattern, &name)
}

fn matches_segments(pattern: &[&str], name: &[&str]) -> bool {
    match pattern.split_first() {
        None => name.is_empty(),
        Some((&"**", rest)) => (0..=name.len()).any(|skip| matches_segments(rest, &name[skip..])),
        Some((&head, rest)) => match name.split_first() {
            Some((&segment, name_rest)) => {
                (head == "*" || head == segment) && matches_segments(rest, name_rest)
            }
            None => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;

    #[test]
    fn exact_pattern_matches_only_same_name() {
        assert!(matches_pattern("onMessage", "onMessage"));
        assert!(!matches_pattern("onMessage", "onAnyMessage"));
        assert!(!matches_pattern("onMessage", "onMessage.s1"));
    }

    #[test]
    fn single_wildcard_matches_one_segment() {
        assert!(matches_pattern("onMessage.*", "onMessage.s1"));
        assert!(!matches_pattern("onMessage.*", "onMessage"));
        assert!(!matches_pattern("onMessage.*", "onMessage.s1.extra"));
    }

    #[test]
    fn double_wildcard_matches_any_depth() {
        assert!(matches_pattern("onMessage.**", "onMessage"));
        assert!(matches_pattern("onMessage.**", "onMessage.s1"));
        assert!(matches_pattern("**", "anything.at.all"));
        assert!(!matches_pattern("onMessage.**", "onAck.s1"));
    }

    #[tokio::test]
    async fn publish_without_subscribers_returns_zero() {
        let bus = LocalBus::new(8);
        assert_eq!(bus.publish("onMessage", json!({})), 0);
    }

    #[tokio::test]
    async fn subscribe_receives_published_events() {
        let bus = LocalBus::new(8);
        let mut rx = bus.subscribe();

        assert_eq!(bus.publish("onMessage", json!({"body": "hi"})), 1);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.name, "onMessage");
        assert_eq!(event.payload, json!({"body": "hi"}));
    }

    #[tokio::test]
    async fn on_filters_by_pattern_and_stops_when_cancelled() {
        let bus = LocalBus::new(8);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let subscription = bus.on("onMessage.*", move |event| {
            let tx = tx.clone();
            async move {
                tx.send(event.name).unwrap();
            }
        });

        bus.publish("onMessage.s1", json!({}));
        bus.publish("onAck.s1", json!({}));
        assert_eq!(rx.recv().await.unwrap(), "onMessage.s1");

        subscription.cancel();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!subscription.is_active());

        bus.publish("onMessage.s2", json!({}));
        assert!(
            tokio::time::timeout(Duration::from_millis(50), rx.recv())
                .await
                .map_or(true, |msg| msg.is_none())
        );
    }
}
