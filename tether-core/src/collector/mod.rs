//! Windowed message collection
//!
//! A [`MessageCollector`] watches the local bus for messages in one chat and
//! accumulates them until a limit is reached: a message count, a number of
//! candidates seen, a total time budget or an idle gap. It can also be
//! stopped explicitly. Whatever was collected is handed back together with
//! the [`EndReason`].

mod collection;
mod options;
mod target;

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use collection::Collection;
pub use options::{AwaitMessagesOptions, CollectorOptions, DEFAULT_MESSAGE_EVENT, EndReason};
pub use target::{ChatTarget, CollectedMessage, CollectorScope};

use crate::error::CollectorError;
use crate::events::{InboundEvent, LocalBus, matches_pattern};

/// Predicate deciding whether an in-scope message is collected
pub type CollectorFilter = Arc<dyn Fn(&CollectedMessage) -> bool + Send + Sync>;

/// Filter that collects every in-scope message.
pub fn accept_all() -> CollectorFilter {
    Arc::new(|_: &CollectedMessage| true)
}

/// Final state of a collector
#[derive(Debug, Clone, PartialEq)]
pub struct CollectorEnd {
    pub collection: Collection,
    pub reason: EndReason,
}

/// Accumulates messages for one chat until a limit is hit
#[derive(Debug)]
pub struct MessageCollector {
    scope: CollectorScope,
    stop: CancellationToken,
    collected: mpsc::UnboundedReceiver<CollectedMessage>,
    result: Option<oneshot::Receiver<CollectorEnd>>,
    task: JoinHandle<()>,
}

impl MessageCollector {
    /// Start collecting from `bus`.
    ///
    /// The bus subscription is taken before this returns, so no message
    /// published afterwards is missed.
    pub fn new(
        bus: &LocalBus,
        scope: CollectorScope,
        filter: CollectorFilter,
        options: CollectorOptions,
    ) -> Self {
        let events = bus.subscribe();
        let stop = CancellationToken::new();
        let (collected_tx, collected) = mpsc::unbounded_channel();
        let (result_tx, result) = oneshot::channel();

        debug!(
            chat = %scope.chat_id.as_str(),
            event = %options.event,
            "Starting message collector"
        );

        let window = Window {
            scope: scope.clone(),
            filter,
            options,
            collection: Collection::new(),
            processed: 0,
            started: Instant::now(),
            last_collected: Instant::now(),
            collected_tx,
        };
        let task = tokio::spawn(window.run(events, stop.clone(), result_tx));

        Self {
            scope,
            stop,
            collected,
            result: Some(result),
            task,
        }
    }

    pub fn scope(&self) -> &CollectorScope {
        &self.scope
    }

    /// End the window with [`EndReason::ExternalStop`].
    pub fn stop(&self) {
        self.stop.cancel();
    }

    pub fn is_ended(&self) -> bool {
        self.task.is_finished()
    }

    /// Next message collected, in arrival order. Returns `None` once the
    /// collector has ended and every collected message was yielded.
    pub async fn next(&mut self) -> Option<CollectedMessage> {
        self.collected.recv().await
    }

    /// Wait for the collector to end.
    ///
    /// Only the first call yields the result; later calls fail with
    /// [`CollectorError::Aborted`].
    pub async fn ended(&mut self) -> Result<CollectorEnd, CollectorError> {
        let result = self.result.take().ok_or(CollectorError::Aborted)?;
        result.await.map_err(|_| CollectorError::Aborted)
    }
}

impl Drop for MessageCollector {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

struct Window {
    scope: CollectorScope,
    filter: CollectorFilter,
    options: CollectorOptions,
    collection: Collection,
    processed: usize,
    started: Instant,
    last_collected: Instant,
    collected_tx: mpsc::UnboundedSender<CollectedMessage>,
}

impl Window {
    async fn run(
        mut self,
        mut events: broadcast::Receiver<InboundEvent>,
        stop: CancellationToken,
        result_tx: oneshot::Sender<CollectorEnd>,
    ) {
        let mut sweep = self.options.sweep_interval.map(sweep_timer);

        let reason = loop {
            let deadline = self.next_deadline();
            let wake = async {
                match (sweep.as_mut(), deadline) {
                    (Some(interval), _) => {
                        interval.tick().await;
                    }
                    (None, Some(at)) => tokio::time::sleep_until(at).await,
                    (None, None) => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                biased;
                _ = stop.cancelled() => break EndReason::ExternalStop,
                _ = wake => {
                    if let Some(reason) = self.expired(Instant::now()) {
                        break reason;
                    }
                }
                received = events.recv() => match received {
                    Ok(event) => {
                        if let Some(reason) = self.handle(&event) {
                            break reason;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Message collector lagged behind the bus");
                    }
                    Err(RecvError::Closed) => break EndReason::BusClosed,
                },
            }
        };

        info!(
            chat = %self.scope.chat_id.as_str(),
            reason = %reason,
            collected = self.collection.len(),
            processed = self.processed,
            "Message collector ended"
        );
        let _ = result_tx.send(CollectorEnd {
            collection: self.collection,
            reason,
        });
    }

    /// Process one bus event; returns the end reason when a count limit hit.
    ///
    /// Only candidates from the bound chat count as processed, whether or not
    /// the filter keeps them.
    fn handle(&mut self, event: &InboundEvent) -> Option<EndReason> {
        if !matches_pattern(&self.options.event_pattern(), &event.name) {
            return None;
        }
        let message = CollectedMessage::from_event(event)?;
        if !self.scope.admits(&message) {
            return None;
        }
        self.processed += 1;

        if (self.filter)(&message) {
            debug!(id = %message.id, "Collected message");
            self.collection.insert(message.clone());
            self.last_collected = Instant::now();
            let _ = self.collected_tx.send(message);

            if self.options.max.is_some_and(|max| self.collection.len() >= max) {
                return Some(EndReason::CountLimit);
            }
        }

        if self
            .options
            .max_processed
            .is_some_and(|max| self.processed >= max)
        {
            return Some(EndReason::ProcessedLimit);
        }
        None
    }

    fn next_deadline(&self) -> Option<Instant> {
        let total = self.options.time.map(|time| self.started + time);
        let idle = self.options.idle.map(|idle| self.last_collected + idle);
        match (total, idle) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn expired(&self, now: Instant) -> Option<EndReason> {
        if self.options.time.is_some_and(|time| now >= self.started + time) {
            return Some(EndReason::TimeLimit);
        }
        if self
            .options
            .idle
            .is_some_and(|idle| now >= self.last_collected + idle)
        {
            return Some(EndReason::IdleLimit);
        }
        None
    }
}

fn sweep_timer(period: std::time::Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;

    fn scope() -> CollectorScope {
        CollectorScope {
            session_id: "s1".to_string(),
            instance_id: "i1".to_string(),
            chat_id: ChatTarget::from("C1"),
        }
    }

    fn message(id: &str, chat: &str) -> serde_json::Value {
        json!({"id": id, "chatId": chat, "body": format!("body of {}", id)})
    }

    #[tokio::test(start_paused = true)]
    async fn ends_on_count_limit() {
        let bus = LocalBus::new(16);
        let mut collector =
            MessageCollector::new(&bus, scope(), accept_all(), CollectorOptions::new().max(2));

        bus.publish("onMessage", message("m1", "C1"));
        bus.publish("onMessage", message("x1", "C2"));
        bus.publish("onMessage", message("m2", "C1"));

        let end = collector.ended().await.unwrap();
        assert_eq!(end.reason, EndReason::CountLimit);
        assert_eq!(end.collection.ids().collect::<Vec<_>>(), vec!["m1", "m2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn processed_limit_counts_filtered_candidates_from_bound_chat_only() {
        let bus = LocalBus::new(16);
        let skip_r1: CollectorFilter = Arc::new(|message: &CollectedMessage| message.id != "r1");
        let mut collector = MessageCollector::new(
            &bus,
            scope(),
            skip_r1,
            CollectorOptions::new().max_processed(2),
        );

        bus.publish("onMessage", message("x1", "C2"));
        bus.publish("onMessage", message("x2", "C2"));
        bus.publish("onAck", message("ignored", "C1"));
        bus.publish("onMessage", message("r1", "C1"));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!collector.is_ended());

        bus.publish("onMessage", message("m1", "C1"));

        let end = collector.ended().await.unwrap();
        assert_eq!(end.reason, EndReason::ProcessedLimit);
        assert_eq!(end.collection.ids().collect::<Vec<_>>(), vec!["m1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_timer_resets_on_collected_message() {
        let bus = LocalBus::new(16);
        let mut collector = MessageCollector::new(
            &bus,
            scope(),
            accept_all(),
            CollectorOptions::new().idle(Duration::from_secs(5)),
        );

        tokio::time::sleep(Duration::from_secs(4)).await;
        bus.publish("onMessage", message("m1", "C1"));
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(!collector.is_ended());

        let end = collector.ended().await.unwrap();
        assert_eq!(end.reason, EndReason::IdleLimit);
        assert_eq!(end.collection.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn total_time_limit_wins_over_activity() {
        let bus = LocalBus::new(16);
        let mut collector = MessageCollector::new(
            &bus,
            scope(),
            accept_all(),
            CollectorOptions::new()
                .time(Duration::from_secs(3))
                .idle(Duration::from_secs(10)),
        );

        bus.publish("onMessage", message("m1", "C1"));
        let end = collector.ended().await.unwrap();
        assert_eq!(end.reason, EndReason::TimeLimit);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_interval_checks_deadlines_on_ticks() {
        let bus = LocalBus::new(16);
        let started = Instant::now();
        let mut collector = MessageCollector::new(
            &bus,
            scope(),
            accept_all(),
            CollectorOptions::new()
                .time(Duration::from_secs(3))
                .sweep_interval(Duration::from_secs(2)),
        );

        let end = collector.ended().await.unwrap();
        assert_eq!(end.reason, EndReason::TimeLimit);
        // Deadline at 3s is only noticed on the 4s tick
        assert!(started.elapsed() >= Duration::from_secs(4));
    }

    #[tokio::test]
    async fn stop_ends_with_external_stop() {
        let bus = LocalBus::new(16);
        let mut collector =
            MessageCollector::new(&bus, scope(), accept_all(), CollectorOptions::new());

        collector.stop();
        let end = collector.ended().await.unwrap();
        assert_eq!(end.reason, EndReason::ExternalStop);
        assert!(collector.ended().await.is_err());
    }

    #[tokio::test]
    async fn filter_rejects_messages() {
        let bus = LocalBus::new(16);
        let only_m2: CollectorFilter = Arc::new(|message: &CollectedMessage| message.id == "m2");
        let mut collector =
            MessageCollector::new(&bus, scope(), only_m2, CollectorOptions::new().max(1));

        bus.publish("onMessage", message("m1", "C1"));
        bus.publish("onMessage.s1", message("m2", "C1"));

        let first = collector.next().await.unwrap();
        assert_eq!(first.id, "m2");
        let end = collector.ended().await.unwrap();
        assert_eq!(end.reason, EndReason::CountLimit);
        assert_eq!(end.collection.len(), 1);
    }

    #[tokio::test]
    async fn dropping_the_bus_ends_with_bus_closed() {
        let bus = LocalBus::new(16);
        let mut collector =
            MessageCollector::new(&bus, scope(), accept_all(), CollectorOptions::new());
        drop(bus);

        let end = collector.ended().await.unwrap();
        assert_eq!(end.reason, EndReason::BusClosed);
    }
}
