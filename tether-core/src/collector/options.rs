//! Collector termination parameters

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Event the collector listens for unless told otherwise
pub const DEFAULT_MESSAGE_EVENT: &str = "onMessage";

/// Why a collector stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndReason {
    /// `max` messages were collected
    CountLimit,
    /// `max_processed` candidates were seen
    ProcessedLimit,
    /// The total time budget elapsed
    TimeLimit,
    /// No message was collected within the idle budget
    IdleLimit,
    /// `stop` was called
    ExternalStop,
    /// The bus went away
    BusClosed,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CountLimit => "count-limit",
            Self::ProcessedLimit => "processed-limit",
            Self::TimeLimit => "time-limit",
            Self::IdleLimit => "idle-limit",
            Self::ExternalStop => "external-stop",
            Self::BusClosed => "bus-closed",
        }
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EndReason {
    type Err = String;

    /// Accepts the kebab-case names plus the short forms `limit`,
    /// `processed`, `time`, `idle`, `stop` and `closed`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "count-limit" | "limit" => Ok(Self::CountLimit),
            "processed-limit" | "processed" => Ok(Self::ProcessedLimit),
            "time-limit" | "time" => Ok(Self::TimeLimit),
            "idle-limit" | "idle" => Ok(Self::IdleLimit),
            "external-stop" | "stop" => Ok(Self::ExternalStop),
            "bus-closed" | "closed" => Ok(Self::BusClosed),
            _ => Err(format!("unknown end reason: {}", s)),
        }
    }
}

/// Termination parameters for a collector window.
///
/// Every limit is optional; a collector with no limits runs until stopped.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectorOptions {
    /// Bus event carrying messages. Session-scoped forms such as
    /// `onMessage.<session>` match as well.
    pub event: String,
    /// Stop after this many messages were collected
    pub max: Option<usize>,
    /// Stop after this many candidates from the bound chat were seen,
    /// collected or not
    pub max_processed: Option<usize>,
    /// Total time budget
    pub time: Option<Duration>,
    /// Maximum gap between collected messages
    pub idle: Option<Duration>,
    /// Check the time budgets on this interval instead of exact timers
    pub sweep_interval: Option<Duration>,
}

impl Default for CollectorOptions {
    fn default() -> Self {
        Self {
            event: DEFAULT_MESSAGE_EVENT.to_string(),
            max: None,
            max_processed: None,
            time: None,
            idle: None,
            sweep_interval: None,
        }
    }
}

impl CollectorOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn event(mut self, event: impl Into<String>) -> Self {
        self.event = event.into();
        self
    }

    #[must_use]
    pub fn max(mut self, max: usize) -> Self {
        self.max = Some(max);
        self
    }

    #[must_use]
    pub fn max_processed(mut self, max_processed: usize) -> Self {
        self.max_processed = Some(max_processed);
        self
    }

    #[must_use]
    pub fn time(mut self, time: Duration) -> Self {
        self.time = Some(time);
        self
    }

    #[must_use]
    pub fn idle(mut self, idle: Duration) -> Self {
        self.idle = Some(idle);
        self
    }

    #[must_use]
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    /// Bus pattern matching the configured event and its scoped forms.
    pub fn event_pattern(&self) -> String {
        format!("{}.**", self.event)
    }
}

/// Options for [`SocketClient::await_messages`](crate::SocketClient::await_messages)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AwaitMessagesOptions {
    pub collector: CollectorOptions,
    /// End reasons that turn the result into an error
    pub errors: Vec<EndReason>,
}

impl AwaitMessagesOptions {
    pub fn new(collector: CollectorOptions) -> Self {
        Self {
            collector,
            errors: Vec::new(),
        }
    }

    /// Treat `reason` as a failure.
    #[must_use]
    pub fn error_on(mut self, reason: EndReason) -> Self {
        if !self.errors.contains(&reason) {
            self.errors.push(reason);
        }
        self
    }

    pub fn is_error(&self, reason: EndReason) -> bool {
        self.errors.contains(&reason)
    }
}
