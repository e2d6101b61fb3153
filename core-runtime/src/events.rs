//! # Event Bus System
//!
//! Decoupled notifications about the cache lifecycle, carried over
//! `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! The published cache state answers "what is the state of each resource
//! now". The event bus answers "what just happened": a reconciliation pass
//! finished, a transfer was enqueued, a cleanup removal failed, an observer
//! gave up. Hosts use it for diagnostics and toasts; nothing in the core
//! depends on anyone listening.
//!
//! ```text
//! ┌──────────────────┐   emit   ┌───────────┐  subscribe  ┌────────────┐
//! │ SyncEngine       ├─────────>│ EventBus  ├────────────>│ Subscriber │
//! └──────────────────┘          │ (broadcast│             └────────────┘
//! ┌──────────────────┐   emit   │  channel) │  subscribe  ┌────────────┐
//! │ Task group       ├─────────>│           ├────────────>│ Subscriber │
//! └──────────────────┘          └───────────┘             └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CacheEvent, CoreEvent, EventBus};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Cache(CacheEvent::SynchronizationStarted))
//!     .ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert_eq!(event.description(), "Synchronization started");
//! # }
//! ```
//!
//! Emitting with no subscribers returns an error; callers discard it with
//! `.ok()`.

use std::fmt;

use core_async::sync::broadcast::{
    self,
    error::{RecvError, SendError},
};
use serde::{Deserialize, Serialize};

pub use core_async::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Subscribers that fall further behind receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

/// Top-level event enum published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Cache reconciliation and resource lifecycle events
    Cache(CacheEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Cache(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Cache(CacheEvent::SynchronizationFailed { .. })
            | CoreEvent::Cache(CacheEvent::ObserverFailed { .. }) => EventSeverity::Error,
            CoreEvent::Cache(CacheEvent::RecordRemovalFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Cache(CacheEvent::SynchronizationCompleted { .. })
            | CoreEvent::Cache(CacheEvent::DownloadEnqueued { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

/// Why a download-subsystem record was removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalCause {
    /// The record's locator matched no declared resource.
    Orphan,
    /// The record reported a failure that has now been surfaced.
    ConsumedFailure,
    /// The resource was deleted by the user.
    Deleted,
}

impl fmt::Display for RemovalCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RemovalCause::Orphan => "orphan",
            RemovalCause::ConsumedFailure => "consumed_failure",
            RemovalCause::Deleted => "deleted",
        };
        f.write_str(label)
    }
}

/// Events raised while reconciling and maintaining the download cache.
///
/// Locators carried here are already redacted for logging.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum CacheEvent {
    /// A reconciliation pass began.
    SynchronizationStarted,
    /// A reconciliation pass published a full snapshot.
    SynchronizationCompleted {
        /// Number of declared resources in the snapshot.
        resources: usize,
        /// Orphan records removed during the pass.
        orphans_removed: usize,
        /// Resources found in flight, each now observed.
        downloading: usize,
    },
    /// Fetching metadata or the initial reconciliation failed.
    SynchronizationFailed { message: String },
    /// A transfer was handed to the download subsystem.
    DownloadEnqueued { locator: String, record_id: u64 },
    /// The published state of one resource changed.
    StateChanged { locator: String, state: String },
    /// A cleanup removal succeeded.
    RecordRemoved { record_id: u64, cause: RemovalCause },
    /// A cleanup removal failed; the record will be retried as an orphan.
    RecordRemovalFailed {
        record_id: u64,
        cause: RemovalCause,
        message: String,
    },
    /// A supervised background task ended with an error.
    ObserverFailed { task: String, message: String },
}

impl CacheEvent {
    fn description(&self) -> &str {
        match self {
            CacheEvent::SynchronizationStarted => "Synchronization started",
            CacheEvent::SynchronizationCompleted { .. } => "Synchronization completed",
            CacheEvent::SynchronizationFailed { .. } => "Synchronization failed",
            CacheEvent::DownloadEnqueued { .. } => "Download enqueued",
            CacheEvent::StateChanged { .. } => "Cache state changed",
            CacheEvent::RecordRemoved { .. } => "Download record removed",
            CacheEvent::RecordRemovalFailed { .. } => "Download record removal failed",
            CacheEvent::ObserverFailed { .. } => "Background task failed",
        }
    }
}

/// Central event bus for publishing and subscribing to events.
///
/// Cloning the bus shares the underlying channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified per-subscriber buffer.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new receiver for all future events. Past events are not
    /// replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
///
/// ```rust
/// use core_runtime::events::{EventBus, EventSeverity, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let errors = EventStream::new(event_bus.subscribe())
///     .filter(|event| event.severity() >= EventSeverity::Warning);
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned from `recv`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if the bus has been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive a matching event without waiting.
    ///
    /// Returns `None` if no matching events are currently buffered.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.matches(&event) => return Some(Ok(event)),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }

    fn matches(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }
}
