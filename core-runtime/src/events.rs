//! # Event Bus System
//!
//! Provides an event-driven architecture for the offline core using
//! `tokio::sync::broadcast`. Components publish typed events; hosts and other
//! components subscribe without coupling to the publisher.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: Strongly-typed enum hierarchies for each domain
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Wrapper for consuming events with filtering
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐  emit   ┌───────────┐
//! │ ConnectivityMonitor  ├────────>│           │
//! └──────────────────────┘         │           │  subscribe  ┌────────────┐
//! ┌──────────────────────┐  emit   │ EventBus  ├────────────>│ Subscriber │
//! │ SyncQueue            ├────────>│ (broadcast│             └────────────┘
//! └──────────────────────┘         │  channel) │  subscribe  ┌────────────┐
//! ┌──────────────────────┐  emit   │           ├────────────>│ Subscriber │
//! │ MediaCache           ├────────>│           │             └────────────┘
//! └──────────────────────┘         └───────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut subscriber = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Sync(SyncEvent::DrainStarted { pending: 3 }))
//!     .ok();
//!
//! let event = subscriber.recv().await.unwrap();
//! assert_eq!(event.description(), "Sync queue drain started");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events. Non-fatal.
//! - **`RecvError::Closed`**: all senders dropped, which means shutdown.
//!
//! Publishing with no subscribers returns an error; publishers in the core
//! ignore it.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Subscribers that can't keep up will receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Online/offline transitions
    Connectivity(ConnectivityEvent),
    /// Sync queue activity
    Sync(SyncEvent),
    /// Media cache and download activity
    Media(MediaEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Connectivity(e) => e.description(),
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Media(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Media(MediaEvent::DownloadFailed { .. }) => EventSeverity::Error,
            CoreEvent::Connectivity(ConnectivityEvent::Degraded { .. }) => EventSeverity::Warning,
            CoreEvent::Sync(SyncEvent::DrainCompleted { failed, .. }) if *failed > 0 => {
                EventSeverity::Warning
            }
            CoreEvent::Connectivity(_) => EventSeverity::Info,
            CoreEvent::Sync(SyncEvent::DrainCompleted { .. }) => EventSeverity::Info,
            CoreEvent::Media(MediaEvent::DownloadCompleted { .. })
            | CoreEvent::Media(MediaEvent::AssetEvicted { .. })
            | CoreEvent::Media(MediaEvent::WatchCompleted { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

// ============================================================================
// Connectivity Events
// ============================================================================

/// Events emitted by the connectivity monitor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ConnectivityEvent {
    /// Transitioned from offline to online.
    Online,
    /// Transitioned from online to offline.
    Offline,
    /// The platform signal is unavailable; the monitor assumes online and
    /// falls back to periodic probing.
    Degraded {
        /// Why the platform signal could not be used.
        reason: String,
    },
}

impl ConnectivityEvent {
    fn description(&self) -> &str {
        match self {
            ConnectivityEvent::Online => "Network became available",
            ConnectivityEvent::Offline => "Network became unavailable",
            ConnectivityEvent::Degraded { .. } => "Connectivity signal unavailable",
        }
    }
}

// ============================================================================
// Sync Events
// ============================================================================

/// Events related to the outbound sync queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// An operation was appended to the queue.
    Enqueued {
        /// Idempotency identifier of the operation.
        operation_id: String,
        /// Key the operation writes.
        key: String,
        /// Queue length after the enqueue.
        pending: usize,
    },
    /// A drain pass started.
    DrainStarted {
        /// Operations queued when the pass began.
        pending: usize,
    },
    /// A drain pass finished.
    DrainCompleted {
        /// Operations confirmed by the remote and removed.
        replayed: usize,
        /// Operations that failed and stay queued.
        failed: usize,
        /// Queue length after the pass.
        pending: usize,
    },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::Enqueued { .. } => "Operation queued for sync",
            SyncEvent::DrainStarted { .. } => "Sync queue drain started",
            SyncEvent::DrainCompleted { .. } => "Sync queue drain completed",
        }
    }
}

// ============================================================================
// Media Events
// ============================================================================

/// Events related to downloaded media assets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum MediaEvent {
    /// A download was accepted and space reserved.
    DownloadStarted {
        asset_id: String,
        /// Advertised size in bytes.
        size_bytes: u64,
    },
    /// Incremental progress during a download.
    DownloadProgress {
        asset_id: String,
        bytes_downloaded: u64,
        total_bytes: Option<u64>,
        /// Progress percentage (0-100).
        percent: u8,
    },
    /// The asset is Ready and available offline.
    DownloadCompleted {
        asset_id: String,
        /// Actual size on disk in bytes.
        size_bytes: u64,
    },
    /// The download failed or was cancelled; nothing was kept.
    DownloadFailed {
        asset_id: String,
        /// Human-readable error message.
        message: String,
        /// Whether a later attempt could succeed.
        retryable: bool,
    },
    /// The asset was evicted to make room.
    AssetEvicted {
        asset_id: String,
        /// Bytes released.
        size_bytes: u64,
    },
    /// The asset was deleted on request.
    AssetDeleted { asset_id: String },
    /// Watch progress crossed the completion threshold for the first time.
    WatchCompleted { asset_id: String },
}

impl MediaEvent {
    fn description(&self) -> &str {
        match self {
            MediaEvent::DownloadStarted { .. } => "Download started",
            MediaEvent::DownloadProgress { .. } => "Download progress",
            MediaEvent::DownloadCompleted { .. } => "Download completed",
            MediaEvent::DownloadFailed { .. } => "Download failed",
            MediaEvent::AssetEvicted { .. } => "Asset evicted",
            MediaEvent::AssetDeleted { .. } => "Asset deleted",
            MediaEvent::WatchCompleted { .. } => "Asset watched to completion",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to core events.
///
/// Cloning is cheap; all clones share one broadcast channel.
///
/// # Example
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, MediaEvent};
///
/// # #[tokio::main]
/// # async fn main() {
/// let event_bus = EventBus::new(100);
/// let mut sub1 = event_bus.subscribe();
/// let mut sub2 = event_bus.subscribe();
///
/// let event = CoreEvent::Media(MediaEvent::AssetDeleted {
///     asset_id: "lesson-1".to_string(),
/// });
/// event_bus.emit(event).ok();
/// # }
/// ```
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// When a subscriber falls behind by more than `capacity` events it
    /// receives `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new event bus with the default buffer size.
    #[allow(clippy::should_implement_trait)]
    pub fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber to receive future events.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

/// Type alias for event filter functions.
type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with filtering.
///
/// # Example
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let media_only = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Media(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    /// Creates a new event stream from a receiver.
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Adds a filter function to this stream.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn matches(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive a matching event without blocking.
    ///
    /// Returns `None` if no matching events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.matches(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
