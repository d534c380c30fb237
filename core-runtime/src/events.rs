//! # Event Bus System
//!
//! Provides an event-driven architecture for the podcast core using `tokio::sync::broadcast`.
//! This module enables decoupled communication between core modules through typed events.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: Strongly-typed enum hierarchies for catalog, library and playback
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Wrapper for consuming events with filtering
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐    emit     ┌───────────┐
//! │ Session host ├────────────>│           │    subscribe    ┌──────────────────┐
//! └──────────────┘             │ EventBus  ├────────────────>│ ProgressRecorder │
//!                              │ (broadcast│                 └──────────────────┘
//! ┌──────────────┐    emit     │  channel) │    subscribe    ┌──────────────────┐
//! │  Repository  ├────────────>│           ├────────────────>│    UI / host     │
//! └──────────────┘             └───────────┘                 └──────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Playback(PlaybackEvent::Started {
//!         episode_id: "e1".to_string(),
//!         title: "Pilot".to_string(),
//!     }))
//!     .ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert_eq!(event.description(), "Playback started");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n` events.
//!   This is non-fatal; the subscriber can continue receiving new events.
//! - **`RecvError::Closed`**: All senders have been dropped. This indicates shutdown.
//!
//! Subscribers should handle `Lagged` gracefully and treat `Closed` as a signal to exit.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Remote catalog requests
    Catalog(CatalogEvent),
    /// Local store changes
    Library(LibraryEvent),
    /// Playback session transitions
    Playback(PlaybackEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Catalog(e) => e.description(),
            CoreEvent::Library(e) => e.description(),
            CoreEvent::Playback(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Catalog(CatalogEvent::FetchFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Playback(PlaybackEvent::Error { .. }) => EventSeverity::Error,
            CoreEvent::Playback(PlaybackEvent::Started { .. })
            | CoreEvent::Playback(PlaybackEvent::Completed { .. })
            | CoreEvent::Library(LibraryEvent::SubscriptionChanged { .. }) => EventSeverity::Info,
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

// ============================================================================
// Catalog Events
// ============================================================================

/// Events raised around remote catalog requests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum CatalogEvent {
    /// A remote resource was fetched and stored.
    FetchCompleted {
        /// Resource kind, e.g. `podcast`, `best_podcasts`, `genres`.
        resource: String,
        /// Number of records received.
        items: usize,
    },
    /// A remote request failed. Cached data, if any, is still served.
    FetchFailed { resource: String, message: String },
}

impl CatalogEvent {
    pub fn description(&self) -> &str {
        match self {
            CatalogEvent::FetchCompleted { .. } => "Catalog fetch completed",
            CatalogEvent::FetchFailed { .. } => "Catalog fetch failed",
        }
    }
}

// ============================================================================
// Library Events
// ============================================================================

/// Events related to the local podcast store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum LibraryEvent {
    /// User subscribed to or unsubscribed from a podcast.
    SubscriptionChanged { podcast_id: String, subscribed: bool },
    /// The best-podcasts list of a genre was replaced.
    BestPodcastsRefreshed { genre_id: i64, count: usize },
    /// Episodes of a podcast were inserted or updated.
    EpisodesUpdated { podcast_id: String, count: usize },
    /// Listening progress of an episode was persisted.
    ProgressSaved {
        episode_id: String,
        position_ms: u64,
        completed: bool,
    },
}

impl LibraryEvent {
    pub fn description(&self) -> &str {
        match self {
            LibraryEvent::SubscriptionChanged { .. } => "Subscription changed",
            LibraryEvent::BestPodcastsRefreshed { .. } => "Best podcasts refreshed",
            LibraryEvent::EpisodesUpdated { .. } => "Episodes updated",
            LibraryEvent::ProgressSaved { .. } => "Episode progress saved",
        }
    }
}

// ============================================================================
// Playback Events
// ============================================================================

/// Events related to the playback session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum PlaybackEvent {
    /// An episode was loaded and started playing for the first time.
    Started { episode_id: String, title: String },
    /// Playback paused.
    Paused {
        episode_id: String,
        position_ms: u64,
        duration_ms: u64,
    },
    /// Playback resumed after pause.
    Resumed { episode_id: String, position_ms: u64 },
    /// Position jumped because of a seek.
    Seeked { episode_id: String, position_ms: u64 },
    /// The episode was replaced or unloaded before it finished.
    Stopped {
        episode_id: String,
        position_ms: u64,
        duration_ms: u64,
    },
    /// Episode finished playing naturally.
    Completed { episode_id: String },
    /// Engine failure.
    Error {
        episode_id: Option<String>,
        /// Engine-specific error code, when known.
        code: Option<i32>,
        message: String,
    },
}

impl PlaybackEvent {
    pub fn description(&self) -> &str {
        match self {
            PlaybackEvent::Started { .. } => "Playback started",
            PlaybackEvent::Paused { .. } => "Playback paused",
            PlaybackEvent::Resumed { .. } => "Playback resumed",
            PlaybackEvent::Seeked { .. } => "Playback position changed",
            PlaybackEvent::Stopped { .. } => "Playback stopped",
            PlaybackEvent::Completed { .. } => "Episode completed",
            PlaybackEvent::Error { .. } => "Playback error",
        }
    }

    /// Episode the event refers to, if any.
    pub fn episode_id(&self) -> Option<&str> {
        match self {
            PlaybackEvent::Started { episode_id, .. }
            | PlaybackEvent::Paused { episode_id, .. }
            | PlaybackEvent::Resumed { episode_id, .. }
            | PlaybackEvent::Seeked { episode_id, .. }
            | PlaybackEvent::Stopped { episode_id, .. }
            | PlaybackEvent::Completed { episode_id } => Some(episode_id),
            PlaybackEvent::Error { episode_id, .. } => episode_id.as_deref(),
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Uses `tokio::sync::broadcast` internally, which provides:
/// - Multiple producers (clone the `EventBus`)
/// - Multiple consumers (each `subscribe()` creates a new receiver)
/// - Non-blocking sends (events are cloned for each subscriber)
/// - Lagging detection (slow subscribers get `RecvError::Lagged`)
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
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

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let playback_only = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Playback(_)));
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

    /// Only events matching `predicate` are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no matching events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
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

#[cfg(test)]
mod tests {
    use super::*;

    fn started(id: &str) -> CoreEvent {
        CoreEvent::Playback(PlaybackEvent::Started {
            episode_id: id.to_string(),
            title: format!("Episode {}", id),
        })
    }

    #[tokio::test]
    async fn test_event_bus_subscription() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
        let _sub1 = bus.subscribe();
        let _sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(started("e1")).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = CoreEvent::Library(LibraryEvent::SubscriptionChanged {
            podcast_id: "p1".to_string(),
            subscribed: true,
        });
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Playback(_)));

        bus.emit(CoreEvent::Catalog(CatalogEvent::FetchCompleted {
            resource: "genres".to_string(),
            items: 12,
        }))
        .ok();
        bus.emit(started("e2")).ok();

        assert_eq!(stream.recv().await.unwrap(), started("e2"));
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.emit(started(&i.to_string())).ok();
        }

        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_event_severity() {
        let error_event = CoreEvent::Playback(PlaybackEvent::Error {
            episode_id: Some("e1".to_string()),
            code: Some(-1004),
            message: "unreadable stream".to_string(),
        });
        assert_eq!(error_event.severity(), EventSeverity::Error);

        let failed_fetch = CoreEvent::Catalog(CatalogEvent::FetchFailed {
            resource: "podcast".to_string(),
            message: "timeout".to_string(),
        });
        assert_eq!(failed_fetch.severity(), EventSeverity::Warning);

        let seek = CoreEvent::Playback(PlaybackEvent::Seeked {
            episode_id: "e1".to_string(),
            position_ms: 5_000,
        });
        assert_eq!(seek.severity(), EventSeverity::Debug);
        assert_eq!(started("e1").severity(), EventSeverity::Info);
    }

    #[test]
    fn test_event_descriptions() {
        let paused = PlaybackEvent::Paused {
            episode_id: "e1".to_string(),
            position_ms: 1_000,
            duration_ms: 2_000,
        };
        assert_eq!(paused.description(), "Playback paused");
        assert_eq!(CoreEvent::Playback(paused).description(), "Playback paused");

        let saved = CoreEvent::Library(LibraryEvent::ProgressSaved {
            episode_id: "e1".to_string(),
            position_ms: 1_000,
            completed: false,
        });
        assert_eq!(saved.description(), "Episode progress saved");

        let fetched = CatalogEvent::FetchCompleted {
            resource: "genres".to_string(),
            items: 3,
        };
        assert_eq!(fetched.description(), "Catalog fetch completed");
    }

    #[test]
    fn test_playback_event_episode_id() {
        let completed = PlaybackEvent::Completed {
            episode_id: "e9".to_string(),
        };
        assert_eq!(completed.episode_id(), Some("e9"));

        let error = PlaybackEvent::Error {
            episode_id: None,
            code: None,
            message: "boom".to_string(),
        };
        assert_eq!(error.episode_id(), None);
    }

    #[test]
    fn test_event_serialization() {
        let event = CoreEvent::Playback(PlaybackEvent::Paused {
            episode_id: "e1".to_string(),
            position_ms: 42_000,
            duration_ms: 600_000,
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"Playback\""));
        assert!(json.contains("\"event\":\"Paused\""));

        let deserialized: CoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, event);
    }

    #[tokio::test]
    async fn test_concurrent_publishers() {
        let bus = EventBus::new(100);
        let mut sub = bus.subscribe();

        let handles: Vec<_> = (0..2)
            .map(|n| {
                let bus = bus.clone();
                tokio::spawn(async move {
                    for i in 0..10 {
                        bus.emit(started(&format!("{}-{}", n, i))).ok();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let mut count = 0;
        while sub.try_recv().is_ok() {
            count += 1;
        }
        assert_eq!(count, 20);
    }
}
