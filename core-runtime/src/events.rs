//! # Event Bus System
//!
//! Session callbacks delivered to the host over `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! Every player session publishes its callbacks (volume, speed, position,
//! playing state, buffering, completion, notification requests, runtime
//! errors) as [`SessionEvent`]s tagged with the session id. The channel layer
//! subscribes once and forwards each event to the Dart side; callbacks are
//! fire-and-forget, so emission never fails a session operation.
//!
//! ```text
//! ┌───────────┐   emit    ┌───────────┐   subscribe   ┌───────────────┐
//! │ Session a ├──────────>│           ├──────────────>│ Channel layer │
//! └───────────┘           │ EventBus  │               └───────────────┘
//! ┌───────────┐   emit    │ (broadcast│   subscribe   ┌───────────────┐
//! │ Session b ├──────────>│  channel) ├──────────────>│  Test / probe │
//! └───────────┘           └───────────┘               └───────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{EventBus, EventStream, PlayerEvent, SessionEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(100);
//! let mut stream = EventStream::new(bus.subscribe()).for_player("a");
//!
//! bus.emit(SessionEvent::new("a", PlayerEvent::PlayingChanged { playing: true })).ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert_eq!(event.event, PlayerEvent::PlayingChanged { playing: true });
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events (position
//!   ticks are the usual culprit). Non-fatal.
//! - **`RecvError::Closed`**: the bus was dropped; treat as shutdown.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// A playing session emits roughly three position events per second.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

// ============================================================================
// Event Types
// ============================================================================

/// Event published by one session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionEvent {
    pub player_id: String,
    #[serde(flatten)]
    pub event: PlayerEvent,
}

impl SessionEvent {
    pub fn new(player_id: impl Into<String>, event: PlayerEvent) -> Self {
        Self {
            player_id: player_id.into(),
            event,
        }
    }
}

/// Category of a runtime error reported after a source became ready.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Connection lost or host unreachable
    Network,
    /// Server answered with an error status
    Unreachable,
    /// Decoder or engine failure
    Player,
}

/// Session callback.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlayerEvent {
    VolumeChanged { volume: f64 },
    PlaySpeedChanged { speed: f64 },
    /// Active scrub speed; 0 when scrubbing stops
    ForwardRewindChanged { speed: f64 },
    PositionChanged { position_ms: u64 },
    ReadyToPlay { duration_ms: u64 },
    PlayingChanged { playing: bool },
    BufferingChanged { buffering: bool },
    Finished,
    Next,
    Prev,
    Stopped,
    NotificationPlayOrPauseRequested,
    NotificationStopRequested,
    NotificationSelected { track_id: Option<String> },
    Error {
        category: ErrorCategory,
        message: String,
    },
}

impl PlayerEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            PlayerEvent::VolumeChanged { .. } => "Volume changed",
            PlayerEvent::PlaySpeedChanged { .. } => "Play speed changed",
            PlayerEvent::ForwardRewindChanged { .. } => "Forward/rewind speed changed",
            PlayerEvent::PositionChanged { .. } => "Position changed",
            PlayerEvent::ReadyToPlay { .. } => "Ready to play",
            PlayerEvent::PlayingChanged { .. } => "Playing state changed",
            PlayerEvent::BufferingChanged { .. } => "Buffering state changed",
            PlayerEvent::Finished => "Playback finished",
            PlayerEvent::Next => "Next requested",
            PlayerEvent::Prev => "Previous requested",
            PlayerEvent::Stopped => "Playback stopped",
            PlayerEvent::NotificationPlayOrPauseRequested => "Play/pause requested from notification",
            PlayerEvent::NotificationStopRequested => "Stop requested from notification",
            PlayerEvent::NotificationSelected { .. } => "Notification selected",
            PlayerEvent::Error { .. } => "Playback error",
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            PlayerEvent::Error { .. } => EventSeverity::Error,
            PlayerEvent::ReadyToPlay { .. }
            | PlayerEvent::Finished
            | PlayerEvent::Stopped => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to session events.
///
/// Cloning the bus shares the underlying channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    /// Creates a new event bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns an error if there are no active subscribers.
    pub fn emit(&self, event: SessionEvent) -> Result<usize, SendError<SessionEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        self.sender.subscribe()
    }

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

/// Type alias for event filter functions.
pub type EventFilter = Box<dyn Fn(&SessionEvent) -> bool + Send + Sync>;

/// Receiver wrapper with an optional filter.
pub struct EventStream {
    receiver: Receiver<SessionEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<SessionEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&SessionEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Only events published by `player_id`.
    pub fn for_player(self, player_id: impl Into<String>) -> Self {
        let player_id = player_id.into();
        self.filter(move |event| event.player_id == player_id)
    }

    fn matches(&self, event: &SessionEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<SessionEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no matching event is currently available.
    pub fn try_recv(&mut self) -> Option<Result<SessionEvent, RecvError>> {
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

    /// Drains every matching event currently buffered.
    pub fn drain(&mut self) -> Vec<PlayerEvent> {
        let mut events = Vec::new();
        while let Some(result) = self.try_recv() {
            match result {
                Ok(event) => events.push(event.event),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
        events
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
