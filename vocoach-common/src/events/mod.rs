//! Event types for the vocoach event system
//!
//! Provides the `PlayerEvent` tagged union and the `EventBus` every player
//! session publishes on.
//!
//! # Delivery
//!
//! The bus is a `tokio::sync::broadcast` channel: each subscriber sees each
//! event at most once, and a subscriber that falls more than `capacity`
//! events behind skips the oldest ones (logged, never fatal). Dropping or
//! calling [`Subscription::unsubscribe`] detaches a listener.

mod player_types;

pub use player_types::{DoneReason, MetricsSnapshot, PlayerErrorKind, PlayerState};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

/// Player event types
///
/// Events are broadcast via `EventBus` and can be serialized for UI layers
/// (JSON lines, websocket, etc.). All events carry the session they belong to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlayerEvent {
    /// Upstream source is being opened
    Connecting {
        session_id: Uuid,
        /// Provider name reported by the adapter
        provider: String,
        timestamp: DateTime<Utc>,
    },

    /// Upstream source opened, chunks may now arrive
    Connected {
        session_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Waiting for the jitter buffer to reach its threshold
    Buffering {
        session_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Playback started (or resumed after pause)
    Playing {
        session_id: Uuid,
        metrics: MetricsSnapshot,
        timestamp: DateTime<Utc>,
    },

    /// Playback paused by the caller
    Paused {
        session_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Session cancelled by the caller
    Stopped {
        session_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Completion signal: emitted at most once per session
    Done {
        session_id: Uuid,
        reason: DoneReason,
        metrics: MetricsSnapshot,
        timestamp: DateTime<Utc>,
    },

    /// Jitter buffer ran dry while playing
    Underrun {
        session_id: Uuid,
        metrics: MetricsSnapshot,
        timestamp: DateTime<Utc>,
    },

    /// Fatal session error
    Error {
        session_id: Uuid,
        kind: PlayerErrorKind,
        message: String,
        /// Diagnostic counters at the moment of failure
        metrics: MetricsSnapshot,
        timestamp: DateTime<Utc>,
    },

    /// Periodic buffer-health snapshot
    Metrics {
        session_id: Uuid,
        metrics: MetricsSnapshot,
        timestamp: DateTime<Utc>,
    },

    /// Player state machine transition
    StateChanged {
        session_id: Uuid,
        old_state: PlayerState,
        new_state: PlayerState,
        timestamp: DateTime<Utc>,
    },
}

impl PlayerEvent {
    /// Session this event belongs to
    pub fn session_id(&self) -> Uuid {
        match self {
            PlayerEvent::Connecting { session_id, .. }
            | PlayerEvent::Connected { session_id, .. }
            | PlayerEvent::Buffering { session_id, .. }
            | PlayerEvent::Playing { session_id, .. }
            | PlayerEvent::Paused { session_id, .. }
            | PlayerEvent::Stopped { session_id, .. }
            | PlayerEvent::Done { session_id, .. }
            | PlayerEvent::Underrun { session_id, .. }
            | PlayerEvent::Error { session_id, .. }
            | PlayerEvent::Metrics { session_id, .. }
            | PlayerEvent::StateChanged { session_id, .. } => *session_id,
        }
    }

    /// Short event name, matching the serialized `type` tag
    pub fn name(&self) -> &'static str {
        match self {
            PlayerEvent::Connecting { .. } => "connecting",
            PlayerEvent::Connected { .. } => "connected",
            PlayerEvent::Buffering { .. } => "buffering",
            PlayerEvent::Playing { .. } => "playing",
            PlayerEvent::Paused { .. } => "paused",
            PlayerEvent::Stopped { .. } => "stopped",
            PlayerEvent::Done { .. } => "done",
            PlayerEvent::Underrun { .. } => "underrun",
            PlayerEvent::Error { .. } => "error",
            PlayerEvent::Metrics { .. } => "metrics",
            PlayerEvent::StateChanged { .. } => "state_changed",
        }
    }

    /// True for the completion signal
    pub fn is_done(&self) -> bool {
        matches!(self, PlayerEvent::Done { .. })
    }
}

/// Broadcast bus for player events
///
/// Cloning is cheap; all clones publish to the same subscribers.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PlayerEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events buffered per subscriber before the
    ///   oldest are skipped
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            capacity: capacity.max(1),
        }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
        }
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PlayerEvent,
    ) -> Result<usize, broadcast::error::SendError<PlayerEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PlayerEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// One listener on an `EventBus`
pub struct Subscription {
    rx: broadcast::Receiver<PlayerEvent>,
}

impl Subscription {
    /// Wait for the next event
    ///
    /// Returns `None` once every bus handle has been dropped. Events skipped
    /// because this subscriber lagged are logged and passed over.
    pub async fn recv(&mut self) -> Option<PlayerEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Event subscriber lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next event if one is already queued
    pub fn try_recv(&mut self) -> Option<PlayerEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!("Event subscriber lagged, skipped {} events", skipped);
                }
                Err(_) => return None,
            }
        }
    }

    /// Detach from the bus
    pub fn unsubscribe(self) {
        drop(self);
    }
}
