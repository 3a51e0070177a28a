//! Event system for scrobd
//!
//! The daemon communicates with its consumers (rich presence, UI,
//! tooling) through a single broadcast bus:
//! - **EventBus** (tokio::broadcast): one-to-many fan-out, lossy for
//!   slow subscribers
//! - Producers never block on consumers; a lagging receiver misses
//!   events rather than stalling the state handler.

use crate::track::{Track, TrackUpdate};
use tokio::sync::broadcast;

/// Application-wide events broadcast to all sinks
#[derive(Debug, Clone)]
pub enum Event {
    /// A poller observation was applied to the accountant.
    /// Emitted for every update, including errors and no-track samples.
    PlayerUpdate(TrackUpdate),

    /// A genuinely new play began (identity triple changed)
    TrackStarted {
        track: Track,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A play crossed its eligibility threshold and entered the queue
    ScrobbleQueued {
        artist: String,
        track: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A drain cycle submitted entries to the remote service
    ScrobblesSubmitted { count: usize },
}

/// Central event distribution bus
///
/// Wraps tokio::broadcast:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
    capacity: usize,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring the no-subscribers case
    pub fn emit(&self, event: Event) {
        let _ = self.tx.send(event);
    }

    /// Number of currently attached subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
