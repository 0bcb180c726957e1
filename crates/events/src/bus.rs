//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] carries [`SessionEvent`]s from the session runtime to the
//! presentation layer. It is designed to be shared via `Arc<EventBus>`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use shadow_core::session::SessionNotice;
use shadow_core::types::DbId;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// SessionEvent
// ---------------------------------------------------------------------------

/// A notice raised by a practice session.
///
/// Constructed via [`SessionEvent::new`] and tagged with
/// [`for_session`](SessionEvent::for_session).
#[derive(Debug, Clone, Serialize)]
pub struct SessionEvent {
    /// Dot-separated event name, e.g. `"recording.saved"`.
    pub event_type: &'static str,

    pub user_id: Option<DbId>,

    pub clip_id: Option<DbId>,

    pub notice: SessionNotice,

    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl SessionEvent {
    pub fn new(notice: SessionNotice) -> Self {
        Self {
            event_type: notice.kind(),
            user_id: None,
            clip_id: None,
            notice,
            timestamp: Utc::now(),
        }
    }

    /// Attach the owning user and clip.
    pub fn for_session(mut self, user_id: DbId, clip_id: DbId) -> Self {
        self.user_id = Some(user_id);
        self.clip_id = Some(clip_id);
        self
    }

    /// Serialize for forwarding over a text channel.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
            tracing::warn!(error = %e, event_type = self.event_type, "Failed to serialize session event");
            serde_json::Value::Null
        })
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// In-process fan-out event bus.
///
/// # Usage
///
/// ```rust
/// use shadow_core::session::SessionNotice;
/// use shadow_events::bus::{EventBus, SessionEvent};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(SessionEvent::new(SessionNotice::Unlocked).for_session(1, 2));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped.
    pub fn publish(&self, event: SessionEvent) {
        // Ignore the SendError; it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
