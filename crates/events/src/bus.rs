//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is shared via `Arc<EventBus>`. Publishing never blocks and
//! never fails: delivery is best effort, and anything missed is repaired
//! by the reconciler or a full refresh on reconnect.

use chrono::{DateTime, Utc};
use dispatch_core::roles::Role;
use dispatch_core::types::DbId;
use serde::Serialize;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// Audience
// ---------------------------------------------------------------------------

/// Who an event is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Audience {
    /// Every connection of one user.
    User(DbId),
    /// Every connection whose user holds the role.
    Role(Role),
    /// Every connection.
    All,
}

impl Audience {
    /// True if a connection of `user_id` holding `role` is in this audience.
    pub fn includes(&self, user_id: DbId, role: Role) -> bool {
        match self {
            Audience::User(id) => *id == user_id,
            Audience::Role(r) => *r == role,
            Audience::All => true,
        }
    }
}

// ---------------------------------------------------------------------------
// DomainEvent
// ---------------------------------------------------------------------------

/// One committed change, ready for fan-out.
#[derive(Debug, Clone, Serialize)]
pub struct DomainEvent {
    /// Wire name, e.g. `"task_accepted"`.
    pub event_name: String,
    pub audiences: Vec<Audience>,
    /// `None` for system-initiated changes.
    pub actor_user_id: Option<DbId>,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent {
    pub fn new(event_name: impl Into<String>) -> Self {
        Self {
            event_name: event_name.into(),
            audiences: Vec::new(),
            actor_user_id: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    /// Add an audience. Duplicates are ignored.
    pub fn to(mut self, audience: Audience) -> Self {
        if !self.audiences.contains(&audience) {
            self.audiences.push(audience);
        }
        self
    }

    pub fn to_user(self, user_id: DbId) -> Self {
        self.to(Audience::User(user_id))
    }

    pub fn to_role(self, role: Role) -> Self {
        self.to(Audience::Role(role))
    }

    pub fn with_actor(mut self, user_id: DbId) -> Self {
        self.actor_user_id = Some(user_id);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// True if the event reaches `user_id` holding `role`.
    pub fn addresses(&self, user_id: DbId, role: Role) -> bool {
        self.audiences.iter().any(|a| a.includes(user_id, role))
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
pub struct EventBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full the oldest messages are dropped and slow
    /// receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: DomainEvent) {
        tracing::debug!(event = %event.event_name, "Publishing event");
        // Ignore the SendError: it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
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
