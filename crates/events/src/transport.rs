//! Collaborator traits at the edge of the event system.

use async_trait::async_trait;
use dispatch_core::types::DbId;

use crate::bus::Audience;

/// Reaches connected users. Implemented by the WebSocket connection
/// manager; tests substitute a recording fake.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver one event to every connection matched by any of
    /// `audiences`, at most once per connection.
    ///
    /// Returns the users for whom at least one addressed connection could
    /// not be written to.
    async fn send(
        &self,
        audiences: &[Audience],
        event_name: &str,
        payload: &serde_json::Value,
    ) -> Vec<DbId>;

    /// Send a liveness probe to every connection.
    async fn broadcast_heartbeat(&self);
}

/// Told when a user may have lost liveness (failed send or missed
/// heartbeat). Implementations re-check the user against the store.
#[async_trait]
pub trait LivenessListener: Send + Sync {
    async fn liveness_suspect(&self, user_id: DbId);
}
