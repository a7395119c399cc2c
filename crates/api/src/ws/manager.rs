use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::ws::Message;
use dispatch_core::roles::Role;
use dispatch_core::types::{DbId, Timestamp};
use dispatch_events::{Audience, Transport};
use tokio::sync::{mpsc, RwLock};

use crate::config::HeartbeatConfig;
use crate::ws::heartbeat::{DeadlineOutcome, HeartbeatState};

/// Channel sender half for pushing messages to a WebSocket connection.
pub type WsSender = mpsc::UnboundedSender<Message>;

/// Metadata for a single WebSocket connection.
pub struct WsConnection {
    pub user_id: DbId,
    pub role: Role,
    /// Channel sender for outbound messages to this connection.
    pub sender: WsSender,
    pub connected_at: Timestamp,
    pub heartbeat: HeartbeatState,
}

/// Manages all active WebSocket connections and delivers engine events to
/// them.
///
/// Thread-safe via interior `RwLock`; designed to be wrapped in `Arc` and
/// shared across the application.
pub struct WsManager {
    connections: RwLock<HashMap<String, WsConnection>>,
    heartbeat_timeout: Duration,
}

/// Serialize an event as the JSON text frame clients receive.
pub fn event_frame(event_name: &str, payload: &serde_json::Value) -> String {
    serde_json::json!({
        "type": event_name,
        "data": payload,
        "timestamp": chrono::Utc::now(),
    })
    .to_string()
}

impl WsManager {
    pub fn new() -> Self {
        Self::with_heartbeat_timeout(HeartbeatConfig::default().timeout)
    }

    pub fn with_heartbeat_timeout(heartbeat_timeout: Duration) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            heartbeat_timeout,
        }
    }

    /// Register a new connection.
    ///
    /// Returns the receiver half of the message channel so the caller can
    /// forward messages to the WebSocket sink.
    pub async fn add(
        &self,
        conn_id: String,
        user_id: DbId,
        role: Role,
    ) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = WsConnection {
            user_id,
            role,
            sender: tx,
            connected_at: chrono::Utc::now(),
            heartbeat: HeartbeatState::Connected,
        };
        self.connections.write().await.insert(conn_id, conn);
        rx
    }

    /// Remove a connection by its ID. Returns its user, if it was present.
    pub async fn remove(&self, conn_id: &str) -> Option<DbId> {
        self.connections
            .write()
            .await
            .remove(conn_id)
            .map(|conn| conn.user_id)
    }

    /// Find all connection IDs associated with a given user.
    pub async fn get_by_user(&self, user_id: DbId) -> Vec<String> {
        self.connections
            .read()
            .await
            .iter()
            .filter(|(_, conn)| conn.user_id == user_id)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Return the current number of active connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn heartbeat_state(&self, conn_id: &str) -> Option<HeartbeatState> {
        self.connections
            .read()
            .await
            .get(conn_id)
            .map(|conn| conn.heartbeat)
    }

    /// Record inbound traffic (pong or message) on a connection.
    pub async fn mark_alive(&self, conn_id: &str) {
        if let Some(conn) = self.connections.write().await.get_mut(conn_id) {
            conn.heartbeat.activity();
        }
    }

    /// Ping every `Connected` connection and start its pong deadline.
    ///
    /// Returns the number of pings sent.
    pub async fn probe_all(&self, now: Instant) -> usize {
        let mut conns = self.connections.write().await;
        let mut pinged = 0;
        for conn in conns.values_mut() {
            if conn.heartbeat.probe(now, self.heartbeat_timeout) {
                let _ = conn.sender.send(Message::Ping(Bytes::new()));
                pinged += 1;
            }
        }
        pinged
    }

    /// Apply missed pong deadlines.
    ///
    /// A first miss re-pings the connection; a second miss closes and
    /// removes it. Returns every affected user once.
    pub async fn check_deadlines(&self, now: Instant) -> Vec<DbId> {
        let mut conns = self.connections.write().await;
        let mut suspects = Vec::new();
        let mut dropped = Vec::new();

        for (conn_id, conn) in conns.iter_mut() {
            match conn.heartbeat.check(now, self.heartbeat_timeout) {
                DeadlineOutcome::Unchanged => continue,
                DeadlineOutcome::Suspect => {
                    tracing::debug!(conn_id = %conn_id, user_id = conn.user_id, "Pong deadline missed");
                    let _ = conn.sender.send(Message::Ping(Bytes::new()));
                }
                DeadlineOutcome::Drop => {
                    tracing::info!(conn_id = %conn_id, user_id = conn.user_id, "Dropping unresponsive WebSocket");
                    let _ = conn.sender.send(Message::Close(None));
                    dropped.push(conn_id.clone());
                }
            }
            if !suspects.contains(&conn.user_id) {
                suspects.push(conn.user_id);
            }
        }

        for conn_id in dropped {
            conns.remove(&conn_id);
        }
        suspects
    }

    /// Send a Close frame to every connection, then clear the map.
    pub async fn shutdown_all(&self) {
        let mut conns = self.connections.write().await;
        let count = conns.len();
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Close(None));
        }
        conns.clear();
        tracing::info!(count, "Closed all WebSocket connections");
    }
}

impl Default for WsManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for WsManager {
    async fn send(
        &self,
        audiences: &[Audience],
        event_name: &str,
        payload: &serde_json::Value,
    ) -> Vec<DbId> {
        let frame = event_frame(event_name, payload);
        let conns = self.connections.read().await;
        let mut failed = Vec::new();

        for (conn_id, conn) in conns.iter() {
            if !audiences.iter().any(|a| a.includes(conn.user_id, conn.role)) {
                continue;
            }
            if conn.sender.send(Message::Text(frame.clone().into())).is_err() {
                tracing::debug!(conn_id = %conn_id, user_id = conn.user_id, event = event_name, "WebSocket channel closed");
                if !failed.contains(&conn.user_id) {
                    failed.push(conn.user_id);
                }
            }
        }
        failed
    }

    async fn broadcast_heartbeat(&self) {
        self.probe_all(Instant::now()).await;
    }
}
