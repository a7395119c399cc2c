//! Per-connection liveness probing.
//!
//! Each connection carries a [`HeartbeatState`]. The [`Heartbeat`] loop
//! pings connected clients every `interval` and checks deadlines every half
//! `timeout`:
//!
//! ```text
//! Connected --probe--> AwaitingPong --miss--> Reconnecting --miss--> Offline
//!     ^                    |                       |
//!     +------pong / inbound message----------------+
//! ```
//!
//! The first missed deadline reports the user as suspect; the second closes
//! and removes the connection and reports again.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dispatch_events::LivenessListener;
use tokio_util::sync::CancellationToken;

use crate::config::HeartbeatConfig;
use crate::ws::manager::WsManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatState {
    Connected,
    AwaitingPong { deadline: Instant },
    /// One deadline already missed; a second ping is outstanding.
    Reconnecting { deadline: Instant },
    Offline,
}

/// What the manager must do after a deadline check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineOutcome {
    Unchanged,
    /// Re-ping and report the user for a liveness check.
    Suspect,
    /// Close and remove the connection, then report the user.
    Drop,
}

impl HeartbeatState {
    /// A probe is due. Returns true if a ping should be sent.
    ///
    /// Only a `Connected` connection is probed; one that is already waiting
    /// keeps its original deadline.
    pub fn probe(&mut self, now: Instant, timeout: Duration) -> bool {
        match self {
            HeartbeatState::Connected => {
                *self = HeartbeatState::AwaitingPong {
                    deadline: now + timeout,
                };
                true
            }
            _ => false,
        }
    }

    /// A pong or any inbound message arrived.
    pub fn activity(&mut self) {
        if *self != HeartbeatState::Offline {
            *self = HeartbeatState::Connected;
        }
    }

    pub fn check(&mut self, now: Instant, timeout: Duration) -> DeadlineOutcome {
        match *self {
            HeartbeatState::AwaitingPong { deadline } if now >= deadline => {
                *self = HeartbeatState::Reconnecting {
                    deadline: now + timeout,
                };
                DeadlineOutcome::Suspect
            }
            HeartbeatState::Reconnecting { deadline } if now >= deadline => {
                *self = HeartbeatState::Offline;
                DeadlineOutcome::Drop
            }
            _ => DeadlineOutcome::Unchanged,
        }
    }
}

/// Background heartbeat loop over every WebSocket connection.
pub struct Heartbeat {
    manager: Arc<WsManager>,
    listener: Arc<dyn LivenessListener>,
    config: HeartbeatConfig,
}

impl Heartbeat {
    pub fn new(
        manager: Arc<WsManager>,
        listener: Arc<dyn LivenessListener>,
        config: HeartbeatConfig,
    ) -> Self {
        Self {
            manager,
            listener,
            config,
        }
    }

    /// Run until the cancellation token is triggered.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut probe = tokio::time::interval(self.config.interval);
        let mut check = tokio::time::interval(self.config.timeout / 2);
        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            timeout_secs = self.config.timeout.as_secs(),
            "WebSocket heartbeat started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("WebSocket heartbeat shutting down");
                    break;
                }
                _ = probe.tick() => {
                    let pinged = self.manager.probe_all(Instant::now()).await;
                    tracing::debug!(pinged, "WebSocket heartbeat ping");
                }
                _ = check.tick() => {
                    self.check_once(Instant::now()).await;
                }
            }
        }
    }

    /// Apply missed deadlines and report the affected users.
    pub async fn check_once(&self, now: Instant) -> Vec<dispatch_core::types::DbId> {
        let suspects = self.manager.check_deadlines(now).await;
        for user_id in &suspects {
            tracing::info!(user_id, "Missed heartbeat, checking liveness");
            self.listener.liveness_suspect(*user_id).await;
        }
        suspects
    }
}
