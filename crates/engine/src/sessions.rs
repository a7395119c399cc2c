//! Session activity, expiry and retention.
//!
//! Liveness is derived from sessions, so every session change is followed
//! by a reconcile check for its user.

use std::sync::Arc;

use dispatch_core::status::Availability;
use dispatch_core::types::{DbId, Timestamp};
use dispatch_db::models::session::{NewSession, UserSession};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::EngineResult;
use crate::reconciler::Reconciler;
use crate::EngineContext;

/// Outcome of one expiry sweep.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionSweepReport {
    /// Users who lost at least one session in this sweep.
    pub expired_users: Vec<DbId>,
    pub purged: u64,
    pub failures: Vec<(DbId, String)>,
}

pub struct SessionKeeper {
    ctx: EngineContext,
    reconciler: Arc<Reconciler>,
}

impl SessionKeeper {
    pub fn new(ctx: EngineContext, reconciler: Arc<Reconciler>) -> Self {
        Self { ctx, reconciler }
    }

    /// Open a session for `user_id`, or refresh the active one carrying the
    /// same token fingerprint.
    pub async fn open_session(
        &self,
        user_id: DbId,
        token_fingerprint: &str,
        expires_at: Timestamp,
    ) -> EngineResult<UserSession> {
        let now = self.ctx.now();
        let existing = self
            .ctx
            .store
            .list_sessions_for_user(user_id)
            .await?
            .into_iter()
            .find(|s| s.is_active && s.expires_at > now && s.token_fingerprint == token_fingerprint);

        let session = match existing {
            Some(mut session) => {
                self.ctx.store.touch_sessions(user_id, now).await?;
                session.last_activity_at = now;
                session
            }
            None => {
                let input = NewSession {
                    user_id,
                    token_fingerprint: token_fingerprint.to_string(),
                    expires_at,
                };
                let session = self.ctx.store.insert_session(&input, now).await?;
                tracing::info!(user_id, session_id = session.id, "Session opened");
                session
            }
        };

        self.reconciler.session_changed(user_id).await?;
        Ok(session)
    }

    /// Record activity. A worker stored as offline is re-checked so it comes
    /// back online without waiting for the next sweep.
    pub async fn touch(&self, user_id: DbId) -> EngineResult<u64> {
        let touched = self.ctx.store.touch_sessions(user_id, self.ctx.now()).await?;
        if touched == 0 {
            return Ok(0);
        }
        let stored_offline = self
            .ctx
            .store
            .find_worker(user_id)
            .await?
            .is_some_and(|w| w.availability == Availability::Offline);
        if stored_offline {
            self.reconciler.session_changed(user_id).await?;
        }
        Ok(touched)
    }

    /// Deactivate every session of `user_id` and re-check the user.
    pub async fn close_sessions(&self, user_id: DbId) -> EngineResult<u64> {
        let closed = self.ctx.store.deactivate_sessions_for_user(user_id).await?;
        if closed > 0 {
            tracing::info!(user_id, closed, "Sessions closed");
        }
        self.reconciler.session_changed(user_id).await?;
        Ok(closed)
    }

    /// Run the sweep loop until the cancellation token is triggered.
    pub async fn run(&self, cancel: CancellationToken) {
        let period = self.ctx.config.session_sweep_interval;
        let mut ticker = tokio::time::interval(period);
        tracing::info!(interval_secs = period.as_secs(), "Session keeper started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Session keeper shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    match self.sweep_once().await {
                        Ok(report) => {
                            if report.purged > 0 || !report.expired_users.is_empty() {
                                tracing::info!(
                                    expired_users = report.expired_users.len(),
                                    purged = report.purged,
                                    "Session sweep finished"
                                );
                            } else {
                                tracing::debug!("Session sweep: nothing to do");
                            }
                        }
                        Err(e) => tracing::error!(error = %e, "Session sweep failed"),
                    }
                }
            }
        }
    }

    /// Deactivate expired and idle sessions, re-check each affected user,
    /// then purge dead sessions older than the retention window.
    pub async fn sweep_once(&self) -> EngineResult<SessionSweepReport> {
        let now = self.ctx.now();
        let idle_cutoff = now - self.ctx.config.liveness_window;
        let expired_users = self
            .ctx
            .store
            .deactivate_stale_sessions(now, idle_cutoff)
            .await?;

        let mut report = SessionSweepReport::default();
        for &user_id in &expired_users {
            if let Err(e) = self.reconciler.session_changed(user_id).await {
                tracing::warn!(user_id, error = %e, "Liveness check after expiry failed");
                report.failures.push((user_id, e.to_string()));
            }
        }
        report.expired_users = expired_users;

        report.purged = self
            .ctx
            .store
            .purge_sessions(now - self.ctx.config.session_retention)
            .await?;
        Ok(report)
    }
}
