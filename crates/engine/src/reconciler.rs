//! Availability and liveness drift repair.
//!
//! Both checks run through [`Reconciler::check_worker`]: the periodic sweep,
//! the operator endpoints, session expiry and failed event sends all end up
//! there. A check only ever moves stored state toward the derived value, so
//! it is safe alongside user actions and other instances.

use std::sync::Arc;

use async_trait::async_trait;
use dispatch_core::error::CoreError;
use dispatch_core::events::{REASON_LIVENESS_LOST, REASON_SESSION_CHANGE, REASON_SYSTEM_CORRECTED};
use dispatch_core::status::Availability;
use dispatch_core::types::DbId;
use dispatch_events::LivenessListener;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::availability::AvailabilityManager;
use crate::error::{EngineError, EngineResult};
use crate::notify;
use crate::EngineContext;

/// Attention reason stored on tasks held by a worker with no live session.
pub const ATTENTION_WORKER_OFFLINE: &str = "Assigned worker is offline";

/// Result of checking one worker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerCheck {
    pub worker_id: DbId,
    pub live: bool,
    pub previous: Availability,
    pub availability: Availability,
    /// Tasks newly flagged for dispatcher attention.
    pub flagged: Vec<DbId>,
    /// Tasks whose flag was cleared because the worker is live again.
    pub cleared: Vec<DbId>,
}

impl WorkerCheck {
    pub fn corrected(&self) -> bool {
        self.previous != self.availability
    }
}

/// Result of a full sweep.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileReport {
    pub checked: usize,
    /// Workers whose stored availability was corrected.
    pub corrected: Vec<DbId>,
    pub flagged_tasks: Vec<DbId>,
    pub failures: Vec<(DbId, String)>,
}

pub struct Reconciler {
    ctx: EngineContext,
    availability: Arc<AvailabilityManager>,
}

impl Reconciler {
    pub fn new(ctx: EngineContext, availability: Arc<AvailabilityManager>) -> Self {
        Self { ctx, availability }
    }

    /// Run the sweep loop until the cancellation token is triggered.
    pub async fn run(&self, cancel: CancellationToken) {
        let period = self.ctx.config.reconcile_interval;
        let mut ticker = tokio::time::interval(period);
        tracing::info!(interval_secs = period.as_secs(), "Reconciler started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Reconciler shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    match self.sweep_once().await {
                        Ok(report) => tracing::debug!(
                            checked = report.checked,
                            corrected = report.corrected.len(),
                            flagged = report.flagged_tasks.len(),
                            failed = report.failures.len(),
                            "Reconcile sweep finished"
                        ),
                        Err(e) => tracing::error!(error = %e, "Reconcile sweep failed"),
                    }
                }
            }
        }
    }

    /// Check every registered worker. One worker's failure is recorded and
    /// the sweep continues.
    pub async fn sweep_once(&self) -> EngineResult<ReconcileReport> {
        let workers = self.ctx.store.list_workers().await?;
        let mut report = ReconcileReport {
            checked: workers.len(),
            ..Default::default()
        };

        for worker in workers {
            match self.check_worker(worker.id).await {
                Ok(check) => {
                    if check.corrected() {
                        report.corrected.push(check.worker_id);
                    }
                    report.flagged_tasks.extend(check.flagged);
                }
                Err(e) => {
                    tracing::warn!(worker_id = worker.id, error = %e, "Reconcile check failed");
                    report.failures.push((worker.id, e.to_string()));
                }
            }
        }

        if !report.corrected.is_empty() {
            tracing::info!(corrected = ?report.corrected, "Reconciler corrected availability drift");
        }
        Ok(report)
    }

    /// Run both checks for one worker.
    pub async fn check_worker(&self, worker_id: DbId) -> EngineResult<WorkerCheck> {
        self.check(worker_id, REASON_SYSTEM_CORRECTED).await
    }

    /// Like [`check_worker`](Self::check_worker) for an arbitrary user;
    /// `None` when the user has no worker profile.
    pub async fn check_user(&self, user_id: DbId) -> EngineResult<Option<WorkerCheck>> {
        not_a_worker(self.check_worker(user_id).await)
    }

    /// Re-check a user after one of their sessions opened or closed.
    pub(crate) async fn session_changed(&self, user_id: DbId) -> EngineResult<Option<WorkerCheck>> {
        not_a_worker(self.check(user_id, REASON_SESSION_CHANGE).await)
    }

    async fn check(&self, worker_id: DbId, live_reason: &str) -> EngineResult<WorkerCheck> {
        let evaluation = self.availability.evaluate(worker_id).await?;
        let previous = evaluation.worker.availability;
        let live = evaluation.live;
        let active = evaluation.active_tasks.clone();

        let reason = if live {
            live_reason
        } else {
            REASON_LIVENESS_LOST
        };
        let availability = match self.availability.apply(evaluation, reason).await? {
            Some(updated) => updated.availability,
            None => previous,
        };

        let mut flagged = Vec::new();
        let mut cleared = Vec::new();
        let now = self.ctx.now();
        for task in &active {
            let flag = (!live).then_some(ATTENTION_WORKER_OFFLINE);
            if let Some(updated) = self.ctx.store.set_task_attention(task.id, flag, now).await? {
                if live {
                    cleared.push(updated.id);
                } else {
                    tracing::warn!(
                        task_id = updated.id,
                        worker_id,
                        "Task flagged: assigned worker has no live session"
                    );
                    flagged.push(updated.id);
                }
                self.ctx.publish(notify::attention_event(&updated, now));
            }
        }

        Ok(WorkerCheck {
            worker_id,
            live,
            previous,
            availability,
            flagged,
            cleared,
        })
    }
}

fn not_a_worker(result: EngineResult<WorkerCheck>) -> EngineResult<Option<WorkerCheck>> {
    match result {
        Ok(check) => Ok(Some(check)),
        Err(EngineError::Core(CoreError::NotFound { .. })) => Ok(None),
        Err(e) => Err(e),
    }
}

#[async_trait]
impl LivenessListener for Reconciler {
    async fn liveness_suspect(&self, user_id: DbId) {
        match self.check_user(user_id).await {
            Ok(Some(check)) if check.corrected() => tracing::info!(
                worker_id = user_id,
                to = %check.availability,
                "Liveness check corrected availability"
            ),
            Ok(_) => {}
            Err(e) => tracing::warn!(user_id, error = %e, "Liveness check failed"),
        }
    }
}
