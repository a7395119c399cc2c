//! The single writer of worker availability.
//!
//! Availability is never set directly. [`AvailabilityManager::recompute`]
//! derives it from the worker's active tasks and live sessions and writes
//! it with a conditional update. Nothing else in the workspace holds an
//! [`AvailabilityStore`].

use std::sync::Arc;

use dispatch_core::availability::expected_availability;
use dispatch_core::liveness::any_live;
use dispatch_core::status::Availability;
use dispatch_core::types::DbId;
use dispatch_db::models::task::Task;
use dispatch_db::models::worker::Worker;
use dispatch_db::AvailabilityStore;

use crate::error::{EngineError, EngineResult};
use crate::notify;
use crate::EngineContext;

/// Conditional writes lost to a concurrent recompute before giving up.
const MAX_WRITE_ATTEMPTS: usize = 3;

/// A worker's stored state next to what the invariant says it should be.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub worker: Worker,
    pub active_tasks: Vec<Task>,
    pub live: bool,
    pub expected: Availability,
}

impl Evaluation {
    pub fn drifted(&self) -> bool {
        self.worker.availability != self.expected
    }
}

pub struct AvailabilityManager {
    ctx: EngineContext,
    writer: Arc<dyn AvailabilityStore>,
}

impl AvailabilityManager {
    pub fn new(ctx: EngineContext, writer: Arc<dyn AvailabilityStore>) -> Self {
        Self { ctx, writer }
    }

    /// Read the worker, its active tasks and its sessions.
    ///
    /// Fails with `Conflict` if the worker holds more than one active task.
    pub async fn evaluate(&self, worker_id: DbId) -> EngineResult<Evaluation> {
        let store = &self.ctx.store;
        let worker = store
            .find_worker(worker_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Worker", worker_id))?;
        let active_tasks = store.list_active_tasks_for_worker(worker_id).await?;
        let sessions = store.list_sessions_for_user(worker_id).await?;

        let states: Vec<_> = sessions.iter().map(|s| s.state()).collect();
        let live = any_live(&states, self.ctx.now(), self.ctx.config.liveness_window);
        let expected = expected_availability(active_tasks.len(), live)?;

        Ok(Evaluation {
            worker,
            active_tasks,
            live,
            expected,
        })
    }

    /// Bring the stored availability in line with the invariant.
    ///
    /// Returns the updated worker when the value changed, `None` when it
    /// already matched. A `worker_status_changed` event is published only
    /// on an actual change, so repeated calls are side-effect free.
    pub async fn recompute(&self, worker_id: DbId, reason: &str) -> EngineResult<Option<Worker>> {
        let evaluation = self.evaluate(worker_id).await?;
        self.apply(evaluation, reason).await
    }

    /// Write an evaluation's expected value, re-evaluating if a concurrent
    /// writer got there first.
    pub async fn apply(&self, mut evaluation: Evaluation, reason: &str) -> EngineResult<Option<Worker>> {
        for _ in 0..MAX_WRITE_ATTEMPTS {
            if !evaluation.drifted() {
                return Ok(None);
            }
            let worker_id = evaluation.worker.id;
            let previous = evaluation.worker.availability;
            let now = self.ctx.now();

            if let Some(updated) = self
                .writer
                .write_availability(worker_id, previous, evaluation.expected, now)
                .await?
            {
                tracing::info!(
                    worker_id,
                    from = %previous,
                    to = %updated.availability,
                    reason,
                    "Worker availability changed"
                );
                self.ctx
                    .publish(notify::worker_status_event(&updated, previous, reason, now));
                return Ok(Some(updated));
            }

            tracing::debug!(worker_id, "Availability write lost a race, re-evaluating");
            evaluation = self.evaluate(worker_id).await?;
        }

        Err(EngineError::conflict(format!(
            "Availability of worker {} kept changing concurrently",
            evaluation.worker.id
        )))
    }
}
