//! Periodic overdue scan.
//!
//! Every `overtime_scan_interval` the detector lists tasks that are
//! `in_progress` or `paused` and asks the state machine to mark the
//! overdue ones. A failed task is recorded in the [`ScanReport`] and the
//! scan carries on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dispatch_core::overtime::is_overdue;
use dispatch_core::status::TaskStatus;
use dispatch_core::types::DbId;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::EngineResult;
use crate::state_machine::TaskStateMachine;
use crate::EngineContext;

/// Outcome of one pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanReport {
    pub scanned: usize,
    /// Tasks moved to `overtime` by this pass.
    pub marked: Vec<DbId>,
    pub failures: Vec<(DbId, String)>,
}

pub struct OvertimeDetector {
    ctx: EngineContext,
    tasks: Arc<TaskStateMachine>,
    suspended: AtomicBool,
}

impl OvertimeDetector {
    pub fn new(ctx: EngineContext, tasks: Arc<TaskStateMachine>) -> Self {
        Self {
            ctx,
            tasks,
            suspended: AtomicBool::new(false),
        }
    }

    /// Skip scheduled scans until [`resume`](Self::resume). On-demand
    /// [`scan_once`](Self::scan_once) calls are unaffected.
    pub fn suspend(&self) {
        self.suspended.store(true, Ordering::SeqCst);
        tracing::info!("Overtime detector suspended");
    }

    pub fn resume(&self) {
        self.suspended.store(false, Ordering::SeqCst);
        tracing::info!("Overtime detector resumed");
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst)
    }

    /// Run the scan loop until the cancellation token is triggered.
    pub async fn run(&self, cancel: CancellationToken) {
        let period = self.ctx.config.overtime_scan_interval;
        let mut ticker = tokio::time::interval(period);
        tracing::info!(interval_secs = period.as_secs(), "Overtime detector started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Overtime detector shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if self.is_suspended() {
                        continue;
                    }
                    match self.scan_once().await {
                        Ok(report) if !report.marked.is_empty() || !report.failures.is_empty() => {
                            tracing::info!(
                                scanned = report.scanned,
                                marked = report.marked.len(),
                                failed = report.failures.len(),
                                "Overtime scan finished"
                            );
                        }
                        Ok(_) => tracing::debug!("Overtime scan: nothing overdue"),
                        Err(e) => tracing::error!(error = %e, "Overtime scan failed"),
                    }
                }
            }
        }
    }

    /// One pass over every running task. Fails only if the task list itself
    /// cannot be read.
    pub async fn scan_once(&self) -> EngineResult<ScanReport> {
        let candidates = self.ctx.store.list_tasks_in(&TaskStatus::TIMED).await?;
        let now = self.ctx.now();
        let policy = self.ctx.config.pause_policy;

        let mut report = ScanReport {
            scanned: candidates.len(),
            ..Default::default()
        };
        for task in candidates
            .iter()
            .filter(|t| is_overdue(&t.clock(), t.allotted_minutes, now, policy))
        {
            match self.tasks.mark_overtime(task).await {
                Ok(Some(updated)) => report.marked.push(updated.id),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(task_id = task.id, error = %e, "Failed to mark task overtime");
                    report.failures.push((task.id, e.to_string()));
                }
            }
        }
        Ok(report)
    }
}
