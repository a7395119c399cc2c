//! Task entity models and DTOs.

use dispatch_core::overtime::TaskClock;
use dispatch_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::{StatusId, TaskStatus};

/// A row from the `tasks` table.
///
/// `version` increments on every committed state change and is the
/// compare-and-swap token for conditional updates.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Task {
    pub id: DbId,
    pub title: String,
    pub notes: Option<String>,
    #[sqlx(rename = "status_id", try_from = "i16")]
    pub status: TaskStatus,
    pub dispatcher_id: DbId,
    /// Set iff the task is in an active status.
    pub worker_id: Option<DbId>,
    /// The worker that held the task when it completed or was cancelled.
    pub released_worker_id: Option<DbId>,
    pub allotted_minutes: i32,
    pub original_minutes: i32,
    pub accepted_at: Option<Timestamp>,
    pub started_at: Option<Timestamp>,
    pub paused_at: Option<Timestamp>,
    pub paused_secs: i64,
    pub overtime_at: Option<Timestamp>,
    #[serde(skip)]
    pub pre_overtime_status_id: Option<StatusId>,
    pub completed_at: Option<Timestamp>,
    pub cancelled_at: Option<Timestamp>,
    pub attention_reason: Option<String>,
    pub version: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Task {
    /// Timing fields used for elapsed-time computation.
    pub fn clock(&self) -> TaskClock {
        TaskClock {
            started_at: self.started_at,
            paused_at: self.paused_at,
            paused_secs: self.paused_secs,
        }
    }

    /// The worker currently or most recently responsible for the task.
    pub fn holder(&self) -> Option<DbId> {
        self.worker_id.or(self.released_worker_id)
    }

    /// The status the task held when it went into overtime.
    pub fn pre_overtime_status(&self) -> Option<TaskStatus> {
        self.pre_overtime_status_id.and_then(TaskStatus::from_id)
    }
}

/// DTO for inserting a new task. Tasks always start `pending`.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub notes: Option<String>,
    pub dispatcher_id: DbId,
    pub allotted_minutes: i32,
}

/// Store-level filter for task listings.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    /// Empty means any status.
    pub statuses: Vec<TaskStatus>,
    pub dispatcher_id: Option<DbId>,
    pub worker_id: Option<DbId>,
    /// Include `pending` tasks regardless of the owner filters.
    pub include_open: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Query parameters for `GET /api/v1/tasks`.
#[derive(Debug, Default, Deserialize)]
pub struct TaskListQuery {
    pub status: Option<TaskStatus>,
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}

/// Maximum page size for task listing.
pub const MAX_LIMIT: i64 = 100;

/// Default page size for task listing.
pub const DEFAULT_LIMIT: i64 = 50;

impl TaskFilter {
    /// Clamp pagination to `(limit, offset)`.
    pub fn page(&self) -> (i64, i64) {
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let offset = self.offset.unwrap_or(0).max(0);
        (limit, offset)
    }

    /// In-memory predicate equivalent to the SQL `WHERE` clause.
    pub fn matches(&self, task: &Task) -> bool {
        if !self.statuses.is_empty() && !self.statuses.contains(&task.status) {
            return false;
        }
        if self.dispatcher_id.is_none() && self.worker_id.is_none() {
            return true;
        }
        (self.include_open && task.status == TaskStatus::Pending)
            || self.dispatcher_id == Some(task.dispatcher_id)
            || (self.worker_id.is_some() && self.worker_id == task.holder())
    }
}
