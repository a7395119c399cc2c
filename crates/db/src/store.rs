//! The persistent store collaborator.
//!
//! Every state-changing method is a conditional update: it names the state
//! it expects to find and writes only if that state still holds. A `None`
//! (or [`ReviewOutcome::RequestNotPending`]/[`ReviewOutcome::TaskChanged`])
//! result means the caller lost a race and nothing was written.
//!
//! Worker availability is written through a separate trait,
//! [`AvailabilityStore`], so only the availability manager can hold the
//! mutating half.

use async_trait::async_trait;
use dispatch_core::types::{DbId, Timestamp};

use crate::models::audit::{NewAuditEntry, TaskAuditEntry};
use crate::models::extension_request::{
    ExtensionFilter, ExtensionRequest, ExtensionReview, NewExtensionRequest,
};
use crate::models::session::{NewSession, UserSession};
use crate::models::status::{Availability, TaskStatus};
use crate::models::task::{NewTask, Task, TaskFilter};
use crate::models::worker::{NewWorker, Worker};

/// Partial unique index: one active task per worker.
pub const UQ_ACTIVE_WORKER: &str = "uq_tasks_active_worker";

/// Partial unique index: one pending extension request per task.
pub const UQ_PENDING_EXTENSION: &str = "uq_extension_requests_pending_task";

/// Primary key of the `workers` table.
pub const PK_WORKERS: &str = "workers_pkey";

/// Persistence failure. Retriable; a failed write never partially commits.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("Unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            // PostgreSQL unique constraint violation: error code 23505
            if db_err.code().as_deref() == Some("23505") {
                return StoreError::UniqueViolation {
                    constraint: db_err.constraint().unwrap_or("unknown").to_string(),
                };
            }
        }
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                StoreError::Unavailable(err.to_string())
            }
            other => StoreError::Database(other),
        }
    }
}

impl StoreError {
    /// True when this is a violation of the named unique constraint.
    pub fn is_unique_violation(&self, name: &str) -> bool {
        matches!(self, StoreError::UniqueViolation { constraint } if constraint == name)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A conditional task update plus the audit row recorded with it.
///
/// The write applies only if the stored row still has `expected.version`
/// and `expected.status`. On success the stored version is incremented.
#[derive(Debug, Clone, Copy)]
pub struct TaskCommit<'a> {
    pub expected: &'a Task,
    pub next: &'a Task,
    /// Clear `attention_reason` as part of this write.
    pub clear_attention: bool,
    pub audit: &'a NewAuditEntry,
}

/// Result of [`Store::review_extension`].
#[derive(Debug, Clone, PartialEq)]
pub enum ReviewOutcome {
    Reviewed {
        request: ExtensionRequest,
        task: Option<Task>,
    },
    /// The request was no longer pending.
    RequestNotPending,
    /// The accompanying task commit lost its race; nothing was written.
    TaskChanged,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn health_check(&self) -> StoreResult<()>;

    // -- tasks --

    /// Insert a `pending` task together with its creation audit row, both
    /// or neither. `audit.task_id` is replaced with the new task's id.
    async fn insert_task(
        &self,
        input: &NewTask,
        audit: &NewAuditEntry,
        now: Timestamp,
    ) -> StoreResult<Task>;
    async fn find_task(&self, id: DbId) -> StoreResult<Option<Task>>;
    async fn list_tasks(&self, filter: &TaskFilter) -> StoreResult<Vec<Task>>;
    /// Every task in one of `statuses`, unpaginated, oldest first.
    async fn list_tasks_in(&self, statuses: &[TaskStatus]) -> StoreResult<Vec<Task>>;
    /// Tasks in an active status assigned to `worker_id`.
    async fn list_active_tasks_for_worker(&self, worker_id: DbId) -> StoreResult<Vec<Task>>;
    /// Apply a conditional update. `None` means the row had moved on.
    async fn commit_task(&self, commit: &TaskCommit<'_>) -> StoreResult<Option<Task>>;
    /// Set or clear the attention flag on a non-terminal task without
    /// bumping its version. `None` when nothing changed.
    async fn set_task_attention(
        &self,
        task_id: DbId,
        reason: Option<&str>,
        now: Timestamp,
    ) -> StoreResult<Option<Task>>;

    // -- workers --

    async fn insert_worker(&self, input: &NewWorker, now: Timestamp) -> StoreResult<Worker>;
    async fn find_worker(&self, id: DbId) -> StoreResult<Option<Worker>>;
    async fn list_workers(&self) -> StoreResult<Vec<Worker>>;

    // -- extension requests --

    /// Insert a pending request, provided the task is still in a status
    /// that accepts extensions. `None` when it is not.
    async fn insert_extension_request(
        &self,
        input: &NewExtensionRequest,
        now: Timestamp,
    ) -> StoreResult<Option<ExtensionRequest>>;
    async fn find_extension_request(&self, id: DbId) -> StoreResult<Option<ExtensionRequest>>;
    async fn find_pending_extension(&self, task_id: DbId)
        -> StoreResult<Option<ExtensionRequest>>;
    async fn list_extension_requests(
        &self,
        filter: &ExtensionFilter,
    ) -> StoreResult<Vec<ExtensionRequest>>;
    /// Close a pending request and, atomically with it, apply `task`.
    async fn review_extension(
        &self,
        review: &ExtensionReview,
        task: Option<&TaskCommit<'_>>,
    ) -> StoreResult<ReviewOutcome>;

    // -- sessions --

    async fn insert_session(&self, input: &NewSession, now: Timestamp) -> StoreResult<UserSession>;
    async fn list_sessions_for_user(&self, user_id: DbId) -> StoreResult<Vec<UserSession>>;
    /// Refresh `last_activity_at` on the user's active, unexpired sessions.
    async fn touch_sessions(&self, user_id: DbId, now: Timestamp) -> StoreResult<u64>;
    /// Deactivate sessions that expired or have been idle since before
    /// `idle_cutoff`. Returns the distinct affected user ids.
    async fn deactivate_stale_sessions(
        &self,
        now: Timestamp,
        idle_cutoff: Timestamp,
    ) -> StoreResult<Vec<DbId>>;
    async fn deactivate_sessions_for_user(&self, user_id: DbId) -> StoreResult<u64>;
    /// Delete inactive or expired sessions last used before `before`.
    async fn purge_sessions(&self, before: Timestamp) -> StoreResult<u64>;

    // -- audit --

    async fn list_audit(&self, task_id: DbId) -> StoreResult<Vec<TaskAuditEntry>>;
}

/// The one mutating path for worker availability.
#[async_trait]
pub trait AvailabilityStore: Send + Sync {
    /// Write `next` iff the stored value is still `expected`.
    async fn write_availability(
        &self,
        worker_id: DbId,
        expected: Availability,
        next: Availability,
        now: Timestamp,
    ) -> StoreResult<Option<Worker>>;
}
