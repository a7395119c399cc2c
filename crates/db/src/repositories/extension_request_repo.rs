//! Repository for the `extension_requests` table.

use dispatch_core::types::{DbId, Timestamp};
use sqlx::{PgConnection, PgPool};

use crate::models::extension_request::{
    ExtensionFilter, ExtensionRequest, ExtensionReview, NewExtensionRequest,
};
use crate::models::status::{id_list, ExtensionStatus, TaskStatus};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "\
    id, task_id, worker_id, reviewer_id, requested_minutes, reason, \
    status_id, review_reason, created_at, reviewed_at";

/// Provides CRUD and review operations for extension requests.
pub struct ExtensionRequestRepo;

impl ExtensionRequestRepo {
    /// Insert a pending request iff the task is in a status that accepts
    /// extensions. A second pending request for the same task violates
    /// `uq_extension_requests_pending_task`.
    pub async fn create(
        pool: &PgPool,
        input: &NewExtensionRequest,
        now: Timestamp,
    ) -> Result<Option<ExtensionRequest>, sqlx::Error> {
        let open = [TaskStatus::InProgress, TaskStatus::Paused, TaskStatus::Overtime];
        let query = format!(
            "INSERT INTO extension_requests
                (task_id, worker_id, requested_minutes, reason, status_id, created_at)
             SELECT $1, $2, $3, $4, $5, $6
             WHERE EXISTS (SELECT 1 FROM tasks WHERE id = $1 AND status_id IN ({}))
             RETURNING {COLUMNS}",
            id_list(&open)
        );
        sqlx::query_as::<_, ExtensionRequest>(&query)
            .bind(input.task_id)
            .bind(input.worker_id)
            .bind(input.requested_minutes)
            .bind(&input.reason)
            .bind(ExtensionStatus::Pending.id())
            .bind(now)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<ExtensionRequest>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM extension_requests WHERE id = $1");
        sqlx::query_as::<_, ExtensionRequest>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_pending_for_task(
        pool: &PgPool,
        task_id: DbId,
    ) -> Result<Option<ExtensionRequest>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM extension_requests WHERE task_id = $1 AND status_id = $2"
        );
        sqlx::query_as::<_, ExtensionRequest>(&query)
            .bind(task_id)
            .bind(ExtensionStatus::Pending.id())
            .fetch_optional(pool)
            .await
    }

    /// List requests matching `filter`, newest first.
    pub async fn list(
        pool: &PgPool,
        filter: &ExtensionFilter,
    ) -> Result<Vec<ExtensionRequest>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM extension_requests
             WHERE ($1::SMALLINT IS NULL OR status_id = $1)
               AND ($2::BIGINT IS NULL OR task_id = $2)
               AND ($3::BIGINT IS NULL
                    OR task_id IN (SELECT id FROM tasks WHERE dispatcher_id = $3))
               AND ($4::BIGINT IS NULL OR worker_id = $4)
             ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, ExtensionRequest>(&query)
            .bind(filter.status.map(|s| s.id()))
            .bind(filter.task_id)
            .bind(filter.dispatcher_id)
            .bind(filter.worker_id)
            .fetch_all(pool)
            .await
    }

    /// Close a pending request inside a caller-owned transaction. Returns
    /// `None` if the request was not pending.
    pub async fn review_in(
        conn: &mut PgConnection,
        review: &ExtensionReview,
    ) -> Result<Option<ExtensionRequest>, sqlx::Error> {
        let query = format!(
            "UPDATE extension_requests
             SET status_id = $2, reviewer_id = $3, review_reason = $4, reviewed_at = $5
             WHERE id = $1 AND status_id = $6
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ExtensionRequest>(&query)
            .bind(review.request_id)
            .bind(review.status.id())
            .bind(review.reviewer_id)
            .bind(&review.review_reason)
            .bind(review.reviewed_at)
            .bind(ExtensionStatus::Pending.id())
            .fetch_optional(&mut *conn)
            .await
    }
}
