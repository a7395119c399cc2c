//! Repository for the `tasks` table.

use dispatch_core::types::{DbId, Timestamp};
use sqlx::{PgConnection, PgPool};

use crate::models::audit::NewAuditEntry;
use crate::models::status::{id_list, StatusId, TaskStatus};
use crate::models::task::{NewTask, Task, TaskFilter};
use crate::repositories::AuditRepo;
use crate::store::TaskCommit;

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "\
    id, title, notes, status_id, dispatcher_id, worker_id, released_worker_id, \
    allotted_minutes, original_minutes, accepted_at, started_at, \
    paused_at, paused_secs, overtime_at, pre_overtime_status_id, \
    completed_at, cancelled_at, attention_reason, version, \
    created_at, updated_at";

/// Provides conditional-update operations for tasks.
pub struct TaskRepo;

impl TaskRepo {
    /// Insert a new `pending` task and its creation audit row in one
    /// transaction. `original_minutes` is fixed here and never written again.
    pub async fn create(
        pool: &PgPool,
        input: &NewTask,
        audit: &NewAuditEntry,
        now: Timestamp,
    ) -> Result<Task, sqlx::Error> {
        let query = format!(
            "INSERT INTO tasks
                (title, notes, status_id, dispatcher_id, allotted_minutes, original_minutes,
                 created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $5, $6, $6)
             RETURNING {COLUMNS}"
        );
        let mut tx = pool.begin().await?;
        let task = sqlx::query_as::<_, Task>(&query)
            .bind(&input.title)
            .bind(&input.notes)
            .bind(TaskStatus::Pending.id())
            .bind(input.dispatcher_id)
            .bind(input.allotted_minutes)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;

        let entry = NewAuditEntry {
            task_id: task.id,
            ..audit.clone()
        };
        AuditRepo::create_in(&mut *tx, &entry, now).await?;
        tx.commit().await?;
        Ok(task)
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Task>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tasks WHERE id = $1");
        sqlx::query_as::<_, Task>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List tasks matching `filter`, newest first.
    ///
    /// With no owner filter every task matches; otherwise a task matches if
    /// it belongs to the dispatcher, is assigned to the worker, or (with
    /// `include_open`) is still `pending`.
    pub async fn list(pool: &PgPool, filter: &TaskFilter) -> Result<Vec<Task>, sqlx::Error> {
        let (limit, offset) = filter.page();
        let statuses: Vec<StatusId> = filter.statuses.iter().map(|s| s.id()).collect();
        let query = format!(
            "SELECT {COLUMNS} FROM tasks
             WHERE (cardinality($1::SMALLINT[]) = 0 OR status_id = ANY($1))
               AND (($2::BIGINT IS NULL AND $3::BIGINT IS NULL)
                    OR ($4 AND status_id = $5)
                    OR dispatcher_id = $2
                    OR COALESCE(worker_id, released_worker_id) = $3)
             ORDER BY created_at DESC, id DESC
             LIMIT $6 OFFSET $7"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(&statuses)
            .bind(filter.dispatcher_id)
            .bind(filter.worker_id)
            .bind(filter.include_open)
            .bind(TaskStatus::Pending.id())
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Every task in one of `statuses`, oldest first.
    pub async fn list_in_statuses(
        pool: &PgPool,
        statuses: &[TaskStatus],
    ) -> Result<Vec<Task>, sqlx::Error> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let query = format!(
            "SELECT {COLUMNS} FROM tasks WHERE status_id IN ({}) ORDER BY id ASC",
            id_list(statuses)
        );
        sqlx::query_as::<_, Task>(&query).fetch_all(pool).await
    }

    /// Active tasks held by a worker. More than one row means the
    /// one-task-per-worker rule was bypassed.
    pub async fn list_active_for_worker(
        pool: &PgPool,
        worker_id: DbId,
    ) -> Result<Vec<Task>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM tasks
             WHERE worker_id = $1 AND status_id IN ({})
             ORDER BY id ASC",
            id_list(&TaskStatus::ACTIVE)
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(worker_id)
            .fetch_all(pool)
            .await
    }

    /// Conditionally apply `commit.next` and record its audit row, in one
    /// transaction. Returns `None` when the stored version or status no
    /// longer match.
    pub async fn commit(pool: &PgPool, commit: &TaskCommit<'_>) -> Result<Option<Task>, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let updated = Self::commit_in(&mut *tx, commit).await?;
        if updated.is_some() {
            tx.commit().await?;
        }
        Ok(updated)
    }

    /// Same as [`commit`](Self::commit) inside a caller-owned transaction.
    pub async fn commit_in(
        conn: &mut PgConnection,
        commit: &TaskCommit<'_>,
    ) -> Result<Option<Task>, sqlx::Error> {
        let next = commit.next;
        let query = format!(
            "UPDATE tasks SET
                status_id = $4, worker_id = $5, allotted_minutes = $6,
                accepted_at = $7, started_at = $8, paused_at = $9, paused_secs = $10,
                overtime_at = $11, pre_overtime_status_id = $12,
                completed_at = $13, cancelled_at = $14,
                attention_reason = CASE WHEN $15 THEN NULL ELSE attention_reason END,
                updated_at = $16, released_worker_id = $17, version = version + 1
             WHERE id = $1 AND version = $2 AND status_id = $3
             RETURNING {COLUMNS}"
        );
        let updated = sqlx::query_as::<_, Task>(&query)
            .bind(commit.expected.id)
            .bind(commit.expected.version)
            .bind(commit.expected.status.id())
            .bind(next.status.id())
            .bind(next.worker_id)
            .bind(next.allotted_minutes)
            .bind(next.accepted_at)
            .bind(next.started_at)
            .bind(next.paused_at)
            .bind(next.paused_secs)
            .bind(next.overtime_at)
            .bind(next.pre_overtime_status_id)
            .bind(next.completed_at)
            .bind(next.cancelled_at)
            .bind(commit.clear_attention)
            .bind(next.updated_at)
            .bind(next.released_worker_id)
            .fetch_optional(&mut *conn)
            .await?;

        if updated.is_some() {
            AuditRepo::create_in(conn, commit.audit, next.updated_at).await?;
        }
        Ok(updated)
    }

    /// Set or clear the attention flag on a non-terminal task. Does not
    /// bump `version`, so it never invalidates an in-flight transition.
    pub async fn set_attention(
        pool: &PgPool,
        id: DbId,
        reason: Option<&str>,
        now: Timestamp,
    ) -> Result<Option<Task>, sqlx::Error> {
        let query = format!(
            "UPDATE tasks SET attention_reason = $2, updated_at = $3
             WHERE id = $1
               AND status_id NOT IN ({})
               AND attention_reason IS DISTINCT FROM $2
             RETURNING {COLUMNS}",
            id_list(&[TaskStatus::Completed, TaskStatus::Cancelled])
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(id)
            .bind(reason)
            .bind(now)
            .fetch_optional(pool)
            .await
    }
}
