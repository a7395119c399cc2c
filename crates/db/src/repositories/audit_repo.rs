//! Repository for the `task_audit_log` table.

use dispatch_core::types::{DbId, Timestamp};
use sqlx::{PgConnection, PgPool};

use crate::models::audit::{NewAuditEntry, TaskAuditEntry};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, task_id, actor_id, action, details, created_at";

/// Append-only access to the task audit log.
pub struct AuditRepo;

impl AuditRepo {
    /// Insert inside a caller-owned transaction; audit rows are only ever
    /// written alongside the task change they describe.
    pub async fn create_in(
        conn: &mut PgConnection,
        entry: &NewAuditEntry,
        now: Timestamp,
    ) -> Result<TaskAuditEntry, sqlx::Error> {
        let query = format!(
            "INSERT INTO task_audit_log (task_id, actor_id, action, details, created_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, TaskAuditEntry>(&query)
            .bind(entry.task_id)
            .bind(entry.actor_id)
            .bind(&entry.action)
            .bind(&entry.details)
            .bind(now)
            .fetch_one(&mut *conn)
            .await
    }

    /// History of a task, oldest first.
    pub async fn list_for_task(pool: &PgPool, task_id: DbId) -> Result<Vec<TaskAuditEntry>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM task_audit_log WHERE task_id = $1 ORDER BY id ASC"
        );
        sqlx::query_as::<_, TaskAuditEntry>(&query)
            .bind(task_id)
            .fetch_all(pool)
            .await
    }
}
