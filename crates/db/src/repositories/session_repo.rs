//! Repository for the `user_sessions` table.

use dispatch_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::session::{NewSession, UserSession};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, user_id, token_fingerprint, expires_at, last_activity_at, \
                       is_active, created_at";

/// Provides session bookkeeping used by liveness checks.
pub struct SessionRepo;

impl SessionRepo {
    /// Insert a new session, returning the created row.
    pub async fn create(pool: &PgPool, input: &NewSession, now: Timestamp) -> Result<UserSession, sqlx::Error> {
        let query = format!(
            "INSERT INTO user_sessions
                (user_id, token_fingerprint, expires_at, last_activity_at, is_active, created_at)
             VALUES ($1, $2, $3, $4, true, $4)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, UserSession>(&query)
            .bind(input.user_id)
            .bind(&input.token_fingerprint)
            .bind(input.expires_at)
            .bind(now)
            .fetch_one(pool)
            .await
    }

    pub async fn list_for_user(pool: &PgPool, user_id: DbId) -> Result<Vec<UserSession>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM user_sessions WHERE user_id = $1 ORDER BY id ASC"
        );
        sqlx::query_as::<_, UserSession>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    /// Refresh activity on a user's active, unexpired sessions.
    pub async fn touch(pool: &PgPool, user_id: DbId, now: Timestamp) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE user_sessions SET last_activity_at = $2
             WHERE user_id = $1 AND is_active = true AND expires_at > $2",
        )
        .bind(user_id)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Deactivate expired or idle sessions. Returns distinct user ids.
    pub async fn deactivate_stale(
        pool: &PgPool,
        now: Timestamp,
        idle_cutoff: Timestamp,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        let rows: Vec<(DbId,)> = sqlx::query_as(
            "WITH stale AS (
                UPDATE user_sessions SET is_active = false
                WHERE is_active = true AND (expires_at <= $1 OR last_activity_at < $2)
                RETURNING user_id
             )
             SELECT DISTINCT user_id FROM stale ORDER BY user_id",
        )
        .bind(now)
        .bind(idle_cutoff)
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    /// Deactivate all sessions for a user (logout everywhere).
    pub async fn deactivate_for_user(pool: &PgPool, user_id: DbId) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE user_sessions SET is_active = false WHERE user_id = $1 AND is_active = true",
        )
        .bind(user_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Delete dead sessions whose last activity predates `before`.
    pub async fn purge(pool: &PgPool, before: Timestamp) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM user_sessions
             WHERE (is_active = false OR expires_at < $1) AND last_activity_at < $1",
        )
        .bind(before)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
