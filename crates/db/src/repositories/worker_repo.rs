//! Repository for the `workers` table.

use dispatch_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::status::Availability;
use crate::models::worker::{NewWorker, Worker};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, display_name, availability_id, availability_changed_at, \
                       created_at, updated_at";

/// Provides read and conditional-update operations for workers.
pub struct WorkerRepo;

impl WorkerRepo {
    /// Register a worker profile. New workers start `offline` until a
    /// session makes them live.
    pub async fn create(pool: &PgPool, input: &NewWorker, now: Timestamp) -> Result<Worker, sqlx::Error> {
        let query = format!(
            "INSERT INTO workers (id, display_name, availability_id, availability_changed_at,
                                  created_at, updated_at)
             VALUES ($1, $2, $3, $4, $4, $4)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Worker>(&query)
            .bind(input.id)
            .bind(&input.display_name)
            .bind(Availability::Offline.id())
            .bind(now)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Worker>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM workers WHERE id = $1");
        sqlx::query_as::<_, Worker>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(pool: &PgPool) -> Result<Vec<Worker>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM workers ORDER BY id ASC");
        sqlx::query_as::<_, Worker>(&query).fetch_all(pool).await
    }

    /// Write `next` iff the stored availability is still `expected`.
    pub async fn update_availability(
        pool: &PgPool,
        id: DbId,
        expected: Availability,
        next: Availability,
        now: Timestamp,
    ) -> Result<Option<Worker>, sqlx::Error> {
        let query = format!(
            "UPDATE workers
             SET availability_id = $3, availability_changed_at = $4, updated_at = $4
             WHERE id = $1 AND availability_id = $2
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Worker>(&query)
            .bind(id)
            .bind(expected.id())
            .bind(next.id())
            .bind(now)
            .fetch_optional(pool)
            .await
    }
}
