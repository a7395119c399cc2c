//! Worker entity models and DTOs.

use dispatch_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::Availability;

/// A row from the `workers` table. `id` is the worker's user id.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Worker {
    pub id: DbId,
    pub display_name: String,
    #[sqlx(rename = "availability_id", try_from = "i16")]
    pub availability: Availability,
    pub availability_changed_at: Timestamp,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for registering a worker profile. New workers start `offline`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewWorker {
    pub id: DbId,
    pub display_name: String,
}
