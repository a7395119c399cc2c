//! Extension request models and DTOs.

use dispatch_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::ExtensionStatus;

/// A row from the `extension_requests` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct ExtensionRequest {
    pub id: DbId,
    pub task_id: DbId,
    pub worker_id: DbId,
    pub reviewer_id: Option<DbId>,
    pub requested_minutes: i32,
    pub reason: Option<String>,
    #[sqlx(rename = "status_id", try_from = "i16")]
    pub status: ExtensionStatus,
    pub review_reason: Option<String>,
    pub created_at: Timestamp,
    pub reviewed_at: Option<Timestamp>,
}

/// DTO for inserting a pending extension request.
#[derive(Debug, Clone)]
pub struct NewExtensionRequest {
    pub task_id: DbId,
    pub worker_id: DbId,
    pub requested_minutes: i32,
    pub reason: Option<String>,
}

/// The review outcome written onto a pending request.
///
/// `reviewer_id` is `None` for system auto-rejections.
#[derive(Debug, Clone)]
pub struct ExtensionReview {
    pub request_id: DbId,
    pub status: ExtensionStatus,
    pub reviewer_id: Option<DbId>,
    pub review_reason: Option<String>,
    pub reviewed_at: Timestamp,
}

/// Query parameters for `GET /api/v1/extensions`.
#[derive(Debug, Default, Deserialize)]
pub struct ExtensionListQuery {
    pub status: Option<ExtensionStatus>,
    pub task_id: Option<DbId>,
}

/// Store-level filter for extension request listings.
#[derive(Debug, Clone, Default)]
pub struct ExtensionFilter {
    pub status: Option<ExtensionStatus>,
    pub task_id: Option<DbId>,
    /// Only requests on tasks owned by this dispatcher.
    pub dispatcher_id: Option<DbId>,
    pub worker_id: Option<DbId>,
}
