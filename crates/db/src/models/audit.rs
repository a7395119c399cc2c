//! Task audit log models.

use dispatch_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// Audit action for a dispatcher's direct extension.
pub const ACTION_EXTEND_DIRECT: &str = "extend_direct";

/// Audit action for an approved extension request.
pub const ACTION_EXTENSION_APPROVED: &str = "extension_approved";

/// A row from the `task_audit_log` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TaskAuditEntry {
    pub id: DbId,
    pub task_id: DbId,
    /// `None` for system-initiated changes.
    pub actor_id: Option<DbId>,
    pub action: String,
    pub details: serde_json::Value,
    pub created_at: Timestamp,
}

/// DTO for inserting an audit entry.
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub task_id: DbId,
    pub actor_id: Option<DbId>,
    pub action: String,
    pub details: serde_json::Value,
}
