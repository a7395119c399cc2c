//! User session model and DTOs.

use dispatch_core::liveness::SessionState;
use dispatch_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A user session row from the `user_sessions` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct UserSession {
    pub id: DbId,
    pub user_id: DbId,
    #[serde(skip)]
    pub token_fingerprint: String,
    pub expires_at: Timestamp,
    pub last_activity_at: Timestamp,
    pub is_active: bool,
    pub created_at: Timestamp,
}

impl UserSession {
    pub fn state(&self) -> SessionState {
        SessionState {
            is_active: self.is_active,
            expires_at: self.expires_at,
            last_activity_at: self.last_activity_at,
        }
    }
}

/// DTO for creating a new user session.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: DbId,
    pub token_fingerprint: String,
    pub expires_at: Timestamp,
}
