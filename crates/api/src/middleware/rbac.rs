//! Role-based access control.
//!
//! Capability checks run once at the boundary against the role table in
//! `dispatch_core::roles`. Ownership rules are left to the engine.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use dispatch_core::error::CoreError;
use dispatch_core::roles::{Operation, Role};

use super::auth::AuthUser;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

impl AuthUser {
    /// Reject with 403 unless the caller's role may perform `op`.
    pub fn require(&self, op: Operation) -> AppResult<()> {
        self.role.require(op).map_err(AppError::Core)
    }
}

/// Requires the `admin` role. Rejects with 403 Forbidden otherwise.
///
/// ```ignore
/// async fn admin_only(RequireAdmin(user): RequireAdmin) -> AppResult<Json<()>> {
///     Ok(Json(()))
/// }
/// ```
pub struct RequireAdmin(pub AuthUser);

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if user.role != Role::Administrator {
            return Err(AppError::Core(CoreError::Forbidden(
                "Admin role required".into(),
            )));
        }
        Ok(RequireAdmin(user))
    }
}
