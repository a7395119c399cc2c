//! JWT-based authentication extractor for Axum handlers.

use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use dispatch_core::error::CoreError;
use dispatch_core::roles::{Actor, Role};
use dispatch_core::types::{DbId, Timestamp};
use serde::Deserialize;

use crate::auth::jwt::{token_fingerprint, validate_token};
use crate::error::AppError;
use crate::state::AppState;

/// Authenticated caller resolved from a JWT.
///
/// The token is read from the `Authorization: Bearer <token>` header, or
/// from a `?token=` query parameter when no header is present (browsers
/// cannot set headers on a WebSocket upgrade).
///
/// ```ignore
/// async fn my_handler(auth: AuthUser) -> AppResult<Json<()>> {
///     tracing::info!(user_id = auth.user_id, role = %auth.role, "handling request");
///     Ok(Json(()))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: DbId,
    pub role: Role,
    /// SHA-256 of the presented token; identifies the session it opens.
    pub token_fingerprint: String,
    pub expires_at: Timestamp,
}

impl AuthUser {
    pub fn actor(&self) -> Actor {
        Actor::new(self.user_id, self.role)
    }
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

fn unauthorized(msg: &str) -> AppError {
    AppError::Core(CoreError::Unauthorized(msg.into()))
}

fn bearer_token(parts: &Parts) -> Result<Option<String>, AppError> {
    let Some(header) = parts.headers.get("authorization") else {
        return Ok(None);
    };
    let value = header
        .to_str()
        .map_err(|_| unauthorized("Invalid Authorization header"))?;
    let token = value.strip_prefix("Bearer ").ok_or_else(|| {
        unauthorized("Invalid Authorization format. Expected: Bearer <token>")
    })?;
    Ok(Some(token.to_string()))
}

fn query_token(parts: &Parts) -> Option<String> {
    Query::<TokenQuery>::try_from_uri(&parts.uri)
        .ok()
        .and_then(|Query(q)| q.token)
        .filter(|t| !t.is_empty())
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = match bearer_token(parts)? {
            Some(token) => token,
            None => query_token(parts)
                .ok_or_else(|| unauthorized("Missing Authorization header"))?,
        };

        let claims = validate_token(&token, &state.config.jwt).map_err(|e| {
            tracing::debug!(error = %e, "Rejected access token");
            unauthorized("Invalid or expired token")
        })?;
        let role = Role::parse(&claims.role)?;
        let expires_at = claims
            .expires_at()
            .ok_or_else(|| unauthorized("Invalid token expiry"))?;

        Ok(AuthUser {
            user_id: claims.sub,
            role,
            token_fingerprint: token_fingerprint(&token),
            expires_at,
        })
    }
}
