//! Handlers for the caller's own sessions.
//!
//! A worker is live while it holds an active session with recent activity,
//! so these endpoints are how a client without a WebSocket goes online,
//! stays online and goes offline.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SessionCount {
    pub sessions: u64,
}

/// POST /api/v1/sessions
///
/// Open a session for the presented token, or refresh the one already open
/// for it. Returns 201.
pub async fn open_session(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let session = state
        .engine
        .sessions
        .open_session(auth.user_id, &auth.token_fingerprint, auth.expires_at)
        .await?;

    Ok((StatusCode::CREATED, Json(DataResponse { data: session })))
}

/// POST /api/v1/sessions/heartbeat
///
/// Record activity on every active session of the caller.
pub async fn heartbeat(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let sessions = state.engine.sessions.touch(auth.user_id).await?;
    Ok(Json(DataResponse {
        data: SessionCount { sessions },
    }))
}

/// DELETE /api/v1/sessions
///
/// Close every session of the caller. A worker goes `offline`.
pub async fn close_sessions(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let sessions = state.engine.sessions.close_sessions(auth.user_id).await?;
    Ok(Json(DataResponse {
        data: SessionCount { sessions },
    }))
}
