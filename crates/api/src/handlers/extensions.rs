//! Handlers for extension requests.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use dispatch_core::extension::ReviewDecision;
use dispatch_core::roles::Operation;
use dispatch_core::types::DbId;
use dispatch_db::models::extension_request::ExtensionListQuery;
use serde::Deserialize;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RequestExtensionInput {
    pub minutes: i32,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewInput {
    pub decision: ReviewDecision,
    pub reason: Option<String>,
}

/// POST /api/v1/tasks/{id}/extensions
///
/// The assigned worker asks for more time. Returns 201 with the pending
/// request.
pub async fn request_extension(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(task_id): Path<DbId>,
    Json(input): Json<RequestExtensionInput>,
) -> AppResult<impl IntoResponse> {
    auth.require(Operation::RequestExtension)?;
    let request = state
        .engine
        .extensions
        .request(&auth.actor(), task_id, input.minutes, input.reason)
        .await?;

    Ok((StatusCode::CREATED, Json(DataResponse { data: request })))
}

/// GET /api/v1/extensions?status=&task_id=
pub async fn list_extensions(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<ExtensionListQuery>,
) -> AppResult<impl IntoResponse> {
    auth.require(Operation::ViewTasks)?;
    let requests = state
        .engine
        .extensions
        .list(&auth.actor(), &params)
        .await?;
    Ok(Json(DataResponse { data: requests }))
}

/// POST /api/v1/extensions/{id}/review
pub async fn review_extension(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(request_id): Path<DbId>,
    Json(input): Json<ReviewInput>,
) -> AppResult<impl IntoResponse> {
    auth.require(Operation::ReviewExtension)?;
    let request = state
        .engine
        .extensions
        .review(&auth.actor(), request_id, input.decision, input.reason)
        .await?;

    Ok(Json(DataResponse { data: request }))
}
