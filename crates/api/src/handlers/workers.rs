//! Handlers for the worker registry.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use dispatch_core::error::CoreError;
use dispatch_core::roles::Operation;
use dispatch_core::types::DbId;
use dispatch_db::models::worker::{NewWorker, Worker};
use dispatch_db::Store;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

async fn find_worker(state: &AppState, worker_id: DbId) -> AppResult<Worker> {
    state
        .engine
        .store()
        .find_worker(worker_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Worker",
            id: worker_id,
        }))
}

/// GET /api/v1/workers
pub async fn list_workers(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    auth.require(Operation::ViewWorkers)?;
    let workers = state.engine.store().list_workers().await?;
    Ok(Json(DataResponse { data: workers }))
}

/// GET /api/v1/workers/{id}
///
/// Workers may read their own profile.
pub async fn get_worker(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(worker_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    if auth.user_id != worker_id {
        auth.require(Operation::ViewWorkers)?;
    }
    let worker = find_worker(&state, worker_id).await?;
    Ok(Json(DataResponse { data: worker }))
}

/// POST /api/v1/workers
///
/// Register a worker profile. The worker starts `offline` and is then
/// checked once, so a user who already holds a live session comes up
/// `idle`. Returns 201; 409 if the id is already registered.
pub async fn register_worker(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<NewWorker>,
) -> AppResult<impl IntoResponse> {
    auth.require(Operation::RegisterWorker)?;
    if input.display_name.trim().is_empty() {
        return Err(AppError::Core(CoreError::Validation(
            "display_name must not be empty".into(),
        )));
    }

    let worker = state
        .engine
        .store()
        .insert_worker(&input, state.engine.ctx.now())
        .await?;
    tracing::info!(worker_id = worker.id, user_id = auth.user_id, "Worker registered");

    if let Err(e) = state.engine.reconciler.check_worker(worker.id).await {
        tracing::warn!(worker_id = worker.id, error = %e, "Initial worker check failed");
    }
    let worker = find_worker(&state, worker.id).await?;

    Ok((StatusCode::CREATED, Json(DataResponse { data: worker })))
}
