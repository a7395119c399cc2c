//! Handlers for the `/tasks` resource.
//!
//! Role capability is checked here; ownership (assigned worker, owning
//! dispatcher) is enforced by the engine.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use dispatch_core::roles::Operation;
use dispatch_core::task_lifecycle::NewTaskSpec;
use dispatch_core::types::DbId;
use dispatch_db::models::task::{Task, TaskListQuery};
use serde::Deserialize;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// Body for `POST /tasks/{id}/extend`.
#[derive(Debug, Deserialize)]
pub struct ExtendInput {
    pub minutes: i32,
    pub reason: Option<String>,
}

type TaskResponse = AppResult<Json<DataResponse<Task>>>;

fn respond(task: Task) -> TaskResponse {
    Ok(Json(DataResponse { data: task }))
}

// ---------------------------------------------------------------------------
// Create / read
// ---------------------------------------------------------------------------

/// POST /api/v1/tasks
///
/// Create a `pending` task owned by the caller. Returns 201.
pub async fn create_task(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<NewTaskSpec>,
) -> AppResult<impl IntoResponse> {
    auth.require(Operation::CreateTask)?;
    let task = state.engine.tasks.create(&auth.actor(), &input).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: task })))
}

/// GET /api/v1/tasks?status=&limit=&offset=
pub async fn list_tasks(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<TaskListQuery>,
) -> AppResult<impl IntoResponse> {
    auth.require(Operation::ViewTasks)?;
    let tasks = state.engine.tasks.list(&auth.actor(), &params).await?;
    Ok(Json(DataResponse { data: tasks }))
}

/// GET /api/v1/tasks/{id}
pub async fn get_task(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(task_id): Path<DbId>,
) -> TaskResponse {
    auth.require(Operation::ViewTasks)?;
    respond(state.engine.tasks.get(&auth.actor(), task_id).await?)
}

/// GET /api/v1/tasks/{id}/audit
pub async fn task_audit(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(task_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    auth.require(Operation::ViewTasks)?;
    let entries = state
        .engine
        .tasks
        .audit_history(&auth.actor(), task_id)
        .await?;
    Ok(Json(DataResponse { data: entries }))
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

/// POST /api/v1/tasks/{id}/accept
///
/// Claim a pending task. Losing a race for the same task returns 409
/// `ALREADY_TAKEN`.
pub async fn accept_task(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(task_id): Path<DbId>,
) -> TaskResponse {
    auth.require(Operation::AcceptTask)?;
    respond(state.engine.tasks.accept(&auth.actor(), task_id).await?)
}

/// POST /api/v1/tasks/{id}/queue
pub async fn queue_task(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(task_id): Path<DbId>,
) -> TaskResponse {
    auth.require(Operation::QueueTask)?;
    respond(state.engine.tasks.queue(&auth.actor(), task_id).await?)
}

/// POST /api/v1/tasks/{id}/start
pub async fn start_task(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(task_id): Path<DbId>,
) -> TaskResponse {
    auth.require(Operation::StartTask)?;
    respond(state.engine.tasks.start(&auth.actor(), task_id).await?)
}

/// POST /api/v1/tasks/{id}/pause
pub async fn pause_task(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(task_id): Path<DbId>,
) -> TaskResponse {
    auth.require(Operation::PauseTask)?;
    respond(state.engine.tasks.pause(&auth.actor(), task_id).await?)
}

/// POST /api/v1/tasks/{id}/resume
pub async fn resume_task(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(task_id): Path<DbId>,
) -> TaskResponse {
    auth.require(Operation::ResumeTask)?;
    respond(state.engine.tasks.resume(&auth.actor(), task_id).await?)
}

/// POST /api/v1/tasks/{id}/complete
pub async fn complete_task(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(task_id): Path<DbId>,
) -> TaskResponse {
    auth.require(Operation::CompleteTask)?;
    respond(state.engine.tasks.complete(&auth.actor(), task_id).await?)
}

/// POST /api/v1/tasks/{id}/cancel
pub async fn cancel_task(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(task_id): Path<DbId>,
) -> TaskResponse {
    auth.require(Operation::CancelTask)?;
    respond(state.engine.tasks.cancel(&auth.actor(), task_id).await?)
}

/// POST /api/v1/tasks/{id}/extend
///
/// Add minutes to a running task without a worker request.
pub async fn extend_task(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(task_id): Path<DbId>,
    Json(input): Json<ExtendInput>,
) -> TaskResponse {
    auth.require(Operation::ExtendDirect)?;
    let task = state
        .engine
        .extensions
        .extend_direct(&auth.actor(), task_id, input.minutes, input.reason)
        .await?;

    respond(task)
}
