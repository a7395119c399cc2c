//! Route definitions for the `/tasks` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::{extensions, tasks};
use crate::state::AppState;

/// Routes mounted at `/tasks`.
///
/// ```text
/// GET    /                  -> list_tasks
/// POST   /                  -> create_task
/// GET    /{id}              -> get_task
/// POST   /{id}/accept       -> accept_task
/// POST   /{id}/queue        -> queue_task
/// POST   /{id}/start        -> start_task
/// POST   /{id}/pause        -> pause_task
/// POST   /{id}/resume       -> resume_task
/// POST   /{id}/complete     -> complete_task
/// POST   /{id}/cancel       -> cancel_task
/// POST   /{id}/extend       -> extend_task
/// POST   /{id}/extensions   -> request_extension
/// GET    /{id}/audit        -> task_audit
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(tasks::list_tasks).post(tasks::create_task))
        .route("/{id}", get(tasks::get_task))
        .route("/{id}/accept", post(tasks::accept_task))
        .route("/{id}/queue", post(tasks::queue_task))
        .route("/{id}/start", post(tasks::start_task))
        .route("/{id}/pause", post(tasks::pause_task))
        .route("/{id}/resume", post(tasks::resume_task))
        .route("/{id}/complete", post(tasks::complete_task))
        .route("/{id}/cancel", post(tasks::cancel_task))
        .route("/{id}/extend", post(tasks::extend_task))
        .route("/{id}/extensions", post(extensions::request_extension))
        .route("/{id}/audit", get(tasks::task_audit))
}
