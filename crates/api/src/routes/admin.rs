use axum::routing::post;
use axum::Router;

use crate::handlers::admin;
use crate::state::AppState;

/// Routes mounted at `/admin`. All require the admin role.
///
/// ```text
/// POST   /reconcile                -> reconcile_all
/// POST   /workers/{id}/reconcile   -> reconcile_worker
/// POST   /overtime/scan            -> scan_overtime
/// POST   /overtime/suspend         -> suspend_overtime
/// POST   /overtime/resume          -> resume_overtime
/// POST   /sessions/sweep           -> sweep_sessions
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/reconcile", post(admin::reconcile_all))
        .route("/workers/{id}/reconcile", post(admin::reconcile_worker))
        .route("/overtime/scan", post(admin::scan_overtime))
        .route("/overtime/suspend", post(admin::suspend_overtime))
        .route("/overtime/resume", post(admin::resume_overtime))
        .route("/sessions/sweep", post(admin::sweep_sessions))
}
