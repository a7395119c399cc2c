//! Operator endpoints for the background jobs. Admin only.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use dispatch_core::types::DbId;
use serde::Serialize;

use crate::error::AppResult;
use crate::middleware::rbac::RequireAdmin;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct DetectorState {
    pub suspended: bool,
}

/// POST /api/v1/admin/reconcile
///
/// Run a full reconcile sweep now.
pub async fn reconcile_all(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let report = state.engine.reconciler.sweep_once().await?;
    tracing::info!(
        admin_id = admin.user_id,
        checked = report.checked,
        corrected = report.corrected.len(),
        "Manual reconcile sweep",
    );
    Ok(Json(DataResponse { data: report }))
}

/// POST /api/v1/admin/workers/{id}/reconcile
pub async fn reconcile_worker(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(worker_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let check = state.engine.reconciler.check_worker(worker_id).await?;
    tracing::info!(
        admin_id = admin.user_id,
        worker_id,
        corrected = check.corrected(),
        "Manual worker reconcile",
    );
    Ok(Json(DataResponse { data: check }))
}

/// POST /api/v1/admin/overtime/scan
pub async fn scan_overtime(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let report = state.engine.overtime.scan_once().await?;
    Ok(Json(DataResponse { data: report }))
}

/// POST /api/v1/admin/overtime/suspend
pub async fn suspend_overtime(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
) -> impl IntoResponse {
    state.engine.overtime.suspend();
    Json(DataResponse {
        data: DetectorState { suspended: true },
    })
}

/// POST /api/v1/admin/overtime/resume
pub async fn resume_overtime(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
) -> impl IntoResponse {
    state.engine.overtime.resume();
    Json(DataResponse {
        data: DetectorState { suspended: false },
    })
}

/// POST /api/v1/admin/sessions/sweep
pub async fn sweep_sessions(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let report = state.engine.sessions.sweep_once().await?;
    Ok(Json(DataResponse { data: report }))
}
