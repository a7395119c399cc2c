pub mod admin;
pub mod extensions;
pub mod health;
pub mod sessions;
pub mod tasks;
pub mod workers;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /ws                                   WebSocket (token via ?token=)
///
/// /tasks                                create, list
/// /tasks/{id}                           get
/// /tasks/{id}/{accept,queue,start}      worker transitions
/// /tasks/{id}/{pause,resume,complete}   holder, owning dispatcher, admin
/// /tasks/{id}/cancel                    owning dispatcher, admin
/// /tasks/{id}/extend                    direct extension
/// /tasks/{id}/extensions                request extension
/// /tasks/{id}/audit                     audit history
///
/// /extensions                           list
/// /extensions/{id}/review               approve / reject
///
/// /workers                              list, register
/// /workers/{id}                         get
///
/// /sessions                             open, close
/// /sessions/heartbeat                   record activity
///
/// /admin/reconcile                      full sweep (admin)
/// /admin/workers/{id}/reconcile         targeted check (admin)
/// /admin/overtime/{scan,suspend,resume} overtime detector (admin)
/// /admin/sessions/sweep                 session expiry (admin)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::handler::ws_handler))
        .nest("/tasks", tasks::router())
        .nest("/extensions", extensions::router())
        .nest("/workers", workers::router())
        .nest("/sessions", sessions::router())
        .nest("/admin", admin::router())
}
