use axum::routing::post;
use axum::Router;

use crate::handlers::sessions;
use crate::state::AppState;

/// Routes mounted at `/sessions`. Every route acts on the caller's own
/// sessions.
///
/// ```text
/// POST   /            -> open_session
/// DELETE /            -> close_sessions
/// POST   /heartbeat   -> heartbeat
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(sessions::open_session).delete(sessions::close_sessions))
        .route("/heartbeat", post(sessions::heartbeat))
}
