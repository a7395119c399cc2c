use axum::routing::{get, post};
use axum::Router;

use crate::handlers::extensions;
use crate::state::AppState;

/// Routes mounted at `/extensions`.
///
/// ```text
/// GET    /                -> list_extensions
/// POST   /{id}/review     -> review_extension
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(extensions::list_extensions))
        .route("/{id}/review", post(extensions::review_extension))
}
