use crate::types::DbId;

/// Domain error taxonomy shared by every layer.
///
/// None of these are fatal: each one is reported back to the caller, which
/// decides whether to re-read state and try again.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    /// A transition was attempted from the wrong source state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Lost a race for a resource another caller committed first.
    #[error("Already taken: {0}")]
    AlreadyTaken(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
