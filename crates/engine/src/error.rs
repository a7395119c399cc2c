use dispatch_core::error::CoreError;
use dispatch_db::StoreError;

/// Everything an engine operation can fail with.
///
/// `Core` errors are expected outcomes reported to the caller. `Store`
/// errors are infrastructure failures the caller may retry; the write that
/// failed never partially committed.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    pub fn not_found(entity: &'static str, id: dispatch_core::types::DbId) -> Self {
        EngineError::Core(CoreError::NotFound { entity, id })
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        EngineError::Core(CoreError::InvalidState(msg.into()))
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        EngineError::Core(CoreError::Conflict(msg.into()))
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        EngineError::Core(CoreError::Forbidden(msg.into()))
    }

    /// The domain error, if this is one.
    pub fn as_core(&self) -> Option<&CoreError> {
        match self {
            EngineError::Core(e) => Some(e),
            EngineError::Store(_) => None,
        }
    }
}
