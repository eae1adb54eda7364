use stemsvc_core::error::CoreError;
use stemsvc_storage::StorageError;

/// Errors returned synchronously by [`JobOrchestrator`](super::JobOrchestrator)
/// operations. Background failures never surface here; they end up on the
/// job record instead.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
