/// Failure reported by a single [`ObjectStore`](crate::ObjectStore) call.
#[derive(Debug, thiserror::Error)]
pub enum ObjectStoreError {
    /// No object exists under the key.
    #[error("object not found: {0}")]
    NotFound(String),

    /// Authentication or permission failure. Never retried.
    #[error("access denied: {0}")]
    Denied(String),

    /// Request refused for a reason other than access (bad bucket, malformed
    /// request). Never retried.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// Network or service failure that may succeed on another attempt.
    #[error("transient storage failure: {0}")]
    Transient(String),
}

impl ObjectStoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Failure surfaced by the [`StorageGateway`](crate::StorageGateway).
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage key not found: {0}")]
    NotFound(String),

    #[error("storage access denied for {key}: {reason}")]
    Denied { key: String, reason: String },

    #[error("storage request for {key} rejected: {reason}")]
    Rejected { key: String, reason: String },

    #[error("storage operation on {key} failed after {attempts} attempt(s): {reason}")]
    Exhausted {
        key: String,
        attempts: u32,
        reason: String,
    },

    #[error("invalid storage key hint: {0}")]
    InvalidKey(String),
}
