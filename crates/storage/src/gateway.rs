//! Retrying front door to an [`ObjectStore`].

use std::sync::Arc;

use crate::error::{ObjectStoreError, StorageError};
use crate::keys::derive_key;
use crate::retry::{with_backoff, RetryConfig, RetryFailure};
use crate::ObjectStore;

/// Allocates unique keys and retries transient store failures.
///
/// Holds no per-job state; one instance is shared by every job.
#[derive(Clone)]
pub struct StorageGateway {
    store: Arc<dyn ObjectStore>,
    retry: RetryConfig,
}

impl StorageGateway {
    pub fn new(store: Arc<dyn ObjectStore>, retry: RetryConfig) -> Self {
        Self { store, retry }
    }

    /// Store `bytes` under a fresh key derived from `key_hint` and return it.
    pub async fn put(&self, key_hint: &str, bytes: Vec<u8>) -> Result<String, StorageError> {
        let key = derive_key(key_hint)?;
        let size = bytes.len();
        let store = &self.store;
        let target = key.as_str();
        let bytes = &bytes;

        with_backoff("put", target, &self.retry, || async move {
            store.put_object(target, bytes.clone()).await
        })
        .await
        .map_err(|failure| into_storage_error(target, failure))?;

        tracing::debug!(key = %key, size, backend = store.backend_name(), "Stored object");
        Ok(key)
    }

    /// Fetch the blob stored under `key`.
    pub async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let store = &self.store;
        let bytes = with_backoff("get", key, &self.retry, || async move {
            store.get_object(key).await
        })
        .await
        .map_err(|failure| into_storage_error(key, failure))?;

        tracing::debug!(key, size = bytes.len(), "Fetched object");
        Ok(bytes)
    }

    /// Label of the underlying store.
    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }
}

fn into_storage_error(key: &str, failure: RetryFailure) -> StorageError {
    let key = key.to_string();
    match failure.error {
        ObjectStoreError::NotFound(_) => StorageError::NotFound(key),
        ObjectStoreError::Denied(reason) => {
            tracing::error!(key = %key, reason = %reason, "Storage access denied");
            StorageError::Denied { key, reason }
        }
        ObjectStoreError::Rejected(reason) => StorageError::Rejected { key, reason },
        ObjectStoreError::Transient(reason) => {
            tracing::error!(
                key = %key,
                attempts = failure.attempts,
                reason = %reason,
                "Storage retries exhausted",
            );
            StorageError::Exhausted {
                key,
                attempts: failure.attempts,
                reason,
            }
        }
    }
}
