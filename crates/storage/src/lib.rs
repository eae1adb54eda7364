//! Object storage for job inputs and separated stems.
//!
//! - [`ObjectStore`]: minimal put/get contract over a blob store, with
//!   errors classified so callers know what is worth retrying.
//! - [`S3ObjectStore`]: AWS S3 and S3-compatible stores (Cloudflare R2, MinIO).
//! - [`MemoryObjectStore`]: in-process map for tests and local development.
//! - [`StorageGateway`]: unique key allocation plus bounded
//!   exponential-backoff retries on top of any store.

pub mod error;
pub mod gateway;
pub mod keys;
pub mod memory;
pub mod retry;
pub mod s3;

use async_trait::async_trait;

pub use error::{ObjectStoreError, StorageError};
pub use gateway::StorageGateway;
pub use memory::MemoryObjectStore;
pub use retry::RetryConfig;
pub use s3::{S3Config, S3ObjectStore};

/// A blob store addressed by opaque string keys.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under `key`, overwriting any existing object.
    async fn put_object(&self, key: &str, bytes: Vec<u8>) -> Result<(), ObjectStoreError>;

    /// Fetch the object stored under `key`.
    async fn get_object(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError>;

    /// Short backend label for logs and health output.
    fn backend_name(&self) -> &'static str;
}
