//! In-process object store.
//!
//! Used by tests and by the `memory` storage backend for local development.
//! Supports fault injection so callers can exercise retry and failure paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::ObjectStoreError;
use crate::ObjectStore;

/// Blob store backed by a `HashMap`.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
    /// Remaining calls (put or get) that fail transiently.
    transient_failures: AtomicU32,
    /// Puts to keys under any of these prefixes fail transiently, forever.
    failing_prefixes: RwLock<Vec<String>>,
    denied: AtomicBool,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` calls fail with a transient error.
    pub fn fail_next(&self, count: u32) {
        self.transient_failures.store(count, Ordering::SeqCst);
    }

    /// Make every put under `prefix` fail with a transient error.
    pub async fn fail_puts_under(&self, prefix: impl Into<String>) {
        self.failing_prefixes.write().await.push(prefix.into());
    }

    /// Reject every call as unauthorized.
    pub fn deny_all(&self, denied: bool) {
        self.denied.store(denied, Ordering::SeqCst);
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    /// All stored keys, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    async fn injected_failure(&self) -> Option<ObjectStoreError> {
        if self.denied.load(Ordering::SeqCst) {
            return Some(ObjectStoreError::Denied("memory store denies access".into()));
        }
        let consumed = self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        consumed.then(|| ObjectStoreError::Transient("injected transient failure".into()))
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_object(&self, key: &str, bytes: Vec<u8>) -> Result<(), ObjectStoreError> {
        if let Some(err) = self.injected_failure().await {
            return Err(err);
        }
        if self
            .failing_prefixes
            .read()
            .await
            .iter()
            .any(|p| key.starts_with(p.as_str()))
        {
            return Err(ObjectStoreError::Transient(format!(
                "injected write failure for {key}"
            )));
        }
        self.objects.write().await.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        if let Some(err) = self.injected_failure().await {
            return Err(err);
        }
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| ObjectStoreError::NotFound(key.to_string()))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
