use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use thiserror::Error;

/// Errors produced by blob store implementations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BlobStoreError {
    /// Requested key does not exist.
    #[error("blob not found for key: {key}")]
    NotFound { key: String },
    /// Underlying storage failure.
    #[error("storage failure: {reason}")]
    Storage { reason: String },
}

/// Named byte blobs, the persistence model of browser-style key-value hosts.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Persist a value under a key, overwriting any existing entry.
    /// Must be durable once it returns `Ok`.
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), BlobStoreError>;

    /// Retrieve the value for a key.
    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobStoreError>;
}

/// Process-local blob store for tests and ephemeral sessions.
/// Clones share the same map, so a clone behaves like reopening the same storage.
#[derive(Debug, Default, Clone)]
pub struct InMemoryBlobStore {
    inner: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), BlobStoreError> {
        let mut map = self.inner.lock().map_err(|err| BlobStoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;
        map.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobStoreError> {
        let map = self.inner.lock().map_err(|err| BlobStoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;
        map.get(key)
            .cloned()
            .ok_or_else(|| BlobStoreError::NotFound {
                key: key.to_string(),
            })
    }
}
