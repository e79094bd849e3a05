use async_trait::async_trait;
use thiserror::Error;

use crate::scan::{NewScan, ScanRecord};

/// Errors produced by scan store implementations.
///
/// A missing record is not an error: lookups return `None` and deletes return `false`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScanStoreError {
    /// Backend not initialized, or the underlying I/O rejected the operation
    /// (disk, quota, permissions, network transport or status).
    #[error("storage unavailable: {reason}")]
    Unavailable { reason: String },
    /// Caller-supplied scan failed validation; nothing was written.
    #[error("invalid scan: {reason}")]
    InvalidScan { reason: String },
}

impl ScanStoreError {
    pub fn unavailable(reason: impl ToString) -> Self {
        Self::Unavailable {
            reason: reason.to_string(),
        }
    }

    pub fn not_initialized(backend: &str) -> Self {
        Self::Unavailable {
            reason: format!("{backend} store is not initialized"),
        }
    }
}

/// Storage contract for scan history, uniform across key-value, relational and remote backends.
///
/// Callers await each operation before issuing the next. Mutations are durably
/// committed before they return `Ok`.
#[async_trait]
pub trait ScanStore: Send + Sync {
    /// Short backend name used for logging and the CLI.
    fn name(&self) -> &'static str;

    /// Acquire backend resources. Idempotent: calling again after success is a no-op.
    async fn initialize(&self) -> Result<(), ScanStoreError>;

    /// Every stored record, newest `timestamp` first; ties keep insertion order.
    async fn list_all(&self) -> Result<Vec<ScanRecord>, ScanStoreError>;

    /// Persist a scan and return its assigned id.
    async fn add(&self, scan: NewScan) -> Result<i64, ScanStoreError>;

    /// Look up a record; `None` when no record has that id.
    async fn find_by_id(&self, id: i64) -> Result<Option<ScanRecord>, ScanStoreError>;

    /// Remove a record, returning whether one was removed.
    async fn delete_by_id(&self, id: i64) -> Result<bool, ScanStoreError>;
}

#[async_trait]
impl<S: ScanStore + ?Sized> ScanStore for std::sync::Arc<S> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn initialize(&self) -> Result<(), ScanStoreError> {
        (**self).initialize().await
    }

    async fn list_all(&self) -> Result<Vec<ScanRecord>, ScanStoreError> {
        (**self).list_all().await
    }

    async fn add(&self, scan: NewScan) -> Result<i64, ScanStoreError> {
        (**self).add(scan).await
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<ScanRecord>, ScanStoreError> {
        (**self).find_by_id(id).await
    }

    async fn delete_by_id(&self, id: i64) -> Result<bool, ScanStoreError> {
        (**self).delete_by_id(id).await
    }
}
