//! Key-value scan backend: the whole history lives in memory and is mirrored
//! to a single blob on every mutation.

use std::sync::Arc;

use async_trait::async_trait;
use scanlog_core::{
    blob::{BlobStore, BlobStoreError},
    scan::{created_at_now, sort_newest_first, NewScan, ScanRecord},
    store::{ScanStore, ScanStoreError},
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

/// Blob key holding the serialized history.
pub const SCANS_KEY: &str = "scans";

const BACKEND: &str = "key-value";

/// Persisted layout: `{ "scans": [...], "nextId": n }`, overwritten wholesale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct PersistedScans {
    scans: Vec<ScanRecord>,
    #[serde(rename = "nextId")]
    next_id: i64,
}

impl PersistedScans {
    fn empty() -> Self {
        Self {
            scans: Vec::new(),
            next_id: 1,
        }
    }

    /// Raise a counter that lags behind stored ids so none is issued twice.
    fn repair_counter(&mut self) -> Result<(), ScanStoreError> {
        let highest = self.scans.iter().map(|s| s.id).max().unwrap_or(0);
        let floor = successor(highest)?;
        if self.next_id < floor {
            warn!(
                stored = self.next_id,
                repaired = floor,
                "persisted id counter behind stored records"
            );
            self.next_id = floor;
        }
        Ok(())
    }
}

fn successor(id: i64) -> Result<i64, ScanStoreError> {
    id.checked_add(1)
        .ok_or_else(|| ScanStoreError::unavailable("id space exhausted"))
}

/// Scan store backed by a `BlobStore` (browser-style key-value persistence).
pub struct KeyValueScanStore<B: BlobStore> {
    blobs: Arc<B>,
    state: Mutex<Option<PersistedScans>>,
}

impl<B: BlobStore> KeyValueScanStore<B> {
    pub fn new(blobs: B) -> Self {
        Self {
            blobs: Arc::new(blobs),
            state: Mutex::new(None),
        }
    }

    async fn load(&self) -> Result<PersistedScans, ScanStoreError> {
        let bytes = match self.blobs.get(SCANS_KEY).await {
            Ok(bytes) => bytes,
            Err(BlobStoreError::NotFound { .. }) => {
                debug!("no persisted scans, starting empty");
                return Ok(PersistedScans::empty());
            }
            Err(err) => return Err(ScanStoreError::unavailable(err)),
        };

        let mut state: PersistedScans = serde_json::from_slice(&bytes).map_err(|e| {
            ScanStoreError::unavailable(format!("persisted scans are unreadable: {e}"))
        })?;
        state.repair_counter()?;
        debug!(count = state.scans.len(), next_id = state.next_id, "loaded scans");
        Ok(state)
    }

    async fn save(&self, state: &PersistedScans) -> Result<(), ScanStoreError> {
        let bytes = serde_json::to_vec(state).map_err(ScanStoreError::unavailable)?;
        self.blobs
            .put(SCANS_KEY, &bytes)
            .await
            .map_err(ScanStoreError::unavailable)
    }
}

#[async_trait]
impl<B: BlobStore> ScanStore for KeyValueScanStore<B> {
    fn name(&self) -> &'static str {
        BACKEND
    }

    #[instrument(skip(self))]
    async fn initialize(&self) -> Result<(), ScanStoreError> {
        let mut guard = self.state.lock().await;
        if guard.is_none() {
            *guard = Some(self.load().await?);
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_all(&self) -> Result<Vec<ScanRecord>, ScanStoreError> {
        let guard = self.state.lock().await;
        let state = guard
            .as_ref()
            .ok_or_else(|| ScanStoreError::not_initialized(BACKEND))?;

        let mut scans = state.scans.clone();
        sort_newest_first(&mut scans);
        Ok(scans)
    }

    #[instrument(skip_all, fields(timestamp = scan.timestamp))]
    async fn add(&self, scan: NewScan) -> Result<i64, ScanStoreError> {
        let mut guard = self.state.lock().await;
        let state = guard
            .as_mut()
            .ok_or_else(|| ScanStoreError::not_initialized(BACKEND))?;
        scan.validate()?;

        // Mutate a copy and only adopt it once the blob write succeeds.
        let mut next = state.clone();
        let id = next.next_id;
        next.scans.push(scan.into_record(id, created_at_now()));
        next.next_id = successor(id)?;

        self.save(&next).await?;
        *state = next;
        debug!(id, "scan stored");
        Ok(id)
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: i64) -> Result<Option<ScanRecord>, ScanStoreError> {
        let guard = self.state.lock().await;
        let state = guard
            .as_ref()
            .ok_or_else(|| ScanStoreError::not_initialized(BACKEND))?;
        Ok(state.scans.iter().find(|s| s.id == id).cloned())
    }

    #[instrument(skip(self))]
    async fn delete_by_id(&self, id: i64) -> Result<bool, ScanStoreError> {
        let mut guard = self.state.lock().await;
        let state = guard
            .as_mut()
            .ok_or_else(|| ScanStoreError::not_initialized(BACKEND))?;

        let Some(index) = state.scans.iter().position(|s| s.id == id) else {
            return Ok(false);
        };

        let mut next = state.clone();
        next.scans.remove(index);
        self.save(&next).await?;
        *state = next;
        debug!(id, "scan deleted");
        Ok(true)
    }
}
