//! Embedded-relational scan backend on a single SQLite table.

use std::{
    fmt, fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};
use scanlog_core::{
    scan::{NewScan, ScanRecord},
    store::{ScanStore, ScanStoreError},
};
use tracing::{debug, instrument};

const BACKEND: &str = "sqlite";

// AUTOINCREMENT keeps SQLite from handing out the id of a deleted newest row again.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS scans (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    qr_data    TEXT    NOT NULL,
    latitude   REAL,
    longitude  REAL,
    altitude   REAL,
    accuracy   REAL,
    timestamp  INTEGER NOT NULL,
    created_at TEXT    NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);
";

const SELECT_COLUMNS: &str =
    "SELECT id, qr_data, latitude, longitude, altitude, accuracy, timestamp, created_at FROM scans";

/// Where the database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
enum DbLocation {
    File(PathBuf),
    /// Private in-process database, gone when the store is dropped.
    Memory,
}

impl fmt::Display for DbLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbLocation::File(path) => write!(f, "{}", path.display()),
            DbLocation::Memory => f.write_str(":memory:"),
        }
    }
}

/// Scan store on an embedded SQLite database. The connection is opened by
/// `initialize` and released when the store is dropped.
pub struct SqliteScanStore {
    location: DbLocation,
    conn: Mutex<Option<Connection>>,
}

impl SqliteScanStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::with_location(DbLocation::File(path.into()))
    }

    pub fn in_memory() -> Self {
        Self::with_location(DbLocation::Memory)
    }

    fn with_location(location: DbLocation) -> Self {
        Self {
            location,
            conn: Mutex::new(None),
        }
    }

    fn connect(&self) -> Result<Connection, ScanStoreError> {
        let conn = match &self.location {
            DbLocation::File(path) => {
                ensure_parent(path)?;
                Connection::open(path)
            }
            DbLocation::Memory => Connection::open_in_memory(),
        }
        .map_err(ScanStoreError::unavailable)?;

        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })
        .map_err(ScanStoreError::unavailable)?;
        conn.pragma_update(None, "synchronous", "FULL")
            .map_err(ScanStoreError::unavailable)?;
        conn.execute_batch(SCHEMA)
            .map_err(ScanStoreError::unavailable)?;
        Ok(conn)
    }

    /// Run `f` against the open connection.
    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, ScanStoreError> {
        let guard = self
            .conn
            .lock()
            .map_err(|err| ScanStoreError::unavailable(format!("lock poisoned: {err}")))?;
        let conn = guard
            .as_ref()
            .ok_or_else(|| ScanStoreError::not_initialized(BACKEND))?;
        f(conn).map_err(ScanStoreError::unavailable)
    }
}

fn ensure_parent(path: &Path) -> Result<(), ScanStoreError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(ScanStoreError::unavailable)
        }
        _ => Ok(()),
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<ScanRecord> {
    Ok(ScanRecord {
        id: row.get("id")?,
        qr_data: row.get("qr_data")?,
        latitude: row.get("latitude")?,
        longitude: row.get("longitude")?,
        altitude: row.get("altitude")?,
        accuracy: row.get("accuracy")?,
        timestamp: row.get("timestamp")?,
        created_at: row.get("created_at")?,
    })
}

#[async_trait]
impl ScanStore for SqliteScanStore {
    fn name(&self) -> &'static str {
        BACKEND
    }

    #[instrument(skip(self), fields(location = %self.location))]
    async fn initialize(&self) -> Result<(), ScanStoreError> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|err| ScanStoreError::unavailable(format!("lock poisoned: {err}")))?;
        if guard.is_none() {
            *guard = Some(self.connect()?);
            debug!("database opened");
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_all(&self) -> Result<Vec<ScanRecord>, ScanStoreError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY timestamp DESC, id ASC"))?;
            let rows = stmt.query_map([], record_from_row)?;
            rows.collect()
        })
    }

    #[instrument(skip_all, fields(timestamp = scan.timestamp))]
    async fn add(&self, scan: NewScan) -> Result<i64, ScanStoreError> {
        let guard = self
            .conn
            .lock()
            .map_err(|err| ScanStoreError::unavailable(format!("lock poisoned: {err}")))?;
        let conn = guard
            .as_ref()
            .ok_or_else(|| ScanStoreError::not_initialized(BACKEND))?;
        scan.validate()?;

        conn.execute(
            "INSERT INTO scans (qr_data, latitude, longitude, altitude, accuracy, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                scan.qr_data,
                scan.latitude,
                scan.longitude,
                scan.altitude,
                scan.accuracy,
                scan.timestamp
            ],
        )
        .map_err(ScanStoreError::unavailable)?;

        let id = conn.last_insert_rowid();
        debug!(id, "scan stored");
        Ok(id)
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: i64) -> Result<Option<ScanRecord>, ScanStoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                params![id],
                record_from_row,
            )
            .optional()
        })
    }

    #[instrument(skip(self))]
    async fn delete_by_id(&self, id: i64) -> Result<bool, ScanStoreError> {
        let removed =
            self.with_conn(|conn| conn.execute("DELETE FROM scans WHERE id = ?1", params![id]))?;
        if removed > 0 {
            debug!(id, "scan deleted");
        }
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use scanlog_core::conformance;

    use super::*;

    #[tokio::test]
    async fn conforms_on_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut n = 0;
        conformance::run_all(|| {
            n += 1;
            let path = dir.path().join(format!("scans-{n}.sqlite3"));
            async move { SqliteScanStore::open(path) }
        })
        .await;
    }

    #[tokio::test]
    async fn conforms_in_memory() {
        conformance::run_all(|| async { SqliteScanStore::in_memory() }).await;
    }

    #[tokio::test]
    async fn ids_are_not_reused_across_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("data").join("scans.sqlite3");

        let store = SqliteScanStore::open(&path);
        store.initialize().await.expect("init");
        store.add(NewScan::new("a", 1)).await.expect("add");
        let newest = store.add(NewScan::new("b", 2)).await.expect("add");
        assert!(store.delete_by_id(newest).await.expect("delete"));
        drop(store);

        let reopened = SqliteScanStore::open(&path);
        reopened.initialize().await.expect("reinit");
        assert_eq!(reopened.list_all().await.expect("list").len(), 1);
        let next = reopened.add(NewScan::new("c", 3)).await.expect("add");
        assert!(next > newest);
    }

    #[tokio::test]
    async fn created_at_is_engine_defaulted_iso8601() {
        let store = SqliteScanStore::in_memory();
        store.initialize().await.expect("init");
        let id = store.add(NewScan::new("x", 1)).await.expect("add");
        let rec = store.find_by_id(id).await.expect("find").expect("exists");

        assert_eq!(rec.created_at.len(), "2024-01-31T12:00:00.000Z".len());
        assert_eq!(&rec.created_at[10..11], "T");
        assert!(rec.created_at.ends_with('Z'));
    }

    #[tokio::test]
    async fn unopenable_path_is_unavailable() {
        let dir = tempfile::tempdir().expect("tempdir");
        // A directory cannot be opened as a database file.
        let store = SqliteScanStore::open(dir.path());
        let err = store.initialize().await.expect_err("directory path");
        assert!(matches!(err, ScanStoreError::Unavailable { .. }));
    }

    #[test]
    fn location_display() {
        assert_eq!(DbLocation::Memory.to_string(), ":memory:");
        assert_eq!(
            DbLocation::File(PathBuf::from("/tmp/scans.sqlite3")).to_string(),
            "/tmp/scans.sqlite3"
        );
    }
}
