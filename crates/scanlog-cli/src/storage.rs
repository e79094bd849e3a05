use std::{path::PathBuf, sync::Arc};

use color_eyre::Result;
use dirs::data_dir;
use scanlog_core::store::ScanStore;
use scanlog_kv::KeyValueScanStore;
use scanlog_remote::RemoteScanStore;
use scanlog_sqlite::SqliteScanStore;
use scanlog_storage::{file_blob_store::FileBlobStore, key_provider::KeyringProvider};
use tracing::{debug, info};

use crate::config::{BackendKind, Config};

const SQLITE_FILE: &str = "scans.sqlite3";
const BLOB_DIR: &str = "blobs";

/// Resolve the default data directory for scanlog.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| color_eyre::eyre::eyre!("no data dir available"))?;
    Ok(base.join("scanlog"))
}

/// Data directory from config, falling back to the platform default.
pub fn resolve_data_dir(config: &Config) -> Result<PathBuf> {
    match &config.data_dir {
        Some(dir) => Ok(dir.clone()),
        None => default_data_dir(),
    }
}

/// Backend this host uses when none is configured.
pub fn host_default() -> BackendKind {
    if cfg!(target_arch = "wasm32") {
        BackendKind::KeyValue
    } else {
        BackendKind::Sqlite
    }
}

/// Turn `auto` into a concrete backend.
pub fn resolve_kind(requested: BackendKind) -> BackendKind {
    match requested {
        BackendKind::Auto => host_default(),
        kind => kind,
    }
}

/// Construct the store for `kind`, resolving `auto` by host. The store is not initialized yet.
pub fn build_store(kind: BackendKind, config: &Config) -> Result<Arc<dyn ScanStore>> {
    let store: Arc<dyn ScanStore> = match kind {
        BackendKind::Auto => return build_store(resolve_kind(kind), config),
        BackendKind::KeyValue => {
            let root = resolve_data_dir(config)?.join(BLOB_DIR);
            debug!(?root, encrypted = config.encrypt_at_rest, "key-value store");
            let blobs = if config.encrypt_at_rest {
                FileBlobStore::encrypted(root, KeyringProvider::default())
            } else {
                FileBlobStore::plain(root)
            };
            Arc::new(KeyValueScanStore::new(blobs))
        }
        BackendKind::Sqlite => {
            let path = resolve_data_dir(config)?.join(SQLITE_FILE);
            debug!(?path, "sqlite store");
            Arc::new(SqliteScanStore::open(path))
        }
        BackendKind::Remote => {
            let remote = config.remote.clone().ok_or_else(|| {
                color_eyre::eyre::eyre!("remote backend selected but [remote] is not configured")
            })?;
            debug!(base_url = %remote.base_url, "remote store");
            Arc::new(RemoteScanStore::new(remote))
        }
    };
    Ok(store)
}

/// Select, build and initialize the store for this process.
pub async fn open_store(requested: BackendKind, config: &Config) -> Result<Arc<dyn ScanStore>> {
    let store = build_store(requested, config)?;
    info!(backend = store.name(), "opening scan store");
    store.initialize().await?;
    Ok(store)
}

#[cfg(test)]
mod tests {
    use scanlog_core::scan::NewScan;
    use scanlog_remote::RemoteConfig;

    use super::*;

    fn config_in(dir: &std::path::Path) -> Config {
        Config {
            data_dir: Some(dir.to_path_buf()),
            ..Config::default()
        }
    }

    #[test]
    fn auto_resolves_to_sqlite_on_native_hosts() {
        assert_eq!(resolve_kind(BackendKind::Auto), BackendKind::Sqlite);
        assert_eq!(resolve_kind(BackendKind::KeyValue), BackendKind::KeyValue);
    }

    #[test]
    fn builds_each_backend() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cfg = config_in(dir.path());
        cfg.remote = Some(RemoteConfig {
            base_url: "http://127.0.0.1:9".into(),
            token: None,
            timeout_secs: None,
        });

        let names: Vec<&str> = [
            BackendKind::Auto,
            BackendKind::KeyValue,
            BackendKind::Sqlite,
            BackendKind::Remote,
        ]
        .into_iter()
        .map(|kind| build_store(kind, &cfg).expect("build").name())
        .collect();
        assert_eq!(names, vec!["sqlite", "key-value", "sqlite", "remote"]);
    }

    #[test]
    fn remote_requires_configuration() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(build_store(BackendKind::Remote, &config_in(dir.path())).is_err());
    }

    #[tokio::test]
    async fn local_backends_write_under_data_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = config_in(dir.path());

        for kind in [BackendKind::KeyValue, BackendKind::Sqlite] {
            let store = open_store(kind, &cfg).await.expect("open");
            store.add(NewScan::new("hello", 1)).await.expect("add");
        }

        assert!(dir.path().join(SQLITE_FILE).exists());
        assert!(dir.path().join(BLOB_DIR).is_dir());
    }
}
