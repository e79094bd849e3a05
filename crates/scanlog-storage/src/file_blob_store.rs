use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use scanlog_core::blob::{BlobStore, BlobStoreError};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::instrument;

use crate::key_provider::{KeyMaterial, KeyProvider};

const PLAIN_EXT: &str = "blob";
const SEALED_EXT: &str = "sealed";

/// One file per key under `root`, replaced atomically on every write.
///
/// Plain and encrypted stores use different file extensions, so switching
/// modes never feeds ciphertext to a reader expecting plaintext.
pub struct FileBlobStore {
    root: PathBuf,
    keys: Option<Arc<dyn KeyProvider>>,
}

impl FileBlobStore {
    /// Store blobs as raw bytes.
    pub fn plain(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            keys: None,
        }
    }

    /// Seal blobs with AES-256-GCM using a key from `key_provider`.
    pub fn encrypted<P: KeyProvider + 'static>(root: impl Into<PathBuf>, key_provider: P) -> Self {
        Self {
            root: root.into(),
            keys: Some(Arc::new(key_provider)),
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.keys.is_some()
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let ext = if self.is_encrypted() {
            SEALED_EXT
        } else {
            PLAIN_EXT
        };
        self.root.join(format!("{}.{ext}", URL_SAFE_NO_PAD.encode(key)))
    }

    async fn cipher(&self, provider: &Arc<dyn KeyProvider>) -> Result<Aes256Gcm, BlobStoreError> {
        let material = provider
            .get_or_create()
            .await
            .map_err(|e| BlobStoreError::Storage {
                reason: format!("key provider: {e}"),
            })?;
        build_cipher(&material)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SealedBlob {
    nonce: String,
    ciphertext: String,
}

#[async_trait]
impl BlobStore for FileBlobStore {
    #[instrument(skip_all, fields(key = %key, encrypted = self.is_encrypted()))]
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), BlobStoreError> {
        let bytes = match &self.keys {
            None => value.to_vec(),
            Some(provider) => {
                let cipher = self.cipher(provider).await?;
                let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
                let ciphertext =
                    cipher
                        .encrypt(&nonce, value)
                        .map_err(|e| BlobStoreError::Storage {
                            reason: format!("encrypt failed: {e}"),
                        })?;
                let sealed = SealedBlob {
                    nonce: URL_SAFE_NO_PAD.encode(nonce.as_slice()),
                    ciphertext: URL_SAFE_NO_PAD.encode(ciphertext),
                };
                serde_json::to_vec(&sealed).map_err(storage_err)?
            }
        };

        write_atomic(&self.path_for(key), &bytes)
    }

    #[instrument(skip_all, fields(key = %key, encrypted = self.is_encrypted()))]
    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobStoreError> {
        let path = self.path_for(key);
        let raw = fs::read(&path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                BlobStoreError::NotFound {
                    key: key.to_string(),
                }
            } else {
                storage_err(err)
            }
        })?;

        let Some(provider) = &self.keys else {
            return Ok(raw);
        };

        let sealed: SealedBlob = serde_json::from_slice(&raw).map_err(storage_err)?;
        let nonce_bytes = URL_SAFE_NO_PAD
            .decode(sealed.nonce)
            .map_err(|e| BlobStoreError::Storage {
                reason: format!("nonce decode failed: {e}"),
            })?;
        if nonce_bytes.len() != 12 {
            return Err(BlobStoreError::Storage {
                reason: format!("nonce must be 12 bytes, got {}", nonce_bytes.len()),
            });
        }
        let ciphertext =
            URL_SAFE_NO_PAD
                .decode(sealed.ciphertext)
                .map_err(|e| BlobStoreError::Storage {
                    reason: format!("ciphertext decode failed: {e}"),
                })?;

        let cipher = self.cipher(provider).await?;
        cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|e| BlobStoreError::Storage {
                reason: format!("decrypt failed: {e}"),
            })
    }
}

/// Write to a sibling temp file, fsync it, then rename over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), BlobStoreError> {
    let parent = path.parent().ok_or_else(|| BlobStoreError::Storage {
        reason: "invalid storage path".to_string(),
    })?;
    fs::create_dir_all(parent).map_err(storage_err)?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(storage_err)?;
    tmp.write_all(bytes).map_err(storage_err)?;
    tmp.flush().map_err(storage_err)?;
    tmp.as_file().sync_all().map_err(storage_err)?;
    tmp.persist(path).map_err(|e| storage_err(e.error))?;
    Ok(())
}

fn build_cipher(material: &KeyMaterial) -> Result<Aes256Gcm, BlobStoreError> {
    Aes256Gcm::new_from_slice(&material.bytes).map_err(|e| BlobStoreError::Storage {
        reason: format!("cipher init failed: {e}"),
    })
}

fn storage_err<E: ToString>(err: E) -> BlobStoreError {
    BlobStoreError::Storage {
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_provider::InMemoryKeyProvider;

    #[tokio::test]
    async fn plain_round_trip_writes_raw_bytes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileBlobStore::plain(dir.path());

        store.put("scans", b"{\"scans\":[]}").await.expect("put");
        assert_eq!(store.get("scans").await.expect("get"), b"{\"scans\":[]}");

        let on_disk = fs::read(store.path_for("scans")).expect("read file");
        assert_eq!(on_disk, b"{\"scans\":[]}");
    }

    #[tokio::test]
    async fn encrypted_round_trip_hides_plaintext() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileBlobStore::encrypted(dir.path(), InMemoryKeyProvider::default());

        let value = b"https://example.com/secret-menu";
        store.put("scans", value).await.expect("put");
        assert_eq!(store.get("scans").await.expect("get"), value);

        let stored = fs::read_to_string(store.path_for("scans")).expect("read ciphertext");
        assert!(
            !stored.contains("secret-menu"),
            "plaintext must not be stored"
        );
    }

    #[tokio::test]
    async fn encrypted_store_reopens_with_same_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        let keys = InMemoryKeyProvider::default();
        FileBlobStore::encrypted(dir.path(), keys.clone())
            .put("scans", b"persisted")
            .await
            .expect("put");

        let reopened = FileBlobStore::encrypted(dir.path(), keys);
        assert_eq!(reopened.get("scans").await.expect("get"), b"persisted");
    }

    #[tokio::test]
    async fn wrong_key_fails_to_decrypt() {
        let dir = tempfile::tempdir().expect("tempdir");
        FileBlobStore::encrypted(dir.path(), InMemoryKeyProvider::default())
            .put("scans", b"persisted")
            .await
            .expect("put");

        let other = FileBlobStore::encrypted(dir.path(), InMemoryKeyProvider::default());
        let err = other.get("scans").await.expect_err("foreign key");
        assert!(matches!(err, BlobStoreError::Storage { .. }));
    }

    #[tokio::test]
    async fn overwrite_replaces_previous_value() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileBlobStore::plain(dir.path().join("nested"));
        store.put("k", b"first").await.expect("put");
        store.put("k", b"second").await.expect("put again");
        assert_eq!(store.get("k").await.expect("get"), b"second");

        let leftovers = fs::read_dir(dir.path().join("nested"))
            .expect("read dir")
            .count();
        assert_eq!(leftovers, 1, "temp files must not be left behind");
    }

    #[tokio::test]
    async fn missing_key_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileBlobStore::plain(dir.path());

        let err = store.get("absent").await.expect_err("missing");
        assert!(matches!(err, BlobStoreError::NotFound { .. }));

        // A sealed store never reads plain files written under the same root.
        store.put("k", b"v").await.expect("put");
        let sealed = FileBlobStore::encrypted(dir.path(), InMemoryKeyProvider::default());
        assert!(matches!(
            sealed.get("k").await,
            Err(BlobStoreError::NotFound { .. })
        ));
    }
}
