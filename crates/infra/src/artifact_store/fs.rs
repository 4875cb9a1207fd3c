//! Filesystem-backed artifact store.
//!
//! Layout: `{root}/{bucket}/{key}`. Writes go to a uniquely named temp file
//! in the same directory and are then renamed into place, so readers never
//! observe a partially written artifact and concurrent writers of the same key
//! simply race to the last rename.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::{ArtifactStore, PresignedUrl, StorageKey, StoreError, UrlSigner};

#[derive(Debug)]
pub struct FsArtifactStore {
    dir: PathBuf,
    signer: UrlSigner,
}

fn io_err(e: std::io::Error) -> StoreError {
    StoreError::Io(e.to_string())
}

impl FsArtifactStore {
    /// Open (creating if needed) the bucket directory under `root`.
    pub async fn open(
        root: impl AsRef<Path>,
        bucket: &str,
        signer: UrlSigner,
    ) -> Result<Self, StoreError> {
        let dir = root.as_ref().join(bucket);
        fs::create_dir_all(&dir).await.map_err(io_err)?;

        info!(path = %dir.display(), "artifact store initialized");
        Ok(Self { dir, signer })
    }

    fn path_for(&self, key: &StorageKey) -> PathBuf {
        self.dir.join(key.as_str())
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    #[instrument(skip_all, fields(key = %key, size = bytes.len()))]
    async fn put(&self, key: &StorageKey, bytes: Bytes) -> Result<(), StoreError> {
        let path = self.path_for(key);
        let temp_path = self.dir.join(format!(".{}.{}.tmp", key, Uuid::now_v7()));

        let mut file = File::create(&temp_path).await.map_err(io_err)?;
        file.write_all(&bytes).await.map_err(io_err)?;
        file.sync_all().await.map_err(io_err)?;
        drop(file);

        if let Err(e) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(io_err(e));
        }

        debug!("stored artifact");
        Ok(())
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn get(&self, key: &StorageKey) -> Result<Option<Bytes>, StoreError> {
        match fs::read(self.path_for(key)).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(e)),
        }
    }

    async fn presign(&self, key: &StorageKey, ttl: Duration) -> Result<PresignedUrl, StoreError> {
        self.signer.sign(key, ttl, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store(root: &Path) -> FsArtifactStore {
        FsArtifactStore::open(root, "invoices", UrlSigner::new(b"test", "http://localhost"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn put_then_get_returns_exact_bytes() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path()).await;
        let key = StorageKey::parse("INV1.pdf").unwrap();

        store.put(&key, Bytes::from_static(b"%PDF-1.5 body")).await.unwrap();

        assert_eq!(
            store.get(&key).await.unwrap(),
            Some(Bytes::from_static(b"%PDF-1.5 body"))
        );
        assert!(tmp.path().join("invoices").join("INV1.pdf").exists());
    }

    #[tokio::test]
    async fn repeated_put_overwrites_and_leaves_no_temp_files() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path()).await;
        let key = StorageKey::parse("INV1.pdf").unwrap();

        store.put(&key, Bytes::from_static(b"first")).await.unwrap();
        store.put(&key, Bytes::from_static(b"second")).await.unwrap();

        assert_eq!(store.get(&key).await.unwrap(), Some(Bytes::from_static(b"second")));
        let entries = std::fs::read_dir(tmp.path().join("invoices")).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path()).await;
        let key = StorageKey::parse("NOPE.pdf").unwrap();
        assert_eq!(store.get(&key).await.unwrap(), None);
    }
}
