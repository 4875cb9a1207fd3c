use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;

use super::{ArtifactStore, PresignedUrl, StorageKey, StoreError, UrlSigner};

/// In-memory artifact store for tests/dev.
#[derive(Debug)]
pub struct InMemoryArtifactStore {
    blobs: RwLock<HashMap<StorageKey, Bytes>>,
    signer: UrlSigner,
}

impl InMemoryArtifactStore {
    pub fn new(signer: UrlSigner) -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
            signer,
        }
    }

    pub fn len(&self) -> usize {
        self.blobs.read().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<StorageKey> {
        let mut keys: Vec<_> = match self.blobs.read() {
            Ok(b) => b.keys().cloned().collect(),
            Err(_) => vec![],
        };
        keys.sort();
        keys
    }
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("in-memory artifact store lock poisoned".to_string())
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn put(&self, key: &StorageKey, bytes: Bytes) -> Result<(), StoreError> {
        let mut blobs = self.blobs.write().map_err(|_| poisoned())?;
        blobs.insert(key.clone(), bytes);
        Ok(())
    }

    async fn get(&self, key: &StorageKey) -> Result<Option<Bytes>, StoreError> {
        let blobs = self.blobs.read().map_err(|_| poisoned())?;
        Ok(blobs.get(key).cloned())
    }

    async fn presign(&self, key: &StorageKey, ttl: Duration) -> Result<PresignedUrl, StoreError> {
        self.signer.sign(key, ttl, Utc::now())
    }
}
