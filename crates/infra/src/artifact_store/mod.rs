//! Artifact store boundary: durable blob storage for rendered documents.
//!
//! Writes are idempotent overwrites by key, so redelivered change events can
//! re-run the persist step safely. Presigning never touches the blob.

pub mod fs;
pub mod in_memory;
pub mod signer;

pub use fs::FsArtifactStore;
pub use in_memory::InMemoryArtifactStore;
pub use signer::{PresignedUrl, SignatureError, UrlSigner};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

use invoicer_core::InvoiceId;

/// Presigned URLs stay valid for 15 minutes unless configured otherwise.
pub const DEFAULT_PRESIGN_TTL: Duration = Duration::from_secs(15 * 60);

/// Key of a stored artifact.
///
/// Restricted to `[A-Za-z0-9._-]` and never starting with `.`, so a key is
/// always a plain file name and a single URL path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct StorageKey(String);

impl StorageKey {
    /// Deterministic key of an invoice's document: `"{InvoiceID}.pdf"`.
    ///
    /// Invoice ids share the key alphabet, so this never fails.
    pub fn for_invoice(invoice_id: &InvoiceId) -> Self {
        Self(format!("{invoice_id}.pdf"))
    }

    pub fn parse(raw: impl Into<String>) -> Result<Self, StoreError> {
        let raw = raw.into();
        let valid = !raw.is_empty()
            && raw.len() <= 255
            && !raw.starts_with('.')
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
        if valid {
            Ok(Self(raw))
        } else {
            Err(StoreError::InvalidKey(raw))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for StorageKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid storage key {0:?}")]
    InvalidKey(String),

    #[error("artifact store unavailable: {0}")]
    Unavailable(String),

    #[error("artifact store io error: {0}")]
    Io(String),

    #[error("failed to presign {key}: {reason}")]
    Presign { key: String, reason: String },
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store `bytes` under `key`, replacing any previous artifact.
    async fn put(&self, key: &StorageKey, bytes: Bytes) -> Result<(), StoreError>;

    /// Read an artifact back; `None` when nothing is stored under `key`.
    async fn get(&self, key: &StorageKey) -> Result<Option<Bytes>, StoreError>;

    /// Mint a URL granting read access to `key` until `ttl` elapses.
    async fn presign(&self, key: &StorageKey, ttl: Duration) -> Result<PresignedUrl, StoreError>;
}

#[async_trait]
impl<S> ArtifactStore for Arc<S>
where
    S: ArtifactStore + ?Sized,
{
    async fn put(&self, key: &StorageKey, bytes: Bytes) -> Result<(), StoreError> {
        (**self).put(key, bytes).await
    }

    async fn get(&self, key: &StorageKey) -> Result<Option<Bytes>, StoreError> {
        (**self).get(key).await
    }

    async fn presign(&self, key: &StorageKey, ttl: Duration) -> Result<PresignedUrl, StoreError> {
        (**self).presign(key, ttl).await
    }
}
