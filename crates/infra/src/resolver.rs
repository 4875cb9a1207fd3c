//! Download path: invoice id to a short-lived artifact URL.

use std::time::Duration;

use thiserror::Error;
use tracing::{error, instrument};

use invoicer_core::InvoiceId;

use crate::artifact_store::{ArtifactStore, DEFAULT_PRESIGN_TTL, PresignedUrl};
use crate::pointer_index::{Lookup, PointerIndex};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no document recorded for invoice {0}")]
    NotFound(InvoiceId),

    /// Details are logged where the failure happens; callers only see this.
    #[error("internal error")]
    Internal,
}

pub struct Resolver<P, A> {
    pointers: P,
    artifacts: A,
    ttl: Duration,
}

impl<P, A> Resolver<P, A>
where
    P: PointerIndex,
    A: ArtifactStore,
{
    pub fn new(pointers: P, artifacts: A) -> Self {
        Self {
            pointers,
            artifacts,
            ttl: DEFAULT_PRESIGN_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    #[instrument(skip_all, fields(invoice_id = %invoice_id))]
    pub async fn resolve(&self, invoice_id: &InvoiceId) -> Result<PresignedUrl, ResolveError> {
        let key = match self.pointers.get(invoice_id).await {
            Ok(Lookup::Found(key)) => key,
            Ok(Lookup::NotFound) => return Err(ResolveError::NotFound(invoice_id.clone())),
            Err(e) => {
                error!(error = %e, "pointer lookup failed");
                return Err(ResolveError::Internal);
            }
        };

        self.artifacts.presign(&key, self.ttl).await.map_err(|e| {
            error!(key = %key, error = %e, "presign failed");
            ResolveError::Internal
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use bytes::Bytes;
    use chrono::Utc;

    use super::*;
    use crate::artifact_store::{InMemoryArtifactStore, StorageKey, UrlSigner};
    use crate::pointer_index::{ArtifactPointer, IndexError, InMemoryPointerIndex};

    fn signer() -> UrlSigner {
        UrlSigner::new(b"resolver-test", "http://localhost:8080")
    }

    struct BrokenIndex;

    #[async_trait]
    impl PointerIndex for BrokenIndex {
        async fn put(&self, _: &ArtifactPointer) -> Result<(), IndexError> {
            Ok(())
        }

        async fn get(&self, _: &InvoiceId) -> Result<Lookup<StorageKey>, IndexError> {
            Err(IndexError::Unavailable("connection refused by 10.0.0.7".to_string()))
        }
    }

    #[tokio::test]
    async fn unknown_invoice_is_not_found() {
        let resolver = Resolver::new(InMemoryPointerIndex::new(), InMemoryArtifactStore::new(signer()));
        let err = resolver.resolve(&InvoiceId::new("MISSING").unwrap()).await.unwrap_err();
        assert!(matches!(err, ResolveError::NotFound(id) if id.as_str() == "MISSING"));
    }

    #[tokio::test]
    async fn resolved_url_verifies_for_the_stored_key() {
        let pointers = Arc::new(InMemoryPointerIndex::new());
        let store = Arc::new(InMemoryArtifactStore::new(signer()));
        let id = InvoiceId::new("INV1").unwrap();
        let key = StorageKey::for_invoice(&id);

        store.put(&key, Bytes::from_static(b"%PDF")).await.unwrap();
        pointers.put(&ArtifactPointer::new(id.clone(), key.clone())).await.unwrap();

        let resolver = Resolver::new(pointers, store);
        let before = Utc::now();
        let presigned = resolver.resolve(&id).await.unwrap();

        assert!(presigned.url.starts_with("http://localhost:8080/artifacts/INV1.pdf?"));
        let lifetime = presigned.expires_at - before;
        assert!(lifetime <= chrono::Duration::seconds(901));
        assert!(lifetime >= chrono::Duration::seconds(898));
    }

    #[tokio::test]
    async fn dependency_errors_are_opaque() {
        let resolver = Resolver::new(BrokenIndex, InMemoryArtifactStore::new(signer()));
        let err = resolver.resolve(&InvoiceId::new("INV1").unwrap()).await.unwrap_err();
        assert!(matches!(err, ResolveError::Internal));
        assert!(!err.to_string().contains("10.0.0.7"));
    }
}
