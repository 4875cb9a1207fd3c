use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use invoicer_core::InvoiceId;

use super::{ArtifactPointer, IndexError, Lookup, PointerIndex};
use crate::artifact_store::StorageKey;

/// In-memory pointer index for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryPointerIndex {
    inner: RwLock<HashMap<InvoiceId, StorageKey>>,
}

impl InMemoryPointerIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> IndexError {
    IndexError::Unavailable("in-memory pointer index lock poisoned".to_string())
}

#[async_trait]
impl PointerIndex for InMemoryPointerIndex {
    async fn put(&self, pointer: &ArtifactPointer) -> Result<(), IndexError> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        map.insert(pointer.invoice_id.clone(), pointer.storage_key.clone());
        Ok(())
    }

    async fn get(&self, invoice_id: &InvoiceId) -> Result<Lookup<StorageKey>, IndexError> {
        let map = self.inner.read().map_err(|_| poisoned())?;
        Ok(map.get(invoice_id).cloned().into())
    }
}
