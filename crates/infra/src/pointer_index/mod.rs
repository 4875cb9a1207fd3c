//! Pointer index: durable `InvoiceID -> StorageKey` mapping, plus the
//! customer secondary index that serves the list path.

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use in_memory::InMemoryPointerIndex;
#[cfg(feature = "postgres")]
pub use postgres::PostgresPointerIndex;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use invoicer_core::{CustomerId, InvoiceId};
use invoicer_invoicing::Invoice;

use crate::artifact_store::StorageKey;

/// Where the rendered document of an invoice lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactPointer {
    pub invoice_id: InvoiceId,
    pub storage_key: StorageKey,
}

impl ArtifactPointer {
    pub fn new(invoice_id: InvoiceId, storage_key: StorageKey) -> Self {
        Self {
            invoice_id,
            storage_key,
        }
    }
}

/// Outcome of a keyed lookup. Absence is an expected answer, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
}

impl<T> Lookup<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Found(v) => Some(v),
            Self::NotFound => None,
        }
    }
}

impl<T> From<Option<T>> for Lookup<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::NotFound, Self::Found)
    }
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index unavailable: {0}")]
    Unavailable(String),

    #[error("index holds a malformed record: {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait PointerIndex: Send + Sync {
    /// Record (or replace) the pointer for an invoice. Last write wins.
    async fn put(&self, pointer: &ArtifactPointer) -> Result<(), IndexError>;

    async fn get(&self, invoice_id: &InvoiceId) -> Result<Lookup<StorageKey>, IndexError>;
}

/// Secondary index over invoices keyed by customer.
#[async_trait]
pub trait CustomerIndex: Send + Sync {
    /// All invoices of a customer, in no particular order.
    async fn query_by_customer(&self, customer_id: &CustomerId) -> Result<Vec<Invoice>, IndexError>;
}

#[async_trait]
impl<P> PointerIndex for Arc<P>
where
    P: PointerIndex + ?Sized,
{
    async fn put(&self, pointer: &ArtifactPointer) -> Result<(), IndexError> {
        (**self).put(pointer).await
    }

    async fn get(&self, invoice_id: &InvoiceId) -> Result<Lookup<StorageKey>, IndexError> {
        (**self).get(invoice_id).await
    }
}

#[async_trait]
impl<C> CustomerIndex for Arc<C>
where
    C: CustomerIndex + ?Sized,
{
    async fn query_by_customer(&self, customer_id: &CustomerId) -> Result<Vec<Invoice>, IndexError> {
        (**self).query_by_customer(customer_id).await
    }
}
