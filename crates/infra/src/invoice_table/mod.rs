//! Invoice table: the source-of-truth store written by the insert endpoint.
//!
//! Every committed insert is published on the change feed (see
//! [`PublishingInvoiceTable`]); the table also carries the customer
//! secondary index used by the list path.

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use in_memory::InMemoryInvoiceTable;
#[cfg(feature = "postgres")]
pub use postgres::PostgresInvoiceTable;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use invoicer_core::{CustomerId, InvoiceId};
use invoicer_events::{ChangeEvent, ChangeFeed, Image};
use invoicer_invoicing::{Invoice, attributes};

use crate::pointer_index::{CustomerIndex, IndexError};

#[derive(Debug, Error)]
pub enum TableError {
    #[error("invoice {0} already exists")]
    Conflict(InvoiceId),

    #[error("invoice table unavailable: {0}")]
    Unavailable(String),

    #[error("invoice table holds a malformed record: {0}")]
    Corrupt(String),

    /// The row is committed but its change event could not be published.
    #[error("change feed publish failed: {0}")]
    Publish(String),
}

/// Definition of the secondary index that serves `query_by_customer`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecondaryIndex {
    pub name: String,
    /// Attribute the index is keyed on.
    pub hash_key: String,
}

impl SecondaryIndex {
    pub fn new(name: impl Into<String>, hash_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hash_key: hash_key.into(),
        }
    }

    /// Value of the index key in `image`, if it is a string attribute.
    pub fn key_of<'a>(&self, image: &'a Image) -> Option<&'a str> {
        image.get(&self.hash_key).and_then(|v| v.as_str())
    }
}

impl Default for SecondaryIndex {
    fn default() -> Self {
        Self::new("CustomerIndex", attributes::CUSTOMER_ID)
    }
}

#[async_trait]
pub trait InvoiceTable: Send + Sync {
    /// Insert a new invoice and return the committed record image.
    ///
    /// Fails with [`TableError::Conflict`] when the id is already taken.
    async fn insert(&self, invoice: &Invoice) -> Result<Image, TableError>;

    async fn get(&self, invoice_id: &InvoiceId) -> Result<Option<Invoice>, TableError>;
}

#[async_trait]
impl<T> InvoiceTable for Arc<T>
where
    T: InvoiceTable + ?Sized,
{
    async fn insert(&self, invoice: &Invoice) -> Result<Image, TableError> {
        (**self).insert(invoice).await
    }

    async fn get(&self, invoice_id: &InvoiceId) -> Result<Option<Invoice>, TableError> {
        (**self).get(invoice_id).await
    }
}

/// Adapter that publishes an `INSERT` change event after each committed write.
///
/// Publication happens strictly after the insert succeeded, so consumers never
/// see an event for a record that is not durable.
///
/// Re-inserting a record identical to the stored one succeeds and publishes
/// its `INSERT` event again; this is how a client recovers from a publish
/// failure after commit. A different payload under a taken id stays a
/// [`TableError::Conflict`].
pub struct PublishingInvoiceTable<T, F> {
    table: T,
    feed: F,
}

impl<T, F> PublishingInvoiceTable<T, F> {
    pub fn new(table: T, feed: F) -> Self {
        Self { table, feed }
    }

    pub fn into_parts(self) -> (T, F) {
        (self.table, self.feed)
    }
}

#[async_trait]
impl<T, F> InvoiceTable for PublishingInvoiceTable<T, F>
where
    T: InvoiceTable,
    F: ChangeFeed,
{
    async fn insert(&self, invoice: &Invoice) -> Result<Image, TableError> {
        let image = match self.table.insert(invoice).await {
            Ok(image) => image,
            Err(TableError::Conflict(id)) => match self.table.get(&id).await? {
                Some(stored) if stored == *invoice => {
                    debug!(invoice_id = %id, "identical re-insert; publishing again");
                    stored.to_image()
                }
                _ => return Err(TableError::Conflict(id)),
            },
            Err(err) => return Err(err),
        };

        let sequence = self
            .feed
            .publish(ChangeEvent::insert(image.clone()))
            .map_err(|err| TableError::Publish(err.to_string()))?;
        debug!(invoice_id = %invoice.invoice_id, sequence, "published insert event");

        Ok(image)
    }

    async fn get(&self, invoice_id: &InvoiceId) -> Result<Option<Invoice>, TableError> {
        self.table.get(invoice_id).await
    }
}

#[async_trait]
impl<T, F> CustomerIndex for PublishingInvoiceTable<T, F>
where
    T: CustomerIndex,
    F: Send + Sync,
{
    async fn query_by_customer(&self, customer_id: &CustomerId) -> Result<Vec<Invoice>, IndexError> {
        self.table.query_by_customer(customer_id).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use invoicer_core::Amount;
    use invoicer_events::{ChangeKind, InMemoryChangeFeed, Subscription};

    use super::*;

    fn invoice(id: &str, customer: &str) -> Invoice {
        Invoice {
            invoice_id: InvoiceId::new(id).unwrap(),
            customer_id: CustomerId::new(customer).unwrap(),
            invoice_date: "2023-09-26".to_string(),
            product_list: vec!["Item1".to_string()],
            total_amount: Amount::from_minor_units(42),
        }
    }

    #[tokio::test]
    async fn committed_insert_is_published() {
        let feed = Arc::new(InMemoryChangeFeed::new());
        let sub = feed.subscribe();
        let table = PublishingInvoiceTable::new(InMemoryInvoiceTable::default(), feed.clone());

        let image = table.insert(&invoice("INV1", "CUST1")).await.unwrap();

        let event = sub.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(event.kind(), ChangeKind::Insert);
        assert_eq!(event.new_image(), Some(&image));
        assert_eq!(event.sequence_number(), 1);
    }

    #[tokio::test]
    async fn rejected_insert_publishes_nothing() {
        let feed = Arc::new(InMemoryChangeFeed::new());
        let sub = feed.subscribe();
        let table = PublishingInvoiceTable::new(InMemoryInvoiceTable::default(), feed.clone());

        table.insert(&invoice("INV1", "CUST1")).await.unwrap();
        let err = table.insert(&invoice("INV1", "CUST2")).await.unwrap_err();
        assert!(matches!(err, TableError::Conflict(_)));

        assert!(sub.recv_timeout(Duration::from_millis(50)).is_ok());
        assert!(sub.recv_timeout(Duration::from_millis(50)).is_err());
    }

    /// Fails its first `publish`, then forwards to the inner feed.
    struct FlakyFeed {
        inner: InMemoryChangeFeed,
        failed_once: AtomicBool,
    }

    impl ChangeFeed for FlakyFeed {
        type Error = String;

        fn publish(&self, event: ChangeEvent) -> Result<u64, Self::Error> {
            if !self.failed_once.swap(true, Ordering::SeqCst) {
                return Err("feed down".to_string());
            }
            self.inner.publish(event).map_err(|e| e.to_string())
        }

        fn subscribe(&self) -> Subscription {
            self.inner.subscribe()
        }
    }

    #[tokio::test]
    async fn identical_reinsert_recovers_from_failed_publish() {
        let feed = Arc::new(FlakyFeed {
            inner: InMemoryChangeFeed::new(),
            failed_once: AtomicBool::new(false),
        });
        let sub = feed.subscribe();
        let table = PublishingInvoiceTable::new(InMemoryInvoiceTable::default(), feed.clone());

        let first = table.insert(&invoice("INV1", "CUST1")).await.unwrap_err();
        assert!(matches!(first, TableError::Publish(_)));
        assert!(sub.recv_timeout(Duration::from_millis(50)).is_err());

        let image = table.insert(&invoice("INV1", "CUST1")).await.unwrap();
        let event = sub.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(event.kind(), ChangeKind::Insert);
        assert_eq!(event.new_image(), Some(&image));

        let err = table.insert(&invoice("INV1", "CUST2")).await.unwrap_err();
        assert!(matches!(err, TableError::Conflict(_)));
        assert!(sub.recv_timeout(Duration::from_millis(50)).is_err());

        let (inner, _) = table.into_parts();
        assert_eq!(inner.len(), 1);
    }

    #[test]
    fn index_key_reads_configured_attribute() {
        let image = invoice("INV1", "CUST1").to_image();
        assert_eq!(SecondaryIndex::default().key_of(&image), Some("CUST1"));
        assert_eq!(SecondaryIndex::new("ByDate", "InvoiceDate").key_of(&image), Some("2023-09-26"));
        assert_eq!(SecondaryIndex::new("ByAmount", "TotalAmount").key_of(&image), None);
    }
}
