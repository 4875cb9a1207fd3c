use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use invoicer_core::{CustomerId, InvoiceId};
use invoicer_events::Image;
use invoicer_invoicing::Invoice;

use super::{InvoiceTable, SecondaryIndex, TableError};
use crate::pointer_index::{CustomerIndex, IndexError};

/// In-memory invoice table for tests/dev.
///
/// Rows are kept as record images so the customer index reads the same
/// attribute a real secondary index would.
#[derive(Debug, Default)]
pub struct InMemoryInvoiceTable {
    rows: RwLock<BTreeMap<InvoiceId, Image>>,
    index: SecondaryIndex,
}

impl InMemoryInvoiceTable {
    pub fn new(index: SecondaryIndex) -> Self {
        Self {
            rows: RwLock::default(),
            index,
        }
    }

    pub fn index(&self) -> &SecondaryIndex {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.rows.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl InvoiceTable for InMemoryInvoiceTable {
    async fn insert(&self, invoice: &Invoice) -> Result<Image, TableError> {
        let mut rows = self
            .rows
            .write()
            .map_err(|_| TableError::Unavailable("lock poisoned".to_string()))?;

        if rows.contains_key(&invoice.invoice_id) {
            return Err(TableError::Conflict(invoice.invoice_id.clone()));
        }

        let image = invoice.to_image();
        rows.insert(invoice.invoice_id.clone(), image.clone());
        Ok(image)
    }

    async fn get(&self, invoice_id: &InvoiceId) -> Result<Option<Invoice>, TableError> {
        let rows = self
            .rows
            .read()
            .map_err(|_| TableError::Unavailable("lock poisoned".to_string()))?;

        rows.get(invoice_id)
            .map(Invoice::from_image)
            .transpose()
            .map_err(|e| TableError::Corrupt(format!("{invoice_id}: {e}")))
    }
}

#[async_trait]
impl CustomerIndex for InMemoryInvoiceTable {
    async fn query_by_customer(&self, customer_id: &CustomerId) -> Result<Vec<Invoice>, IndexError> {
        let rows = self
            .rows
            .read()
            .map_err(|_| IndexError::Unavailable("lock poisoned".to_string()))?;

        rows.values()
            .filter(|image| self.index.key_of(image) == Some(customer_id.as_str()))
            .map(|image| Invoice::from_image(image).map_err(|e| IndexError::Corrupt(e.to_string())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use invoicer_core::Amount;

    use super::*;

    fn invoice(id: &str, customer: &str) -> Invoice {
        Invoice {
            invoice_id: InvoiceId::new(id).unwrap(),
            customer_id: CustomerId::new(customer).unwrap(),
            invoice_date: String::new(),
            product_list: vec![],
            total_amount: Amount::from_minor_units(1),
        }
    }

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let table = InMemoryInvoiceTable::default();
        let inv = invoice("INV1", "CUST1");
        table.insert(&inv).await.unwrap();

        assert_eq!(table.get(&inv.invoice_id).await.unwrap(), Some(inv));
        assert_eq!(table.get(&InvoiceId::new("INV2").unwrap()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn duplicate_id_is_a_conflict_and_keeps_first_row() {
        let table = InMemoryInvoiceTable::default();
        table.insert(&invoice("INV1", "CUST1")).await.unwrap();

        let err = table.insert(&invoice("INV1", "CUST9")).await.unwrap_err();
        assert!(matches!(err, TableError::Conflict(id) if id.as_str() == "INV1"));

        let stored = table.get(&InvoiceId::new("INV1").unwrap()).await.unwrap().unwrap();
        assert_eq!(stored.customer_id.as_str(), "CUST1");
        assert_eq!(table.len(), 1);
    }

    #[tokio::test]
    async fn query_returns_only_matching_customer() {
        let table = InMemoryInvoiceTable::default();
        for (id, cust) in [("INV1", "CUST1"), ("INV2", "CUST2"), ("INV3", "CUST1")] {
            table.insert(&invoice(id, cust)).await.unwrap();
        }

        let mut ids: Vec<String> = table
            .query_by_customer(&CustomerId::new("CUST1").unwrap())
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.invoice_id.into_inner())
            .collect();
        ids.sort();
        assert_eq!(ids, ["INV1", "INV3"]);

        let none = table
            .query_by_customer(&CustomerId::new("NOBODY").unwrap())
            .await
            .unwrap();
        assert!(none.is_empty());
    }
}
