//! Bulk seeding of mock invoices for demos and load checks.

use serde::Serialize;
use tracing::{info, instrument};

use invoicer_core::{Amount, CustomerId, DomainError, InvoiceId};
use invoicer_invoicing::Invoice;

use crate::invoice_table::{InvoiceTable, TableError};

pub const MOCK_INVOICE_DATE: &str = "2023-09-26";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub created: usize,
    /// Ids that already existed and were left untouched.
    pub already_present: usize,
}

/// `INV{i}` for customer `CUST{i}`, `i` in `1..=count`.
pub fn mock_invoices(count: usize) -> Result<Vec<Invoice>, DomainError> {
    (1..=count)
        .map(|i| {
            Ok(Invoice {
                invoice_id: InvoiceId::new(format!("INV{i}"))?,
                customer_id: CustomerId::new(format!("CUST{i}"))?,
                invoice_date: MOCK_INVOICE_DATE.to_string(),
                product_list: vec!["Item1".to_string(), "Item2".to_string()],
                total_amount: Amount::from_minor_units(1),
            })
        })
        .collect()
}

/// Insert `count` mock invoices. Re-running is harmless: taken ids are
/// counted as already present and not written or published again.
#[instrument(skip(table))]
pub async fn seed_invoices<T>(table: &T, count: usize) -> Result<SeedReport, TableError>
where
    T: InvoiceTable + ?Sized,
{
    let invoices = mock_invoices(count).map_err(|e| TableError::Corrupt(e.to_string()))?;
    let mut report = SeedReport::default();

    for invoice in &invoices {
        if table.get(&invoice.invoice_id).await?.is_some() {
            report.already_present += 1;
            continue;
        }
        match table.insert(invoice).await {
            Ok(_) => report.created += 1,
            Err(TableError::Conflict(_)) => report.already_present += 1,
            Err(e) => return Err(e),
        }
    }

    info!(created = report.created, already_present = report.already_present, "seeded invoices");
    Ok(report)
}
