//! Postgres-backed invoice table.
//!
//! Rows hold the full record image as JSONB plus the value of the configured
//! index attribute in its own column, which carries the secondary index.

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::instrument;

use invoicer_core::{CustomerId, InvoiceId};
use invoicer_events::Image;
use invoicer_invoicing::Invoice;

use super::{InvoiceTable, SecondaryIndex, TableError};
use crate::pointer_index::{CustomerIndex, IndexError};
use crate::postgres::quote_ident;

pub struct PostgresInvoiceTable {
    pool: PgPool,
    table: String,
    index: SecondaryIndex,
}

impl PostgresInvoiceTable {
    pub fn new(pool: PgPool, table: &str, index: SecondaryIndex) -> Self {
        Self {
            pool,
            table: quote_ident(table),
            index,
        }
    }

    pub async fn ensure_schema(&self) -> Result<(), TableError> {
        let table_ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (\
                invoice_id TEXT PRIMARY KEY, \
                index_key TEXT, \
                image JSONB NOT NULL, \
                created_at TIMESTAMPTZ NOT NULL DEFAULT now())",
            self.table
        );
        let index_ddl = format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} (index_key)",
            quote_ident(&self.index.name),
            self.table
        );
        for ddl in [table_ddl, index_ddl] {
            sqlx::query(&ddl)
                .execute(&self.pool)
                .await
                .map_err(|e| TableError::Unavailable(e.to_string()))?;
        }
        Ok(())
    }
}

fn decode_row(row: &sqlx::postgres::PgRow) -> Result<Invoice, String> {
    let Json(image): Json<Image> = row.try_get("image").map_err(|e| e.to_string())?;
    Invoice::from_image(&image).map_err(|e| e.to_string())
}

#[async_trait]
impl InvoiceTable for PostgresInvoiceTable {
    #[instrument(skip_all, fields(invoice_id = %invoice.invoice_id), err)]
    async fn insert(&self, invoice: &Invoice) -> Result<Image, TableError> {
        let image = invoice.to_image();
        let sql = format!(
            "INSERT INTO {} (invoice_id, index_key, image) VALUES ($1, $2, $3) \
             ON CONFLICT (invoice_id) DO NOTHING",
            self.table
        );
        let result = sqlx::query(&sql)
            .bind(invoice.invoice_id.as_str())
            .bind(self.index.key_of(&image))
            .bind(Json(&image))
            .execute(&self.pool)
            .await
            .map_err(|e| TableError::Unavailable(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(TableError::Conflict(invoice.invoice_id.clone()));
        }
        Ok(image)
    }

    async fn get(&self, invoice_id: &InvoiceId) -> Result<Option<Invoice>, TableError> {
        let sql = format!("SELECT image FROM {} WHERE invoice_id = $1", self.table);
        let row = sqlx::query(&sql)
            .bind(invoice_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| TableError::Unavailable(e.to_string()))?;

        row.as_ref()
            .map(decode_row)
            .transpose()
            .map_err(TableError::Corrupt)
    }
}

#[async_trait]
impl CustomerIndex for PostgresInvoiceTable {
    #[instrument(skip_all, fields(customer_id = %customer_id, index = %self.index.name), err)]
    async fn query_by_customer(&self, customer_id: &CustomerId) -> Result<Vec<Invoice>, IndexError> {
        let sql = format!("SELECT image FROM {} WHERE index_key = $1", self.table);
        let rows = sqlx::query(&sql)
            .bind(customer_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;

        rows.iter()
            .map(|row| decode_row(row).map_err(IndexError::Corrupt))
            .collect()
    }
}
