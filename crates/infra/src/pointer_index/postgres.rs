//! Postgres-backed pointer index.
//!
//! One row per invoice; `put` is an `INSERT ... ON CONFLICT DO UPDATE` so
//! redelivered events converge on the same row.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::instrument;

use invoicer_core::InvoiceId;

use super::{ArtifactPointer, IndexError, Lookup, PointerIndex};
use crate::artifact_store::StorageKey;
use crate::postgres::quote_ident;

pub struct PostgresPointerIndex {
    pool: PgPool,
    table: String,
}

fn unavailable(e: sqlx::Error) -> IndexError {
    IndexError::Unavailable(e.to_string())
}

impl PostgresPointerIndex {
    pub fn new(pool: PgPool, table: &str) -> Self {
        Self {
            pool,
            table: quote_ident(table),
        }
    }

    /// Create the backing table if it does not exist.
    pub async fn ensure_schema(&self) -> Result<(), IndexError> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (\
                invoice_id TEXT PRIMARY KEY, \
                storage_key TEXT NOT NULL, \
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now())",
            self.table
        );
        sqlx::query(&ddl).execute(&self.pool).await.map_err(unavailable)?;
        Ok(())
    }
}

#[async_trait]
impl PointerIndex for PostgresPointerIndex {
    #[instrument(skip_all, fields(invoice_id = %pointer.invoice_id), err)]
    async fn put(&self, pointer: &ArtifactPointer) -> Result<(), IndexError> {
        let sql = format!(
            "INSERT INTO {} (invoice_id, storage_key) VALUES ($1, $2) \
             ON CONFLICT (invoice_id) DO UPDATE \
             SET storage_key = EXCLUDED.storage_key, updated_at = now()",
            self.table
        );
        sqlx::query(&sql)
            .bind(pointer.invoice_id.as_str())
            .bind(pointer.storage_key.as_str())
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    #[instrument(skip_all, fields(invoice_id = %invoice_id), err)]
    async fn get(&self, invoice_id: &InvoiceId) -> Result<Lookup<StorageKey>, IndexError> {
        let sql = format!("SELECT storage_key FROM {} WHERE invoice_id = $1", self.table);
        let row = sqlx::query(&sql)
            .bind(invoice_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?;

        let Some(row) = row else {
            return Ok(Lookup::NotFound);
        };
        let raw: String = row.try_get("storage_key").map_err(unavailable)?;
        StorageKey::parse(raw)
            .map(Lookup::Found)
            .map_err(|e| IndexError::Corrupt(e.to_string()))
    }
}
