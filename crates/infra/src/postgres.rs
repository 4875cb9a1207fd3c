//! Shared Postgres plumbing for the `postgres` storage backend.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

/// Quote a configured table/index name as a SQL identifier.
///
/// Names are validated by the config layer; quoting keeps mixed case intact.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub async fn connect(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    info!("connected to postgres");
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_ident("Invoices"), "\"Invoices\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
