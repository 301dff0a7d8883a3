//! Postgres connection pool and schema bootstrap.

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{info, instrument};

use crate::config::DatabaseConfig;
use crate::store::StoreError;
use crate::store::postgres::map_sqlx_error;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS header (
        id UUID PRIMARY KEY,
        invoice_number BIGINT GENERATED BY DEFAULT AS IDENTITY UNIQUE,
        date TEXT NOT NULL,
        customer_name TEXT NOT NULL,
        billing_address TEXT NOT NULL,
        shipping_address TEXT NOT NULL,
        gstin TEXT NOT NULL,
        total_amount BIGINT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS items (
        id UUID PRIMARY KEY,
        header_id UUID NOT NULL REFERENCES header(id) ON DELETE CASCADE,
        item_name TEXT NOT NULL,
        quantity BIGINT NOT NULL CHECK (quantity > 0),
        price BIGINT NOT NULL CHECK (price > 0),
        amount BIGINT NOT NULL CHECK (amount > 0),
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_items_header_id ON items(header_id)",
    r#"
    CREATE TABLE IF NOT EXISTS billsundry (
        id UUID PRIMARY KEY,
        header_id UUID NOT NULL REFERENCES header(id) ON DELETE CASCADE,
        bill_sundry_name TEXT NOT NULL,
        amount BIGINT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_billsundry_header_id ON billsundry(header_id)",
];

/// Database connection pool wrapper.
///
/// Owned by the binary: created once at startup, handed to the Postgres store,
/// closed on shutdown.
#[derive(Debug, Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    #[instrument(skip(config), fields(max_connections = config.max_connections), err)]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        info!("connecting to postgres");
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(config.connect_options.clone())
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        info!("postgres connection pool established");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the invoice tables if they do not exist yet. Idempotent.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        info!(statements = SCHEMA.len(), "schema ready");
        Ok(())
    }

    #[instrument(skip(self), err)]
    pub async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("health_check", e))?;
        Ok(())
    }

    /// Wait for checked-out connections to return, then close the pool.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("postgres connection pool closed");
    }
}
