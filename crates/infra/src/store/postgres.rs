//! Postgres-backed invoice store.
//!
//! ## Schema
//!
//! Three tables (`header`, `items`, `billsundry`) created by
//! [`crate::db::Database::ensure_schema`]. Children reference `header(id)`
//! with `ON DELETE CASCADE`. `header.invoice_number` is an identity column, so
//! numbering is delegated to a Postgres sequence: unique under concurrency,
//! gaps allowed.
//!
//! Fixed-point values are stored as `BIGINT` hundredths.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Constraint` |
//! | Database (foreign key violation) | `23503` | `Constraint` |
//! | Database (check constraint violation) | `23514` | `Constraint` |
//! | Database (other) | Any other | `Query` |
//! | PoolClosed / PoolTimedOut / Io / Tls | N/A | `Connection` |
//! | ColumnDecode / Decode / ColumnNotFound | N/A | `Decode` |
//! | Other | N/A | `Query` |

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::{instrument, Span};
use uuid::Uuid;

use invoicer_core::{BillSundryId, Fixed, InvoiceId, ItemId};
use invoicer_invoicing::{BillSundry, HeaderFields, Invoice, InvoiceDocument, Item, NewInvoice};

use crate::db::Database;

use super::r#trait::{StoreError, StoreTransaction, TransactionalStore};

const HEADER_COLUMNS: &str = r#"
    id,
    invoice_number,
    date,
    customer_name,
    billing_address,
    shipping_address,
    gstin,
    total_amount,
    created_at,
    updated_at
"#;

/// Postgres-backed transactional store.
///
/// Uses the SQLx connection pool owned by [`Database`], which is `Send + Sync`
/// and cheap to clone.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }
}

#[async_trait]
impl TransactionalStore for PostgresStore {
    type Tx = PostgresTransaction;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(PostgresTransaction { tx })
    }

    #[instrument(skip(self), fields(invoice_id = %id), err)]
    async fn find_invoice(&self, id: InvoiceId) -> Result<Option<InvoiceDocument>, StoreError> {
        // One snapshot for the header and both child sets.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_isolation", e))?;

        let header = sqlx::query(&format!("SELECT {HEADER_COLUMNS} FROM header WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("find_header", e))?;

        let Some(header) = header else {
            tx.commit()
                .await
                .map_err(|e| map_sqlx_error("commit_transaction", e))?;
            return Ok(None);
        };
        let header = decode::<HeaderRow>(&header)?.into_invoice();

        let items = sqlx::query(
            r#"
            SELECT id, header_id, item_name, quantity, price, amount, created_at, updated_at
            FROM items
            WHERE header_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("find_items", e))?;

        let bill_sundries = sqlx::query(
            r#"
            SELECT id, header_id, bill_sundry_name, amount, created_at, updated_at
            FROM billsundry
            WHERE header_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("find_bill_sundries", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(Some(InvoiceDocument {
            header,
            items: items
                .iter()
                .map(|r| decode::<ItemRow>(r).map(ItemRow::into_item))
                .collect::<Result<_, _>>()?,
            bill_sundries: bill_sundries
                .iter()
                .map(|r| decode::<BillSundryRow>(r).map(BillSundryRow::into_bill_sundry))
                .collect::<Result<_, _>>()?,
        }))
    }

    #[instrument(skip(self), fields(invoice_count), err)]
    async fn list_invoices(&self) -> Result<Vec<InvoiceDocument>, StoreError> {
        let span = Span::current();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_isolation", e))?;

        let headers = sqlx::query(&format!(
            "SELECT {HEADER_COLUMNS} FROM header ORDER BY invoice_number ASC"
        ))
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("list_headers", e))?;

        let items = sqlx::query(
            r#"
            SELECT id, header_id, item_name, quantity, price, amount, created_at, updated_at
            FROM items
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("list_items", e))?;

        let bill_sundries = sqlx::query(
            r#"
            SELECT id, header_id, bill_sundry_name, amount, created_at, updated_at
            FROM billsundry
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("list_bill_sundries", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        let mut items_by_header: HashMap<InvoiceId, Vec<Item>> = HashMap::new();
        for row in &items {
            let item = decode::<ItemRow>(row)?.into_item();
            items_by_header.entry(item.header_id).or_default().push(item);
        }

        let mut sundries_by_header: HashMap<InvoiceId, Vec<BillSundry>> = HashMap::new();
        for row in &bill_sundries {
            let sundry = decode::<BillSundryRow>(row)?.into_bill_sundry();
            sundries_by_header
                .entry(sundry.header_id)
                .or_default()
                .push(sundry);
        }

        let mut documents = Vec::with_capacity(headers.len());
        for row in &headers {
            let header = decode::<HeaderRow>(row)?.into_invoice();
            documents.push(InvoiceDocument {
                items: items_by_header.remove(&header.id).unwrap_or_default(),
                bill_sundries: sundries_by_header.remove(&header.id).unwrap_or_default(),
                header,
            });
        }

        span.record("invoice_count", documents.len());
        Ok(documents)
    }
}

/// Open Postgres transaction. Dropping it without `commit` rolls back.
#[derive(Debug)]
pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PostgresTransaction {
    async fn find_header(&mut self, id: InvoiceId) -> Result<Option<Invoice>, StoreError> {
        // Lock the row so a concurrent delete waits for this transaction.
        let row = sqlx::query(&format!(
            "SELECT {HEADER_COLUMNS} FROM header WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("find_header", e))?;

        row.map(|r| decode::<HeaderRow>(&r).map(HeaderRow::into_invoice))
            .transpose()
    }

    async fn insert_header(&mut self, header: NewInvoice) -> Result<Invoice, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO header (
                id,
                date,
                customer_name,
                billing_address,
                shipping_address,
                gstin,
                total_amount,
                created_at,
                updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            RETURNING invoice_number
            "#,
        )
        .bind(header.id.as_uuid())
        .bind(&header.fields.date)
        .bind(&header.fields.customer_name)
        .bind(&header.fields.billing_address)
        .bind(&header.fields.shipping_address)
        .bind(&header.fields.gstin)
        .bind(header.total_amount.hundredths())
        .bind(header.created_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_header", e))?;

        let number: i64 = row
            .try_get("invoice_number")
            .map_err(|e| map_sqlx_error("insert_header", e))?;
        Ok(header.into_invoice(number))
    }

    async fn update_header(&mut self, header: &Invoice) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE header SET
                date = $2,
                customer_name = $3,
                billing_address = $4,
                shipping_address = $5,
                gstin = $6,
                total_amount = $7,
                updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(header.id.as_uuid())
        .bind(&header.fields.date)
        .bind(&header.fields.customer_name)
        .bind(&header.fields.billing_address)
        .bind(&header.fields.shipping_address)
        .bind(&header.fields.gstin)
        .bind(header.total_amount.hundredths())
        .bind(header.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_header", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Query(format!("no header with id {}", header.id)));
        }
        Ok(())
    }

    async fn delete_header(&mut self, id: InvoiceId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM header WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_header", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_items(&mut self, items: &[Item]) -> Result<(), StoreError> {
        if items.is_empty() {
            return Ok(());
        }

        // One statement for the whole batch.
        let ids: Vec<Uuid> = items.iter().map(|i| *i.id.as_uuid()).collect();
        let header_ids: Vec<Uuid> = items.iter().map(|i| *i.header_id.as_uuid()).collect();
        let names: Vec<String> = items.iter().map(|i| i.name.clone()).collect();
        let quantities: Vec<i64> = items.iter().map(|i| i.quantity.hundredths()).collect();
        let prices: Vec<i64> = items.iter().map(|i| i.price.hundredths()).collect();
        let amounts: Vec<i64> = items.iter().map(|i| i.amount.hundredths()).collect();
        let created: Vec<DateTime<Utc>> = items.iter().map(|i| i.created_at).collect();
        let updated: Vec<DateTime<Utc>> = items.iter().map(|i| i.updated_at).collect();

        sqlx::query(
            r#"
            INSERT INTO items (
                id, header_id, item_name, quantity, price, amount, created_at, updated_at
            )
            SELECT * FROM UNNEST(
                $1::uuid[], $2::uuid[], $3::text[], $4::bigint[],
                $5::bigint[], $6::bigint[], $7::timestamptz[], $8::timestamptz[]
            )
            "#,
        )
        .bind(ids)
        .bind(header_ids)
        .bind(names)
        .bind(quantities)
        .bind(prices)
        .bind(amounts)
        .bind(created)
        .bind(updated)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_items", e))?;

        Ok(())
    }

    async fn insert_bill_sundries(&mut self, bill_sundries: &[BillSundry]) -> Result<(), StoreError> {
        if bill_sundries.is_empty() {
            return Ok(());
        }

        let ids: Vec<Uuid> = bill_sundries.iter().map(|s| *s.id.as_uuid()).collect();
        let header_ids: Vec<Uuid> = bill_sundries.iter().map(|s| *s.header_id.as_uuid()).collect();
        let names: Vec<String> = bill_sundries.iter().map(|s| s.name.clone()).collect();
        let amounts: Vec<i64> = bill_sundries.iter().map(|s| s.amount.hundredths()).collect();
        let created: Vec<DateTime<Utc>> = bill_sundries.iter().map(|s| s.created_at).collect();
        let updated: Vec<DateTime<Utc>> = bill_sundries.iter().map(|s| s.updated_at).collect();

        sqlx::query(
            r#"
            INSERT INTO billsundry (
                id, header_id, bill_sundry_name, amount, created_at, updated_at
            )
            SELECT * FROM UNNEST(
                $1::uuid[], $2::uuid[], $3::text[], $4::bigint[],
                $5::timestamptz[], $6::timestamptz[]
            )
            "#,
        )
        .bind(ids)
        .bind(header_ids)
        .bind(names)
        .bind(amounts)
        .bind(created)
        .bind(updated)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_bill_sundries", e))?;

        Ok(())
    }

    async fn delete_items(&mut self, header_id: InvoiceId) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM items WHERE header_id = $1")
            .bind(header_id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_items", e))?;
        Ok(result.rows_affected())
    }

    async fn delete_bill_sundries(&mut self, header_id: InvoiceId) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM billsundry WHERE header_id = $1")
            .bind(header_id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_bill_sundries", e))?;
        Ok(result.rows_affected())
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

/// Map SQLx errors to `StoreError` (see module docs for the table).
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") | Some("23503") | Some("23514") => StoreError::Constraint(msg),
                _ => StoreError::Query(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Connection(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Connection(format!("timed out acquiring a connection in {}", operation))
        }
        sqlx::Error::Io(e) => StoreError::Connection(format!("io error in {}: {}", operation, e)),
        sqlx::Error::Tls(e) => StoreError::Connection(format!("tls error in {}: {}", operation, e)),
        e @ (sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::ColumnNotFound(_)) => {
            StoreError::Decode(format!("{} in {}", e, operation))
        }
        other => StoreError::Query(format!("sqlx error in {}: {}", operation, other)),
    }
}

fn decode<T>(row: &PgRow) -> Result<T, StoreError>
where
    T: for<'r> FromRow<'r, PgRow>,
{
    T::from_row(row).map_err(|e| StoreError::Decode(format!("failed to deserialize row: {}", e)))
}

// SQLx row types

#[derive(Debug)]
struct HeaderRow {
    id: Uuid,
    invoice_number: i64,
    date: String,
    customer_name: String,
    billing_address: String,
    shipping_address: String,
    gstin: String,
    total_amount: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for HeaderRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(HeaderRow {
            id: row.try_get("id")?,
            invoice_number: row.try_get("invoice_number")?,
            date: row.try_get("date")?,
            customer_name: row.try_get("customer_name")?,
            billing_address: row.try_get("billing_address")?,
            shipping_address: row.try_get("shipping_address")?,
            gstin: row.try_get("gstin")?,
            total_amount: row.try_get("total_amount")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl HeaderRow {
    fn into_invoice(self) -> Invoice {
        Invoice {
            id: InvoiceId::from_uuid(self.id),
            invoice_number: self.invoice_number,
            fields: HeaderFields {
                date: self.date,
                customer_name: self.customer_name,
                billing_address: self.billing_address,
                shipping_address: self.shipping_address,
                gstin: self.gstin,
            },
            total_amount: Fixed::from_hundredths(self.total_amount),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug)]
struct ItemRow {
    id: Uuid,
    header_id: Uuid,
    item_name: String,
    quantity: i64,
    price: i64,
    amount: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for ItemRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ItemRow {
            id: row.try_get("id")?,
            header_id: row.try_get("header_id")?,
            item_name: row.try_get("item_name")?,
            quantity: row.try_get("quantity")?,
            price: row.try_get("price")?,
            amount: row.try_get("amount")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl ItemRow {
    fn into_item(self) -> Item {
        Item {
            id: ItemId::from_uuid(self.id),
            header_id: InvoiceId::from_uuid(self.header_id),
            name: self.item_name,
            quantity: Fixed::from_hundredths(self.quantity),
            price: Fixed::from_hundredths(self.price),
            amount: Fixed::from_hundredths(self.amount),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug)]
struct BillSundryRow {
    id: Uuid,
    header_id: Uuid,
    bill_sundry_name: String,
    amount: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for BillSundryRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(BillSundryRow {
            id: row.try_get("id")?,
            header_id: row.try_get("header_id")?,
            bill_sundry_name: row.try_get("bill_sundry_name")?,
            amount: row.try_get("amount")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl BillSundryRow {
    fn into_bill_sundry(self) -> BillSundry {
        BillSundry {
            id: BillSundryId::from_uuid(self.id),
            header_id: InvoiceId::from_uuid(self.header_id),
            name: self.bill_sundry_name,
            amount: Fixed::from_hundredths(self.amount),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;
    use std::time::Duration;

    use chrono::Utc;
    use invoicer_invoicing::{BillSundryDraft, InvoiceDraft, ItemDraft};
    use sqlx::postgres::PgConnectOptions;

    use super::*;
    use crate::config::DatabaseConfig;
    use crate::service::{InvoiceService, ServiceError};

    /// Connects only when `TEST_DATABASE_URL` is set; otherwise the test is a
    /// no-op.
    async fn store() -> Option<PostgresStore> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        let db = Database::connect(&DatabaseConfig {
            connect_options: PgConnectOptions::from_str(&url).ok()?,
            max_connections: 2,
            acquire_timeout: Duration::from_secs(5),
        })
        .await
        .ok()?;
        db.ensure_schema().await.ok()?;
        Some(PostgresStore::new(&db))
    }

    fn new_header() -> NewInvoice {
        NewInvoice {
            id: InvoiceId::new(),
            fields: HeaderFields {
                date: "2024-06-01".to_string(),
                customer_name: "Acme".to_string(),
                billing_address: "1 Main St".to_string(),
                shipping_address: "1 Main St".to_string(),
                gstin: "GST".to_string(),
            },
            total_amount: Fixed::from_units(9),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn committed_document_reads_back() {
        let Some(store) = store().await else { return };

        let mut tx = store.begin().await.unwrap();
        let header = tx.insert_header(new_header()).await.unwrap();
        let doc = InvoiceDocument::assemble(
            header.clone(),
            vec![ItemDraft {
                name: "Widget".to_string(),
                quantity: Fixed::from_units(2),
                price: Fixed::from_units(5),
                amount: Fixed::from_units(10),
            }],
            vec![BillSundryDraft {
                name: "Discount".to_string(),
                amount: Fixed::from_units(-1),
            }],
            header.created_at,
        );
        tx.insert_items(&doc.items).await.unwrap();
        tx.insert_bill_sundries(&doc.bill_sundries).await.unwrap();
        tx.commit().await.unwrap();

        let found = store.find_invoice(header.id).await.unwrap().unwrap();
        assert_eq!(found.header.invoice_number, header.invoice_number);
        assert_eq!(found.header.total_amount, Fixed::from_units(9));
        assert_eq!(found.items.len(), 1);
        assert_eq!(found.items[0].amount, Fixed::from_units(10));
        assert_eq!(found.bill_sundries[0].amount, Fixed::from_units(-1));

        let mut tx = store.begin().await.unwrap();
        assert!(tx.delete_header(header.id).await.unwrap());
        tx.commit().await.unwrap();
        assert!(store.find_invoice(header.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rolled_back_header_is_invisible() {
        let Some(store) = store().await else { return };

        let mut tx = store.begin().await.unwrap();
        let header = tx.insert_header(new_header()).await.unwrap();
        tx.rollback().await.unwrap();

        assert!(store.find_invoice(header.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn orphan_items_violate_the_foreign_key() {
        let Some(store) = store().await else { return };

        let orphan = InvoiceDocument::assemble(
            new_header().into_invoice(0),
            vec![ItemDraft {
                name: "Widget".to_string(),
                quantity: Fixed::from_units(1),
                price: Fixed::from_units(1),
                amount: Fixed::from_units(1),
            }],
            vec![],
            Utc::now(),
        );

        let mut tx = store.begin().await.unwrap();
        let err = tx.insert_items(&orphan.items).await.unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));
    }

    fn draft(customer: &str, items: Vec<ItemDraft>, sundries: Vec<BillSundryDraft>) -> InvoiceDraft {
        let total = Fixed::checked_sum(
            items.iter().map(|i| i.amount).chain(sundries.iter().map(|s| s.amount)),
        )
        .unwrap();
        InvoiceDraft {
            header: HeaderFields {
                date: "2024-06-01".to_string(),
                customer_name: customer.to_string(),
                billing_address: "1 Main St".to_string(),
                shipping_address: "1 Main St".to_string(),
                gstin: "GST".to_string(),
            },
            total_amount: total,
            items,
            bill_sundries: sundries,
        }
    }

    fn line(name: &str, quantity: i64, price: i64) -> ItemDraft {
        ItemDraft {
            name: name.to_string(),
            quantity: Fixed::from_units(quantity),
            price: Fixed::from_units(price),
            amount: Fixed::from_units(quantity * price),
        }
    }

    fn charge(name: &str, amount: i64) -> BillSundryDraft {
        BillSundryDraft {
            name: name.to_string(),
            amount: Fixed::from_units(amount),
        }
    }

    async fn child_rows(store: &PostgresStore, id: InvoiceId) -> (i64, i64) {
        let items: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM items WHERE header_id = $1")
            .bind(id.as_uuid())
            .fetch_one(&store.pool)
            .await
            .unwrap();
        let sundries: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM billsundry WHERE header_id = $1")
                .bind(id.as_uuid())
                .fetch_one(&store.pool)
                .await
                .unwrap();
        (items, sundries)
    }

    fn names(doc: &InvoiceDocument) -> (Vec<String>, Vec<String>) {
        let mut items: Vec<String> = doc.items.iter().map(|i| i.name.clone()).collect();
        let mut sundries: Vec<String> = doc.bill_sundries.iter().map(|s| s.name.clone()).collect();
        items.sort();
        sundries.sort();
        (items, sundries)
    }

    #[tokio::test]
    async fn service_lifecycle_keeps_children_with_their_header() {
        let Some(store) = store().await else { return };
        let service = InvoiceService::new(store.clone());

        let first = service
            .create(draft("Acme", vec![line("Widget", 2, 5)], vec![charge("Discount", -1)]))
            .await
            .unwrap();
        let second = service
            .create(draft(
                "Initech",
                vec![line("Stapler", 1, 7), line("Paper", 3, 2)],
                vec![charge("Freight", 4)],
            ))
            .await
            .unwrap();

        let updated = service
            .update(
                first.header.id,
                draft("Globex", vec![line("Gear", 3, 10), line("Bolt", 4, 1)], vec![]),
            )
            .await
            .unwrap();
        assert_eq!(updated.header.invoice_number, first.header.invoice_number);
        assert_eq!(updated.header.created_at, first.header.created_at);
        assert_eq!(updated.header.total_amount, Fixed::from_units(34));

        let fetched = service.get(first.header.id).await.unwrap();
        assert_eq!(fetched.header.fields.customer_name, "Globex");
        assert_eq!(fetched.header.invoice_number, first.header.invoice_number);
        assert_eq!(
            names(&fetched),
            (vec!["Bolt".to_string(), "Gear".to_string()], vec![])
        );
        assert_eq!(child_rows(&store, first.header.id).await, (2, 0));

        // The database may hold rows from other tests; only ours are checked.
        let listed: HashMap<InvoiceId, InvoiceDocument> = service
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|doc| (doc.header.id, doc))
            .collect();
        let listed_first = &listed[&first.header.id];
        let listed_second = &listed[&second.header.id];
        assert_eq!(
            names(listed_first),
            (vec!["Bolt".to_string(), "Gear".to_string()], vec![])
        );
        assert_eq!(
            names(listed_second),
            (
                vec!["Paper".to_string(), "Stapler".to_string()],
                vec!["Freight".to_string()]
            )
        );
        for doc in [listed_first, listed_second] {
            assert!(doc.items.iter().all(|i| i.header_id == doc.header.id));
            assert!(doc.bill_sundries.iter().all(|s| s.header_id == doc.header.id));
        }

        service.delete(first.header.id).await.unwrap();
        assert!(matches!(
            service.get(first.header.id).await,
            Err(ServiceError::NotFound)
        ));
        assert_eq!(child_rows(&store, first.header.id).await, (0, 0));
        assert_eq!(child_rows(&store, second.header.id).await, (2, 1));

        service.delete(second.header.id).await.unwrap();
        assert_eq!(child_rows(&store, second.header.id).await, (0, 0));
    }

    #[tokio::test]
    async fn update_header_rewrites_fields_but_not_number() {
        let Some(store) = store().await else { return };

        let mut tx = store.begin().await.unwrap();
        let mut header = tx.insert_header(new_header()).await.unwrap();
        tx.commit().await.unwrap();
        let number = header.invoice_number;

        let mut tx = store.begin().await.unwrap();
        header.replace_fields(
            HeaderFields {
                date: "2024-07-01".to_string(),
                customer_name: "Globex".to_string(),
                billing_address: "9 Elm St".to_string(),
                shipping_address: "9 Elm St".to_string(),
                gstin: "GST2".to_string(),
            },
            Fixed::from_units(12),
            Utc::now(),
        );
        tx.update_header(&header).await.unwrap();
        tx.commit().await.unwrap();

        let found = store.find_invoice(header.id).await.unwrap().unwrap();
        assert_eq!(found.header.invoice_number, number);
        assert_eq!(found.header.fields.customer_name, "Globex");
        assert_eq!(found.header.total_amount, Fixed::from_units(12));

        let mut tx = store.begin().await.unwrap();
        assert!(tx.delete_header(header.id).await.unwrap());
        tx.commit().await.unwrap();
    }
}
