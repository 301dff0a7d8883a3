use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use invoicer_core::InvoiceId;
use invoicer_invoicing::{BillSundry, Invoice, InvoiceDocument, Item, NewInvoice};

/// Storage operation error.
///
/// These are **infrastructure errors** (connectivity, constraints, decoding)
/// as opposed to domain errors (validation, not found).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached or a connection could not be acquired.
    #[error("connection failed: {0}")]
    Connection(String),

    /// A uniqueness, foreign key or check constraint rejected the write.
    #[error("constraint violated: {0}")]
    Constraint(String),

    /// Any other failed statement.
    #[error("query failed: {0}")]
    Query(String),

    /// A stored row could not be mapped back into a domain value.
    #[error("corrupt row: {0}")]
    Decode(String),
}

/// Store that hands out transactions and serves whole-document reads.
///
/// ## Invoice numbers
///
/// `insert_header` assigns the invoice number. Implementations must keep it
/// unique under concurrent inserts; gaps (e.g. after a rollback) are fine.
///
/// ## Reads
///
/// `find_invoice` and `list_invoices` return a header joined with its full
/// item and sundry sets. They do not need a caller-managed transaction.
#[async_trait]
pub trait TransactionalStore: Send + Sync {
    type Tx: StoreTransaction;

    /// Open a new transaction scope.
    async fn begin(&self) -> Result<Self::Tx, StoreError>;

    async fn find_invoice(&self, id: InvoiceId) -> Result<Option<InvoiceDocument>, StoreError>;

    /// Every invoice with its children. Order is store-defined.
    async fn list_invoices(&self) -> Result<Vec<InvoiceDocument>, StoreError>;
}

/// A single open transaction.
///
/// Nothing written through it is visible to other callers until `commit`.
/// Dropping it without committing discards all writes.
#[async_trait]
pub trait StoreTransaction: Send {
    async fn find_header(&mut self, id: InvoiceId) -> Result<Option<Invoice>, StoreError>;

    /// Insert a header row; the store assigns `invoice_number`.
    async fn insert_header(&mut self, header: NewInvoice) -> Result<Invoice, StoreError>;

    /// Overwrite the scalar fields of an existing header.
    async fn update_header(&mut self, header: &Invoice) -> Result<(), StoreError>;

    /// Returns `false` when no header had this id.
    async fn delete_header(&mut self, id: InvoiceId) -> Result<bool, StoreError>;

    /// Insert a batch of items. Row order within the batch is not preserved.
    async fn insert_items(&mut self, items: &[Item]) -> Result<(), StoreError>;

    async fn insert_bill_sundries(&mut self, bill_sundries: &[BillSundry]) -> Result<(), StoreError>;

    /// Delete all items owned by `header_id`, returning how many went.
    async fn delete_items(&mut self, header_id: InvoiceId) -> Result<u64, StoreError>;

    async fn delete_bill_sundries(&mut self, header_id: InvoiceId) -> Result<u64, StoreError>;

    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}

#[async_trait]
impl<S> TransactionalStore for Arc<S>
where
    S: TransactionalStore + ?Sized,
{
    type Tx = S::Tx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        (**self).begin().await
    }

    async fn find_invoice(&self, id: InvoiceId) -> Result<Option<InvoiceDocument>, StoreError> {
        (**self).find_invoice(id).await
    }

    async fn list_invoices(&self) -> Result<Vec<InvoiceDocument>, StoreError> {
        (**self).list_invoices().await
    }
}
