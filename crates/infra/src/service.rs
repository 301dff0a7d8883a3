//! Invoice service: validation plus transactional persistence.
//!
//! ## Operation flow
//!
//! ```text
//! draft
//!   ↓
//! 1. validate items, compute total, cross-check supplied total   (no IO)
//!   ↓
//! 2. begin transaction
//!   ↓
//! 3. header write, then one batch per child table
//!   ↓
//! 4. commit, or roll back on any error
//! ```
//!
//! Step 1 always completes before step 2, so a rejected document never costs
//! a connection or a transaction.

use chrono::Utc;
use thiserror::Error;
use tracing::{Span, error, info, instrument, warn};

use invoicer_core::{DomainError, Fixed, InvoiceId};
use invoicer_invoicing::{
    BillSundryDraft, InvoiceDocument, InvoiceDraft, ItemDraft, NewInvoice, validate,
    validate_document,
};

use crate::store::{StoreError, StoreTransaction, TransactionalStore};

/// Error returned by [`InvoiceService`] operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The submitted document (or identifier) was rejected.
    #[error("{0}")]
    Validation(String),

    #[error("Invoice not found")]
    NotFound,

    /// The store failed; any open transaction has been rolled back.
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl From<DomainError> for ServiceError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => ServiceError::Validation(msg),
            DomainError::InvalidId(msg) => ServiceError::Validation(msg),
            DomainError::NotFound => ServiceError::NotFound,
        }
    }
}

/// Validates invoice documents and persists them through a
/// [`TransactionalStore`].
///
/// Each operation opens at most one transaction and either commits it or rolls
/// it back before returning.
#[derive(Debug)]
pub struct InvoiceService<S> {
    store: S,
}

impl<S> InvoiceService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S> InvoiceService<S>
where
    S: TransactionalStore,
{
    /// Check items and compute the total of items plus sundries. Pure.
    pub fn validate(
        &self,
        items: &[ItemDraft],
        bill_sundries: &[BillSundryDraft],
    ) -> Result<Fixed, ServiceError> {
        Ok(validate(items, bill_sundries)?)
    }

    /// Persist a new invoice with its items and sundries.
    ///
    /// The returned document carries the generated id and the store-assigned
    /// invoice number. The stored total is the computed one, not the
    /// client-supplied value.
    #[instrument(
        skip(self, draft),
        fields(
            items = draft.items.len(),
            bill_sundries = draft.bill_sundries.len(),
            invoice_id,
            invoice_number
        )
    )]
    pub async fn create(&self, draft: InvoiceDraft) -> Result<InvoiceDocument, ServiceError> {
        let total = checked(&draft)?;

        let mut tx = self.store.begin().await.map_err(storage_failure)?;
        let result = write_new(&mut tx, draft, total).await;
        let document = finish(tx, result).await?;

        let span = Span::current();
        span.record("invoice_id", tracing::field::display(document.header.id));
        span.record("invoice_number", document.header.invoice_number);
        info!(total = %document.header.total_amount, "invoice created");
        Ok(document)
    }

    /// Replace the header fields and the complete child sets of an existing
    /// invoice. Invoice number and creation time are kept.
    #[instrument(
        skip(self, draft),
        fields(
            invoice_id = %id,
            items = draft.items.len(),
            bill_sundries = draft.bill_sundries.len()
        )
    )]
    pub async fn update(
        &self,
        id: InvoiceId,
        draft: InvoiceDraft,
    ) -> Result<InvoiceDocument, ServiceError> {
        let total = checked(&draft)?;

        let mut tx = self.store.begin().await.map_err(storage_failure)?;
        let result = write_replacement(&mut tx, id, draft, total).await;
        let document = finish(tx, result).await?;

        info!(total = %document.header.total_amount, "invoice updated");
        Ok(document)
    }

    /// Remove an invoice together with all of its items and sundries.
    #[instrument(skip(self), fields(invoice_id = %id))]
    pub async fn delete(&self, id: InvoiceId) -> Result<(), ServiceError> {
        let mut tx = self.store.begin().await.map_err(storage_failure)?;
        let result = remove(&mut tx, id).await;
        finish(tx, result).await?;

        info!("invoice deleted");
        Ok(())
    }

    #[instrument(skip(self), fields(invoice_id = %id))]
    pub async fn get(&self, id: InvoiceId) -> Result<InvoiceDocument, ServiceError> {
        self.store
            .find_invoice(id)
            .await
            .map_err(storage_failure)?
            .ok_or_else(|| DomainError::not_found().into())
    }

    /// All invoices with their children. Order is store-defined.
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<InvoiceDocument>, ServiceError> {
        self.store.list_invoices().await.map_err(storage_failure)
    }
}

fn checked(draft: &InvoiceDraft) -> Result<Fixed, ServiceError> {
    validate_document(draft).map_err(|e| {
        warn!(reason = %e, "invoice rejected");
        ServiceError::from(e)
    })
}

fn storage_failure(err: StoreError) -> ServiceError {
    error!(error = %err, "store operation failed");
    ServiceError::Storage(err)
}

/// Commit on success; roll back and hand the original error back otherwise.
async fn finish<T, X>(tx: X, result: Result<T, ServiceError>) -> Result<T, ServiceError>
where
    X: StoreTransaction,
{
    match result {
        Ok(value) => {
            tx.commit().await.map_err(storage_failure)?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                error!(error = %rollback_err, "rollback failed");
            }
            Err(err)
        }
    }
}

async fn write_new<X>(
    tx: &mut X,
    draft: InvoiceDraft,
    total: Fixed,
) -> Result<InvoiceDocument, ServiceError>
where
    X: StoreTransaction,
{
    let now = Utc::now();
    let header = tx
        .insert_header(NewInvoice {
            id: InvoiceId::new(),
            fields: draft.header,
            total_amount: total,
            created_at: now,
        })
        .await
        .map_err(storage_failure)?;

    let document = InvoiceDocument::assemble(header, draft.items, draft.bill_sundries, now);
    write_children(tx, &document).await?;
    Ok(document)
}

async fn write_replacement<X>(
    tx: &mut X,
    id: InvoiceId,
    draft: InvoiceDraft,
    total: Fixed,
) -> Result<InvoiceDocument, ServiceError>
where
    X: StoreTransaction,
{
    let Some(mut header) = tx.find_header(id).await.map_err(storage_failure)? else {
        return Err(DomainError::not_found().into());
    };

    let removed_items = tx.delete_items(id).await.map_err(storage_failure)?;
    let removed_sundries = tx.delete_bill_sundries(id).await.map_err(storage_failure)?;

    let now = Utc::now();
    header.replace_fields(draft.header, total, now);
    tx.update_header(&header).await.map_err(storage_failure)?;

    let document = InvoiceDocument::assemble(header, draft.items, draft.bill_sundries, now);
    write_children(tx, &document).await?;

    info!(removed_items, removed_sundries, "child rows replaced");
    Ok(document)
}

async fn remove<X>(tx: &mut X, id: InvoiceId) -> Result<(), ServiceError>
where
    X: StoreTransaction,
{
    if tx.find_header(id).await.map_err(storage_failure)?.is_none() {
        return Err(DomainError::not_found().into());
    }
    tx.delete_items(id).await.map_err(storage_failure)?;
    tx.delete_bill_sundries(id).await.map_err(storage_failure)?;
    tx.delete_header(id).await.map_err(storage_failure)?;
    Ok(())
}

async fn write_children<X>(tx: &mut X, document: &InvoiceDocument) -> Result<(), ServiceError>
where
    X: StoreTransaction,
{
    tx.insert_items(&document.items)
        .await
        .map_err(storage_failure)?;
    tx.insert_bill_sundries(&document.bill_sundries)
        .await
        .map_err(storage_failure)?;
    Ok(())
}
