//! Invoicing domain module.
//!
//! This crate contains the business rules for invoice documents (header, line
//! items, bill sundries) implemented purely as deterministic domain logic (no
//! IO, no HTTP, no storage).

pub mod invoice;
pub mod validation;

pub use invoice::{
    BillSundry, BillSundryDraft, HeaderFields, Invoice, InvoiceDocument, InvoiceDraft, Item,
    ItemDraft, NewInvoice,
};
pub use validation::{check_total, validate, validate_document};
