use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use invoicer_core::{BillSundryId, Fixed, InvoiceId, ItemId};

/// Scalar header fields a client may set. The invoice number, identifier and
/// timestamps are never client-supplied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderFields {
    /// Issue date as submitted (UTC, free-form string).
    pub date: String,
    pub customer_name: String,
    pub billing_address: String,
    pub shipping_address: String,
    /// Tax identifier.
    pub gstin: String,
}

/// Line item as submitted by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDraft {
    pub name: String,
    pub quantity: Fixed,
    pub price: Fixed,
    pub amount: Fixed,
}

/// Bill sundry as submitted by a client. `amount` may be negative (discount).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillSundryDraft {
    pub name: String,
    pub amount: Fixed,
}

/// A complete invoice document as submitted on create or update.
///
/// Updates use the same shape: the item and sundry sets here **replace** the
/// stored ones wholesale. There is no merge or patch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceDraft {
    pub header: HeaderFields,
    /// Client-computed total, cross-checked against the items and sundries.
    pub total_amount: Fixed,
    pub items: Vec<ItemDraft>,
    pub bill_sundries: Vec<BillSundryDraft>,
}

/// Invoice header (the parent record).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    /// Store-assigned, unique, never changes after creation.
    pub invoice_number: i64,
    pub fields: HeaderFields,
    pub total_amount: Fixed,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// Overwrite the client-settable state, keeping identity, number and
    /// creation time.
    pub fn replace_fields(&mut self, fields: HeaderFields, total_amount: Fixed, now: DateTime<Utc>) {
        self.fields = fields;
        self.total_amount = total_amount;
        self.updated_at = now;
    }
}

/// Header row about to be inserted; the store assigns the invoice number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInvoice {
    pub id: InvoiceId,
    pub fields: HeaderFields,
    pub total_amount: Fixed,
    pub created_at: DateTime<Utc>,
}

impl NewInvoice {
    pub fn into_invoice(self, invoice_number: i64) -> Invoice {
        Invoice {
            id: self.id,
            invoice_number,
            fields: self.fields,
            total_amount: self.total_amount,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

/// Persisted line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub header_id: InvoiceId,
    pub name: String,
    pub quantity: Fixed,
    pub price: Fixed,
    pub amount: Fixed,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Item {
    pub fn from_draft(draft: ItemDraft, header_id: InvoiceId, now: DateTime<Utc>) -> Self {
        Self {
            id: ItemId::new(),
            header_id,
            name: draft.name,
            quantity: draft.quantity,
            price: draft.price,
            amount: draft.amount,
            created_at: now,
            updated_at: now,
        }
    }

    /// The client-visible content, without identity or timestamps.
    pub fn to_draft(&self) -> ItemDraft {
        ItemDraft {
            name: self.name.clone(),
            quantity: self.quantity,
            price: self.price,
            amount: self.amount,
        }
    }
}

/// Persisted bill sundry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillSundry {
    pub id: BillSundryId,
    pub header_id: InvoiceId,
    pub name: String,
    pub amount: Fixed,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BillSundry {
    pub fn from_draft(draft: BillSundryDraft, header_id: InvoiceId, now: DateTime<Utc>) -> Self {
        Self {
            id: BillSundryId::new(),
            header_id,
            name: draft.name,
            amount: draft.amount,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn to_draft(&self) -> BillSundryDraft {
        BillSundryDraft {
            name: self.name.clone(),
            amount: self.amount,
        }
    }
}

/// Header joined with its full item and sundry sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceDocument {
    pub header: Invoice,
    pub items: Vec<Item>,
    pub bill_sundries: Vec<BillSundry>,
}

impl InvoiceDocument {
    /// Build the child rows for `header` from drafts, all stamped with `now`.
    pub fn assemble(
        header: Invoice,
        items: Vec<ItemDraft>,
        bill_sundries: Vec<BillSundryDraft>,
        now: DateTime<Utc>,
    ) -> Self {
        let header_id = header.id;
        Self {
            header,
            items: items
                .into_iter()
                .map(|d| Item::from_draft(d, header_id, now))
                .collect(),
            bill_sundries: bill_sundries
                .into_iter()
                .map(|d| BillSundry::from_draft(d, header_id, now))
                .collect(),
        }
    }
}
