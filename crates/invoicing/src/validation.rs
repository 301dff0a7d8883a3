//! Arithmetic consistency checks for invoice documents.
//!
//! All checks are pure and run before any storage resource is acquired.

use invoicer_core::{DomainError, DomainResult, Fixed};

use crate::invoice::{BillSundryDraft, InvoiceDraft, ItemDraft};

/// Validate items and compute the document total.
///
/// Items are checked in submission order and the first failure is reported:
/// - `amount` must equal `quantity * price` within 0.01,
/// - `quantity`, `price` and `amount` must all be positive.
///
/// Sundries are signed adjustments and carry no constraint of their own.
pub fn validate(items: &[ItemDraft], bill_sundries: &[BillSundryDraft]) -> DomainResult<Fixed> {
    for item in items {
        let expected = item.quantity.mul_exact(item.price);
        if !expected.matches(item.amount) {
            return Err(DomainError::validation(format!(
                "Invalid amount for item {}. Expected: {}, Got: {}",
                item.name, expected, item.amount
            )));
        }
        if !item.price.is_positive() || !item.quantity.is_positive() || !item.amount.is_positive() {
            return Err(DomainError::validation(format!(
                "Price, Quantity, and Amount must be greater than zero for item {}",
                item.name
            )));
        }
    }

    let amounts = items
        .iter()
        .map(|i| i.amount)
        .chain(bill_sundries.iter().map(|s| s.amount));
    Fixed::checked_sum(amounts).ok_or_else(|| DomainError::validation("invoice total overflow"))
}

/// Compare a computed total with the one the client supplied.
pub fn check_total(computed: Fixed, supplied: Fixed) -> DomainResult<()> {
    if computed.within_tolerance(supplied) {
        Ok(())
    } else {
        Err(DomainError::validation(format!(
            "Invalid total amount. Expected: {computed}, Got: {supplied}"
        )))
    }
}

/// Run [`validate`] and [`check_total`] over a full draft, returning the
/// computed total.
pub fn validate_document(draft: &InvoiceDraft) -> DomainResult<Fixed> {
    let computed = validate(&draft.items, &draft.bill_sundries)?;
    check_total(computed, draft.total_amount)?;
    Ok(computed)
}
