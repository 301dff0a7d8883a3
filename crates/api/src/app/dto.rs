use serde::Deserialize;

use invoicer_core::Fixed;
use invoicer_invoicing::{
    BillSundry, BillSundryDraft, HeaderFields, InvoiceDocument, InvoiceDraft, Item, ItemDraft,
};

// -------------------------
// Request DTOs
// -------------------------

/// Body of `POST /api/invoices` and `PUT /api/invoices/:id`.
///
/// A client-supplied `invoiceNumber` (or any other unknown key) is ignored.
///
/// Amounts, quantities and prices are rounded half away from zero to two
/// decimals as they are read, and validation only ever sees the rounded
/// values. `quantity: 1.005` is checked as `1.01`; `quantity: 0.004` becomes
/// `0.00` and the item fails whichever rule the rounded values break first.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceRequest {
    pub date: String,
    pub customer_name: String,
    pub billing_address: String,
    pub shipping_address: String,
    pub gstin: String,
    pub total_amount: Fixed,
    pub items: Vec<ItemRequest>,
    pub bill_sundries: Vec<BillSundryRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRequest {
    pub item_name: String,
    pub quantity: Fixed,
    pub price: Fixed,
    pub amount: Fixed,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillSundryRequest {
    pub bill_sundry_name: String,
    pub amount: Fixed,
}

impl From<InvoiceRequest> for InvoiceDraft {
    fn from(req: InvoiceRequest) -> Self {
        InvoiceDraft {
            header: HeaderFields {
                date: req.date,
                customer_name: req.customer_name,
                billing_address: req.billing_address,
                shipping_address: req.shipping_address,
                gstin: req.gstin,
            },
            total_amount: req.total_amount,
            items: req
                .items
                .into_iter()
                .map(|i| ItemDraft {
                    name: i.item_name,
                    quantity: i.quantity,
                    price: i.price,
                    amount: i.amount,
                })
                .collect(),
            bill_sundries: req
                .bill_sundries
                .into_iter()
                .map(|s| BillSundryDraft {
                    name: s.bill_sundry_name,
                    amount: s.amount,
                })
                .collect(),
        }
    }
}

// -------------------------
// JSON mapping helpers
// -------------------------

pub fn created_to_json(doc: &InvoiceDocument) -> serde_json::Value {
    serde_json::json!({
        "message": "Invoice created successfully",
        "id": doc.header.id.to_string(),
        "invoiceNumber": doc.header.invoice_number,
    })
}

pub fn invoice_to_json(doc: &InvoiceDocument) -> serde_json::Value {
    let header = &doc.header;
    serde_json::json!({
        "id": header.id.to_string(),
        "invoiceNumber": header.invoice_number,
        "date": header.fields.date,
        "customerName": header.fields.customer_name,
        "billingAddress": header.fields.billing_address,
        "shippingAddress": header.fields.shipping_address,
        "gstin": header.fields.gstin,
        "totalAmount": header.total_amount,
        "createdAt": header.created_at,
        "updatedAt": header.updated_at,
        "items": doc.items.iter().map(item_to_json).collect::<Vec<_>>(),
        "billSundries": doc.bill_sundries.iter().map(bill_sundry_to_json).collect::<Vec<_>>(),
    })
}

fn item_to_json(item: &Item) -> serde_json::Value {
    serde_json::json!({
        "id": item.id.to_string(),
        "itemName": item.name,
        "quantity": item.quantity,
        "price": item.price,
        "amount": item.amount,
        "headerId": item.header_id.to_string(),
        "createdAt": item.created_at,
        "updatedAt": item.updated_at,
    })
}

fn bill_sundry_to_json(sundry: &BillSundry) -> serde_json::Value {
    serde_json::json!({
        "id": sundry.id.to_string(),
        "billSundryName": sundry.name,
        "amount": sundry.amount,
        "headerId": sundry.header_id.to_string(),
        "createdAt": sundry.created_at,
        "updatedAt": sundry.updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use invoicer_core::InvoiceId;
    use invoicer_invoicing::NewInvoice;

    #[test]
    fn request_accepts_numbers_and_strings_and_ignores_invoice_number() {
        let req: InvoiceRequest = serde_json::from_value(serde_json::json!({
            "date": "2024-06-01",
            "invoiceNumber": 999,
            "customerName": "Acme",
            "billingAddress": "1 Main St",
            "shippingAddress": "2 Side St",
            "gstin": "29ABCDE1234F1Z5",
            "totalAmount": "9.00",
            "items": [{ "itemName": "Widget", "quantity": 2, "price": 5.0, "amount": "10" }],
            "billSundries": [{ "billSundryName": "Discount", "amount": -1 }]
        }))
        .unwrap();

        let draft = InvoiceDraft::from(req);
        assert_eq!(draft.header.customer_name, "Acme");
        assert_eq!(draft.total_amount, Fixed::from_units(9));
        assert_eq!(draft.items[0].name, "Widget");
        assert_eq!(draft.items[0].amount, Fixed::from_units(10));
        assert_eq!(draft.bill_sundries[0].amount, Fixed::from_units(-1));
    }

    #[test]
    fn extra_decimals_are_rounded_before_validation() {
        let req: InvoiceRequest = serde_json::from_value(serde_json::json!({
            "date": "2024-06-01",
            "customerName": "Acme",
            "billingAddress": "1 Main St",
            "shippingAddress": "2 Side St",
            "gstin": "X",
            "totalAmount": 1010,
            "items": [
                { "itemName": "Bolt", "quantity": 1.005, "price": 1000, "amount": 1010 },
                { "itemName": "Dust", "quantity": "0.004", "price": 1, "amount": 0.004 }
            ],
            "billSundries": []
        }))
        .unwrap();

        let draft = InvoiceDraft::from(req);
        assert_eq!(draft.items[0].quantity, Fixed::from_hundredths(101));
        assert_eq!(draft.items[1].quantity, Fixed::ZERO);
        assert_eq!(draft.items[1].amount, Fixed::ZERO);
        assert_eq!(
            invoicer_invoicing::validate(&draft.items[..1], &[]).unwrap(),
            Fixed::from_units(1010)
        );
        assert_eq!(
            invoicer_invoicing::validate(&draft.items, &[])
                .unwrap_err()
                .to_string(),
            "Price, Quantity, and Amount must be greater than zero for item Dust"
        );
    }

    #[test]
    fn request_without_items_is_rejected() {
        let res = serde_json::from_value::<InvoiceRequest>(serde_json::json!({
            "date": "2024-06-01",
            "customerName": "Acme",
            "billingAddress": "1 Main St",
            "shippingAddress": "2 Side St",
            "gstin": "X",
            "totalAmount": 0,
            "billSundries": []
        }));
        assert!(res.is_err());
    }

    #[test]
    fn document_json_uses_camel_case_and_two_decimals() {
        let now = Utc::now();
        let header = NewInvoice {
            id: InvoiceId::new(),
            fields: HeaderFields {
                date: "2024-06-01".to_string(),
                customer_name: "Acme".to_string(),
                billing_address: "1 Main St".to_string(),
                shipping_address: "2 Side St".to_string(),
                gstin: "X".to_string(),
            },
            total_amount: Fixed::from_units(9),
            created_at: now,
        }
        .into_invoice(3);
        let doc = InvoiceDocument::assemble(
            header,
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
            now,
        );

        let json = invoice_to_json(&doc);
        assert_eq!(json["invoiceNumber"], 3);
        assert_eq!(json["customerName"], "Acme");
        assert_eq!(json["totalAmount"], "9.00");
        assert_eq!(json["items"][0]["itemName"], "Widget");
        assert_eq!(json["items"][0]["amount"], "10.00");
        assert_eq!(json["items"][0]["headerId"], doc.header.id.to_string());
        assert_eq!(json["billSundries"][0]["billSundryName"], "Discount");
        assert_eq!(json["billSundries"][0]["amount"], "-1.00");

        let created = created_to_json(&doc);
        assert_eq!(created["message"], "Invoice created successfully");
        assert_eq!(created["invoiceNumber"], 3);
    }
}
