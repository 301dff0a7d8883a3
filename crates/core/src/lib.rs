//! `invoicer-core`: shared building blocks.
//!
//! This crate contains **pure** primitives (no infrastructure concerns).

pub mod error;
pub mod fixed;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use fixed::Fixed;
pub use id::{BillSundryId, InvoiceId, ItemId};
