//! Transactional storage boundary for invoice documents.
//!
//! Three related record sets (headers, items, bill sundries) keyed by the
//! owning header id. Writes go through a transaction so an invoice and its
//! children are visible all together or not at all.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use r#trait::{StoreError, StoreTransaction, TransactionalStore};
