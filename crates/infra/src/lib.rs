//! Infrastructure layer: storage backends, configuration, and the invoice
//! service that orchestrates validation and transactional persistence.

pub mod config;
pub mod db;
pub mod service;
pub mod store;

pub use config::{AppConfig, ConfigError, DatabaseConfig};
pub use db::Database;
pub use service::{InvoiceService, ServiceError};
pub use store::{InMemoryStore, PostgresStore, StoreError, StoreTransaction, TransactionalStore};
