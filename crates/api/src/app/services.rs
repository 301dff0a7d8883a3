use std::sync::Arc;

use tracing::info;

use invoicer_core::InvoiceId;
use invoicer_infra::{
    AppConfig, Database, InMemoryStore, InvoiceService, PostgresStore, ServiceError, StoreError,
};
use invoicer_invoicing::{InvoiceDocument, InvoiceDraft};

/// Backend the HTTP layer talks to.
///
/// Postgres when a database is configured, in-memory otherwise.
#[derive(Debug, Clone)]
pub enum AppServices {
    InMemory {
        invoices: Arc<InvoiceService<InMemoryStore>>,
    },
    Postgres {
        invoices: Arc<InvoiceService<PostgresStore>>,
        db: Database,
    },
}

/// Run the same expression against whichever service variant is active.
macro_rules! with_service {
    ($services:expr, $svc:ident => $body:expr) => {
        match $services {
            AppServices::InMemory { invoices: $svc } => $body,
            AppServices::Postgres { invoices: $svc, .. } => $body,
        }
    };
}

impl AppServices {
    pub fn in_memory() -> Self {
        AppServices::InMemory {
            invoices: Arc::new(InvoiceService::new(InMemoryStore::new())),
        }
    }

    /// Connect to Postgres and create the schema, or fall back to the
    /// in-memory store when no database is configured.
    pub async fn from_config(config: &AppConfig) -> Result<Self, StoreError> {
        let Some(db_config) = &config.database else {
            info!("no database configured; using in-memory store");
            return Ok(Self::in_memory());
        };

        let db = Database::connect(db_config).await?;
        db.ensure_schema().await?;
        Ok(AppServices::Postgres {
            invoices: Arc::new(InvoiceService::new(PostgresStore::new(&db))),
            db,
        })
    }

    pub fn backend(&self) -> &'static str {
        match self {
            AppServices::InMemory { .. } => "memory",
            AppServices::Postgres { .. } => "postgres",
        }
    }

    pub async fn create(&self, draft: InvoiceDraft) -> Result<InvoiceDocument, ServiceError> {
        with_service!(self, svc => svc.create(draft).await)
    }

    pub async fn update(
        &self,
        id: InvoiceId,
        draft: InvoiceDraft,
    ) -> Result<InvoiceDocument, ServiceError> {
        with_service!(self, svc => svc.update(id, draft).await)
    }

    pub async fn delete(&self, id: InvoiceId) -> Result<(), ServiceError> {
        with_service!(self, svc => svc.delete(id).await)
    }

    pub async fn get(&self, id: InvoiceId) -> Result<InvoiceDocument, ServiceError> {
        with_service!(self, svc => svc.get(id).await)
    }

    pub async fn list(&self) -> Result<Vec<InvoiceDocument>, ServiceError> {
        with_service!(self, svc => svc.list().await)
    }

    /// Liveness check of the backing store.
    pub async fn health(&self) -> Result<(), StoreError> {
        match self {
            AppServices::InMemory { .. } => Ok(()),
            AppServices::Postgres { db, .. } => db.health_check().await,
        }
    }

    /// Release backend resources. Called once on shutdown.
    pub async fn close(&self) {
        if let AppServices::Postgres { db, .. } = self {
            db.close().await;
        }
    }
}
