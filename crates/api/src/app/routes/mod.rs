use axum::Router;

pub mod invoices;
pub mod system;

/// Router for everything served under `/api`.
pub fn router() -> Router {
    Router::new().nest("/invoices", invoices::router())
}
