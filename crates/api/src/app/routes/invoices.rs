use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_invoices).post(create_invoice))
        .route(
            "/:id",
            get(get_invoice).put(update_invoice).delete(delete_invoice),
        )
}

/// Malformed JSON, a wrong content type and missing fields all surface as 400.
fn body_or_400(
    body: Result<Json<dto::InvoiceRequest>, JsonRejection>,
) -> Result<dto::InvoiceRequest, axum::response::Response> {
    body.map(|Json(req)| req)
        .map_err(|e| errors::json_error(StatusCode::BAD_REQUEST, "invalid_body", e.body_text()))
}

pub async fn create_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::InvoiceRequest>, JsonRejection>,
) -> axum::response::Response {
    let req = match body_or_400(body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.create(req.into()).await {
        Ok(doc) => (StatusCode::CREATED, Json(dto::created_to_json(&doc))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn update_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<dto::InvoiceRequest>, JsonRejection>,
) -> axum::response::Response {
    let invoice_id = match errors::parse_invoice_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let req = match body_or_400(body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.update(invoice_id, req.into()).await {
        Ok(doc) => (StatusCode::OK, Json(dto::invoice_to_json(&doc))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn delete_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let invoice_id = match errors::parse_invoice_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.delete(invoice_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let invoice_id = match errors::parse_invoice_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.get(invoice_id).await {
        Ok(doc) => (StatusCode::OK, Json(dto::invoice_to_json(&doc))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn list_invoices(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.list().await {
        Ok(docs) => {
            let invoices = docs.iter().map(dto::invoice_to_json).collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::Value::Array(invoices))).into_response()
        }
        Err(e) => errors::service_error_to_response(e),
    }
}
