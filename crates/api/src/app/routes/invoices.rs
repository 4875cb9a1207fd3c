use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Extension, Query, rejection::QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use tracing::info;

use invoicer_core::{CustomerId, InvoiceId};
use invoicer_infra::invoice_table::InvoiceTable;
use invoicer_infra::pointer_index::CustomerIndex;
use invoicer_invoicing::Invoice;

use crate::app::dto::{self, DownloadQuery, InvoiceCreated, ListInvoicesQuery};
use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_invoices).post(insert_invoice))
        .route("/download", get(download_invoice))
}

fn bad_query(rejection: QueryRejection) -> Response {
    errors::json_error(StatusCode::BAD_REQUEST, "invalid_query", rejection.body_text())
}

/// Body is decoded by hand so malformed JSON and invalid field values map to
/// distinct error codes.
pub async fn insert_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    body: Bytes,
) -> Response {
    let invoice: Invoice = match serde_json::from_slice(&body) {
        Ok(invoice) => invoice,
        Err(e) if e.is_data() => {
            return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string());
        }
        Err(e) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "decode_error", e.to_string());
        }
    };

    match services.invoices.insert(&invoice).await {
        Ok(_) => {
            info!(invoice_id = %invoice.invoice_id, customer_id = %invoice.customer_id, "invoice inserted");
            (
                StatusCode::CREATED,
                Json(InvoiceCreated {
                    invoice_id: invoice.invoice_id,
                }),
            )
                .into_response()
        }
        Err(e) => errors::table_error_to_response(e),
    }
}

pub async fn list_invoices(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<ListInvoicesQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(q) => q,
        Err(rejection) => return bad_query(rejection),
    };
    let Some(raw) = dto::required_param(query.customer_id) else {
        return errors::missing_parameter("customerId");
    };
    let customer_id = match CustomerId::new(raw) {
        Ok(id) => id,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.customers.query_by_customer(&customer_id).await {
        Ok(invoices) => Json(invoices).into_response(),
        Err(e) => errors::index_error_to_response(e),
    }
}

pub async fn download_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<DownloadQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(q) => q,
        Err(rejection) => return bad_query(rejection),
    };
    let Some(raw) = dto::required_param(query.invoice_id) else {
        return errors::missing_parameter("InvoiceID");
    };
    let invoice_id = match InvoiceId::new(raw) {
        Ok(id) => id,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.resolver.resolve(&invoice_id).await {
        Ok(presigned) => Json(presigned).into_response(),
        Err(e) => errors::resolve_error_to_response(e),
    }
}
