use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

use invoicer_core::DomainError;
use invoicer_infra::invoice_table::TableError;
use invoicer_infra::pointer_index::IndexError;
use invoicer_infra::resolver::ResolveError;

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn internal_error() -> Response {
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal error")
}

pub fn missing_parameter(name: &str) -> Response {
    json_error(
        StatusCode::BAD_REQUEST,
        "missing_parameter",
        format!("query parameter {name} is required"),
    )
}

pub fn domain_error_to_response(err: DomainError) -> Response {
    json_error(StatusCode::BAD_REQUEST, "validation_error", err.to_string())
}

pub fn table_error_to_response(err: TableError) -> Response {
    match err {
        TableError::Conflict(id) => json_error(
            StatusCode::CONFLICT,
            "conflict",
            format!("invoice {id} already exists"),
        ),
        TableError::Publish(reason) => {
            error!(error = %reason, "invoice stored but change event not published");
            json_error(StatusCode::BAD_GATEWAY, "publish_error", "change feed unavailable")
        }
        other => {
            error!(error = %other, "invoice table failure");
            internal_error()
        }
    }
}

pub fn index_error_to_response(err: IndexError) -> Response {
    error!(error = %err, "customer index failure");
    internal_error()
}

pub fn resolve_error_to_response(err: ResolveError) -> Response {
    match err {
        ResolveError::NotFound(id) => json_error(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("no document for invoice {id}"),
        ),
        // Already logged by the resolver.
        ResolveError::Internal => internal_error(),
    }
}
