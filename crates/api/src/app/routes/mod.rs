use axum::Router;

pub mod admin;
pub mod artifacts;
pub mod invoices;
pub mod system;

pub fn router() -> Router {
    Router::new()
        .nest("/invoices", invoices::router())
        .nest("/artifacts", artifacts::router())
        .nest("/admin", admin::router())
}
