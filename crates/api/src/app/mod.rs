//! HTTP application wiring (Axum router + service wiring).
//!
//! - `services.rs`: storage backends, change feed, dispatcher and worker
//! - `routes/`: handlers, one file per area
//! - `dto.rs`: query parameter and response shapes
//! - `errors.rs`: consistent JSON error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::{AppRuntime, AppServices, build_services};

/// Build the full HTTP router around already-wired services.
pub fn build_app(services: Arc<AppServices>) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router())
        .layer(ServiceBuilder::new().layer(Extension(services)))
}
