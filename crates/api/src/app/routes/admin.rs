use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Query, rejection::QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};

use invoicer_infra::seed::seed_invoices;

use crate::app::dto::SeedQuery;
use crate::app::errors;
use crate::app::services::AppServices;

const DEFAULT_SEED_COUNT: usize = 100;
const MAX_SEED_COUNT: usize = 10_000;

pub fn router() -> Router {
    Router::new().route("/seed", post(seed))
}

/// Insert mock invoices `INV1..=INVn` through the normal write path.
pub async fn seed(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<SeedQuery>, QueryRejection>,
) -> Response {
    let count = match query {
        Ok(Query(q)) => q.count.unwrap_or(DEFAULT_SEED_COUNT),
        Err(rejection) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_query", rejection.body_text());
        }
    };
    if count > MAX_SEED_COUNT {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            format!("count must be at most {MAX_SEED_COUNT}"),
        );
    }

    match seed_invoices(services.invoices.as_ref(), count).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => errors::table_error_to_response(e),
    }
}
