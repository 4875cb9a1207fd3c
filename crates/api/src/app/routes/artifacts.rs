use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Path, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::Utc;
use tracing::{debug, error};

use invoicer_infra::artifact_store::{ArtifactStore, SignatureError, StorageKey};

use crate::app::dto::ArtifactQuery;
use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new().route("/:key", get(fetch_artifact))
}

fn forbidden(code: &'static str, message: &str) -> Response {
    errors::json_error(StatusCode::FORBIDDEN, code, message)
}

/// Serves an artifact to the holder of a valid presigned URL.
pub async fn fetch_artifact(
    Extension(services): Extension<Arc<AppServices>>,
    Path(key): Path<String>,
    Query(query): Query<ArtifactQuery>,
) -> Response {
    let Ok(key) = StorageKey::parse(key) else {
        return errors::json_error(StatusCode::NOT_FOUND, "not_found", "no such artifact");
    };
    let (Some(expires), Some(signature)) = (query.expires, query.signature) else {
        return forbidden("invalid_signature", "missing signature");
    };

    match services.signer.verify(&key, expires, &signature, Utc::now()) {
        Ok(()) => {}
        Err(SignatureError::Expired) => return forbidden("expired_url", "presigned url expired"),
        Err(SignatureError::BadSignature) => {
            debug!(key = %key, "rejected artifact request with bad signature");
            return forbidden("invalid_signature", "signature mismatch");
        }
    }

    match services.artifacts.get(&key).await {
        Ok(Some(bytes)) => {
            ([(header::CONTENT_TYPE, services.content_type)], bytes).into_response()
        }
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "no such artifact"),
        Err(e) => {
            error!(key = %key, error = %e, "artifact read failed");
            errors::internal_error()
        }
    }
}
