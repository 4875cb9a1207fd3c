use std::sync::Arc;

use axum::{Json, extract::Extension};
use serde_json::{Value, json};

use crate::app::services::AppServices;

pub async fn health(Extension(services): Extension<Arc<AppServices>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "region": services.region,
    }))
}
