//! Health check endpoint

use axum::{routing::get, Json, Router};

/// Build the health router
pub fn router() -> Router {
    Router::new().route("/health", get(health))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
