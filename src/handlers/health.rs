use axum::{extract::State, response::Json};
use serde_json::{json, Value};

use crate::buffer::BufferStats;
use crate::middleware::ApiResponse;
use crate::server::AppState;

/// GET /health - liveness only; never touches the cache, key store or analytics store
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "ingestion",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /stats - write buffer depths and flush timing
pub async fn stats(State(state): State<AppState>) -> ApiResponse<BufferStats> {
    ApiResponse::success(state.buffer.stats())
}
