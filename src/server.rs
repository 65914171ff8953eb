use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::auth::KeyAuthority;
use crate::buffer::WriteBuffer;
use crate::error::ApiError;
use crate::events::Normalizer;
use crate::handlers;
use crate::limiter::RateLimiter;
use crate::middleware::api_key_middleware;

/// Shared handles for handlers and middleware
#[derive(Clone)]
pub struct AppState {
    pub authority: Arc<KeyAuthority>,
    /// `None` when rate limiting is disabled
    pub limiter: Option<Arc<RateLimiter>>,
    pub normalizer: Normalizer,
    pub buffer: Arc<WriteBuffer>,
    pub max_batch_events: usize,
    pub max_body_bytes: usize,
}

pub fn app(state: AppState) -> Router {
    let max_body_bytes = state.max_body_bytes;

    Router::new()
        // Public
        .route("/health", get(handlers::health))
        .route("/stats", get(handlers::stats))
        // API key + admission
        .merge(session_routes(state.clone()))
        .fallback(not_found)
        .with_state(state)
        // Global middleware
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

fn session_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/session/start", post(handlers::session_start))
        .route("/session/end", post(handlers::session_end))
        .route("/session/gamemode", post(handlers::session_gamemode))
        .route("/session/batch", post(handlers::session_batch))
        .route("/session/auth", get(handlers::auth_info))
        .route_layer(from_fn_with_state(state, api_key_middleware))
}

async fn not_found() -> ApiError {
    ApiError::not_found("Route not found")
}
