use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::auth::{hash_api_key, AuthError};
use crate::error::ApiError;
use crate::limiter::RateLimitDecision;
use crate::server::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Resolve the `X-API-Key` header, then charge the key's quota
///
/// On success the resolved [`ApiKeyIdentity`](crate::types::ApiKeyIdentity) is
/// injected into request extensions. Invalid keys are rejected before the
/// limiter is consulted so they never consume quota.
pub async fn api_key_middleware(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let plaintext = match extract_api_key(request.headers()) {
        Ok(key) => key,
        Err(e) => return ApiError::from(e).into_response(),
    };

    let identity = match state.authority.resolve(&plaintext).await {
        Ok(identity) => identity,
        Err(e) => return ApiError::from(e).into_response(),
    };

    let decision = match &state.limiter {
        Some(limiter) => Some(limiter.check(&hash_api_key(&plaintext)).await),
        None => None,
    };

    if decision.as_ref().is_some_and(|d| !d.counted) {
        tracing::debug!(
            "Admitted key {} on network {} without counting; rate limiter unavailable",
            identity.key_id,
            identity.network_id
        );
    }

    let mut response = match &decision {
        Some(decision) if !decision.allowed => {
            tracing::info!(
                "Rate limit exceeded for key {} on network {}",
                identity.key_id,
                identity.network_id
            );
            ApiError::RateLimitExceeded.into_response()
        }
        _ => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
    };

    if let Some(decision) = &decision {
        apply_rate_limit_headers(response.headers_mut(), decision);
    }
    response
}

fn extract_api_key(headers: &HeaderMap) -> Result<String, AuthError> {
    let value = headers.get(API_KEY_HEADER).ok_or(AuthError::MissingKey)?;
    let key = value.to_str().map_err(|_| AuthError::InvalidFormat)?.trim();
    if key.is_empty() {
        return Err(AuthError::MissingKey);
    }
    Ok(key.to_string())
}

pub fn apply_rate_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert("x-ratelimit-limit", HeaderValue::from(decision.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
    headers.insert("x-ratelimit-reset", HeaderValue::from(decision.reset_at_millis()));
}
