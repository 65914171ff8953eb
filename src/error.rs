// HTTP API Error Types
use axum::{extract::rejection::JsonRejection, http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::auth::AuthError;
use crate::buffer::BufferError;
use crate::events::ValidationError;

/// HTTP API error; clients only ever see the stable code, never the detail
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    ValidationError(String),
    InvalidJson(String),
    InvalidBatch(String),
    BatchTooLarge { count: usize, max: usize },

    // 401 Unauthorized
    InvalidApiKey(String),

    // 404 Not Found
    NotFound(String),

    // 429 Too Many Requests
    RateLimitExceeded,

    // 500 Internal Server Error
    InternalServerError(String),

    // 503 Service Unavailable
    BufferFull(String),
    ServiceUnavailable(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::ValidationError(_) => 400,
            ApiError::InvalidJson(_) => 400,
            ApiError::InvalidBatch(_) => 400,
            ApiError::BatchTooLarge { .. } => 400,
            ApiError::InvalidApiKey(_) => 401,
            ApiError::NotFound(_) => 404,
            ApiError::RateLimitExceeded => 429,
            ApiError::InternalServerError(_) => 500,
            ApiError::BufferFull(_) => 503,
            ApiError::ServiceUnavailable(_) => 503,
        }
    }

    /// Detail for logs only
    pub fn message(&self) -> String {
        match self {
            ApiError::ValidationError(msg)
            | ApiError::InvalidJson(msg)
            | ApiError::InvalidBatch(msg)
            | ApiError::InvalidApiKey(msg)
            | ApiError::NotFound(msg)
            | ApiError::InternalServerError(msg)
            | ApiError::BufferFull(msg)
            | ApiError::ServiceUnavailable(msg) => msg.clone(),
            ApiError::BatchTooLarge { count, max } => {
                format!("Batch of {} events exceeds the maximum of {}", count, max)
            }
            ApiError::RateLimitExceeded => "Rate limit exceeded".to_string(),
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::ValidationError(_) => "VALIDATION_ERROR",
            ApiError::InvalidJson(_) => "INVALID_JSON",
            ApiError::InvalidBatch(_) => "INVALID_BATCH",
            ApiError::BatchTooLarge { .. } => "BATCH_TOO_LARGE",
            ApiError::InvalidApiKey(_) => "INVALID_API_KEY",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::BufferFull(_) => "BUFFER_FULL",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        json!({
            "success": false,
            "error": self.error_code()
        })
    }
}

impl ApiError {
    pub fn validation_error(message: impl Into<String>) -> Self {
        ApiError::ValidationError(message.into())
    }

    pub fn invalid_json(message: impl Into<String>) -> Self {
        ApiError::InvalidJson(message.into())
    }

    pub fn invalid_batch(message: impl Into<String>) -> Self {
        ApiError::InvalidBatch(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Unavailable(msg) => {
                tracing::error!("API key lookup unavailable: {}", msg);
                ApiError::service_unavailable("Key lookup unavailable")
            }
            other => ApiError::InvalidApiKey(other.to_string()),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::validation_error(err.to_string())
    }
}

impl From<BufferError> for ApiError {
    fn from(err: BufferError) -> Self {
        tracing::warn!("Rejecting event: {}", err);
        ApiError::BufferFull(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::invalid_json(rejection.body_text())
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_client_error() {
            tracing::debug!("{} {}: {}", status.as_u16(), self.error_code(), self.message());
        }
        (status, Json(self.to_json())).into_response()
    }
}
