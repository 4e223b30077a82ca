//! API error types and handling

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::auth::{CredentialError, PasswordError};
use gatewiki_shared::StoreError;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    // Authentication errors
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Please confirm your email address before logging in")]
    NeedsConfirmation,
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Authentication required")]
    Unauthorized,
    #[error("Invalid CSRF token")]
    CsrfRejected,

    // Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),

    // Resource errors
    #[error("Resource not found")]
    NotFound,
    #[error("{0}")]
    Conflict(String),

    // Rate limiting and lockout, both carry a retry hint in seconds
    #[error("Too many requests")]
    RateLimited(u64),
    #[error("Account temporarily locked")]
    AccountLocked(u64),

    // Internal errors
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Internal server error")]
    Internal,
    #[error("Service unavailable")]
    ServiceUnavailable,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // Authentication. Invalid credentials and unknown accounts
            // share one message so responses do not leak which emails
            // are registered.
            ApiError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS", self.to_string()),
            ApiError::NeedsConfirmation => (StatusCode::UNAUTHORIZED, "NEEDS_CONFIRMATION", self.to_string()),
            ApiError::InvalidToken => (StatusCode::BAD_REQUEST, "INVALID_TOKEN", self.to_string()),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", self.to_string()),
            ApiError::CsrfRejected => (StatusCode::FORBIDDEN, "CSRF_REJECTED", self.to_string()),

            // Validation
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),

            // Resources
            ApiError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),

            // Rate limiting
            ApiError::RateLimited(_) => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED", self.to_string()),
            ApiError::AccountLocked(_) => (StatusCode::TOO_MANY_REQUESTS, "ACCOUNT_LOCKED", self.to_string()),

            // Internal
            ApiError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR", "Storage error".to_string()),
            ApiError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", self.to_string()),
            ApiError::ServiceUnavailable => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", self.to_string()),
        };

        let retry_after = match &self {
            ApiError::RateLimited(secs) | ApiError::AccountLocked(secs) => Some(*secs),
            _ => None,
        };

        let mut payload = json!({
            "error": {
                "code": code,
                "message": message,
            }
        });
        // Clients branch on this to offer a "resend confirmation" path
        if matches!(self, ApiError::NeedsConfirmation) {
            payload["needsConfirmation"] = json!(true);
        }
        let body = Json(payload);

        match retry_after {
            Some(secs) => {
                (status, [(header::RETRY_AFTER, secs.to_string())], body).into_response()
            }
            None => (status, body).into_response(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        tracing::error!("Storage error: {:?}", err);
        match err {
            StoreError::Unreachable(_) => ApiError::ServiceUnavailable,
            StoreError::Corrupt { .. } | StoreError::Internal(_) => {
                ApiError::Storage(err.to_string())
            }
        }
    }
}

impl From<CredentialError> for ApiError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::DuplicateEmail => {
                ApiError::Conflict("Email already registered".to_string())
            }
            CredentialError::DuplicateUsername => {
                ApiError::Conflict("Username already taken".to_string())
            }
            CredentialError::Hash(e) => {
                tracing::error!("Password hashing error: {:?}", e);
                ApiError::Internal
            }
            CredentialError::Store(e) => e.into(),
        }
    }
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        tracing::error!("Password hashing error: {:?}", err);
        ApiError::Internal
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn test_rate_limited_carries_retry_after_header() {
        let response = ApiError::RateLimited(120).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).unwrap(),
            "120"
        );
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let response = ApiError::InvalidCredentials.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "INVALID_CREDENTIALS");
        assert_eq!(body["error"]["message"], "Invalid credentials");
    }

    #[tokio::test]
    async fn test_needs_confirmation_sets_flag() {
        let response = ApiError::NeedsConfirmation.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["needsConfirmation"], true);
        assert_eq!(body["error"]["code"], "NEEDS_CONFIRMATION");
    }

    #[tokio::test]
    async fn test_store_unreachable_maps_to_503() {
        let err: ApiError = StoreError::Unreachable("connection refused".to_string()).into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
