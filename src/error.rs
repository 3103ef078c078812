//! Error types for oauth-profile
//!
//! All errors in the application are converted to `AppError`,
//! which implements `IntoResponse` for proper HTTP error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Application-wide error type
///
/// Normalization errors (`UnsupportedProvider`, `MissingIdentity`,
/// `MissingEmail`, `MissingLogin`) describe a malformed or unsupported
/// provider response and are not retryable. `Database` covers store-level
/// failures. `UniqueConstraintRace` is raised by the data layer when a
/// concurrent login already bound the same external identity; the
/// reconciler converts it into a re-read.
#[derive(Debug, Error)]
pub enum AppError {
    /// Provider name is not GOOGLE/GITHUB, or the provider is not configured (404)
    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    /// Claims carry no subject identifier (401)
    #[error("Could not find provider user ID")]
    MissingIdentity,

    /// Claims carry no email and the provider has no fallback (401)
    #[error("Email not found from OAuth2 provider")]
    MissingEmail,

    /// GitHub claims carry neither email nor login (401)
    #[error("Neither email nor login found from GitHub")]
    MissingLogin,

    /// User record not found for the authenticated caller (404)
    #[error("User not found")]
    UserNotFound,

    /// The (provider, provider user id) pair was bound concurrently (500)
    #[error("Provider identity was linked concurrently")]
    UniqueConstraintRace,

    /// Authentication required (401)
    #[error("Authentication required")]
    Unauthorized,

    /// Signature verification failed (401)
    #[error("Invalid signature")]
    InvalidSignature,

    /// Validation error (400)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Database error (500)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP client error (502)
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Identity provider returned an unusable response (502)
    #[error("Provider error: {0}")]
    Provider(String),

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Signing error (500)
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Whether this error was produced while normalizing provider claims.
    pub fn is_normalization_error(&self) -> bool {
        matches!(
            self,
            AppError::UnsupportedProvider(_)
                | AppError::MissingIdentity
                | AppError::MissingEmail
                | AppError::MissingLogin
        )
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl IntoResponse for AppError {
    /// Convert error to HTTP response
    ///
    /// Maps each error variant to appropriate HTTP status code
    /// and JSON error body.
    fn into_response(self) -> Response {
        use axum::Json;

        let (status, error_message, error_type) = match &self {
            AppError::UnsupportedProvider(_) => (
                StatusCode::NOT_FOUND,
                self.to_string(),
                "unsupported_provider",
            ),
            AppError::MissingIdentity => (
                StatusCode::UNAUTHORIZED,
                self.to_string(),
                "missing_identity",
            ),
            AppError::MissingEmail => {
                (StatusCode::UNAUTHORIZED, self.to_string(), "missing_email")
            }
            AppError::MissingLogin => {
                (StatusCode::UNAUTHORIZED, self.to_string(), "missing_login")
            }
            AppError::UserNotFound => (StatusCode::NOT_FOUND, self.to_string(), "user_not_found"),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string(), "unauthorized"),
            AppError::InvalidSignature => (
                StatusCode::UNAUTHORIZED,
                self.to_string(),
                "invalid_signature",
            ),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone(), "validation"),
            AppError::HttpClient(_) => (StatusCode::BAD_GATEWAY, self.to_string(), "http_client"),
            AppError::Provider(msg) => (StatusCode::BAD_GATEWAY, msg.clone(), "provider"),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Database error".to_string(),
                "database",
            ),
            AppError::UniqueConstraintRace => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Database error".to_string(),
                "unique_constraint_race",
            ),
            AppError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone(), "config"),
            AppError::Encryption(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone(), "encryption")
            }
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                "internal",
            ),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, error_type, "Request failed");
        }

        use crate::metrics::ERRORS_TOTAL;
        ERRORS_TOTAL.with_label_values(&[error_type]).inc();

        let body = Json(serde_json::json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
