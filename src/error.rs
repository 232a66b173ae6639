/// Unified error types for the lookup service
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the lookup core and its HTTP boundary
///
/// Provider failures are not represented here: they are absorbed into
/// `ProviderResult::status` and never cross the dispatcher boundary.
#[derive(Error, Debug)]
pub enum LookupError {
    /// Missing or invalid startup configuration (fatal)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Access guard refusal
    #[error("Lookup denied: {reason}")]
    AuthorizationDenied { reason: String },

    /// Inbound service token missing or wrong
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Malformed lookup input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Embedded migration failures
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LookupError {
    pub fn denied(reason: impl Into<String>) -> Self {
        LookupError::AuthorizationDenied {
            reason: reason.into(),
        }
    }
}

/// JSON error body returned to the chat layer
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl IntoResponse for LookupError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            LookupError::AuthorizationDenied { reason } => {
                (StatusCode::FORBIDDEN, "Forbidden", reason.clone())
            }
            LookupError::Authentication(_) => (
                StatusCode::UNAUTHORIZED,
                "AuthenticationRequired",
                self.to_string(),
            ),
            LookupError::Validation(_) => {
                (StatusCode::BAD_REQUEST, "InvalidRequest", self.to_string())
            }
            LookupError::Configuration(_)
            | LookupError::Database(_)
            | LookupError::Migration(_)
            | LookupError::Internal(_)
            | LookupError::Io(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                "Internal server error".to_string(), // Don't leak details
            ),
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for lookup operations
pub type LookupResult<T> = Result<T, LookupError>;
