//! Error types for Comment Service
//!
//! Every failure surfaces to API clients as a JSON body `{"error": msg}`
//! with the matching status code. Storage errors carry a generic message
//! only; the underlying detail is logged server-side where the error is
//! mapped, never returned to the caller.

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use std::fmt;

/// Result type for comment-service operations
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error types
#[derive(Debug)]
pub enum AppError {
    /// Malformed input (empty/too-long body, parent constraint violations)
    Validation(String),

    /// Referenced resource does not exist
    NotFound(String),

    /// No valid caller session
    Unauthorized(String),

    /// An outbound call exceeded its deadline
    Timeout(String),

    /// Storage operation failed for a reason other than timeout
    Storage(String),

    /// Internal server error
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(msg)
            | AppError::NotFound(msg)
            | AppError::Unauthorized(msg)
            | AppError::Timeout(msg)
            | AppError::Storage(msg)
            | AppError::Internal(msg) => write!(f, "{}", msg),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Storage(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": self.to_string(),
        }))
    }
}
