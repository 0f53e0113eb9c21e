//! # Error Handling
//!
//! Error types for the HTTP surface and how they are turned into JSON responses.
//!
//! Frame-level problems (empty or misaligned audio buffers) are not represented here:
//! they never leave the analysis pipeline and are reported as "no result" instead.
//! See `analysis::decoder::FrameError`.
//!
//! ## Key Rust Concepts:
//! - **enum variants**: Each variant is one kind of failure, carrying a message
//! - **Display trait**: Human-readable formatting of the error
//! - **ResponseError trait**: actix-web calls this to build the HTTP response
//! - **From trait**: Lets `?` convert other error types into `AppError`

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Custom error types for the HTTP handlers.
///
/// ## Error Categories:
/// - **Internal**: Server-side problems (500)
/// - **BadRequest**: Client sent an invalid request, e.g. a failed WebSocket handshake (400)
/// - **ServiceUnavailable**: Session capacity is exhausted (503)
#[derive(Debug)]
pub enum AppError {
    Internal(String),
    BadRequest(String),
    ServiceUnavailable(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
        }
    }
}

impl AppError {
    fn kind(&self) -> &'static str {
        match self {
            AppError::Internal(_) => "internal_error",
            AppError::BadRequest(_) => "bad_request",
            AppError::ServiceUnavailable(_) => "service_unavailable",
        }
    }

    fn message(&self) -> &str {
        match self {
            AppError::Internal(msg)
            | AppError::BadRequest(msg)
            | AppError::ServiceUnavailable(msg) => msg,
        }
    }
}

/// Converts errors into JSON HTTP responses.
///
/// ## JSON Response Format:
/// ```json
/// {
///   "error": {
///     "type": "service_unavailable",
///     "message": "Maximum concurrent sessions (32) reached",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
impl ResponseError for AppError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;
        match self {
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": {
                "type": self.kind(),
                "message": self.message(),
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

/// `?` on an anyhow error inside a handler becomes a 500.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// Shorthand for `Result<T, AppError>`.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::ServiceUnavailable("full".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(AppError::BadRequest("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::from(anyhow::anyhow!("boom")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_display() {
        let err = AppError::ServiceUnavailable("Maximum concurrent sessions (2) reached".into());
        assert_eq!(
            err.to_string(),
            "Service unavailable: Maximum concurrent sessions (2) reached"
        );
    }
}
