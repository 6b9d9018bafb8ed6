use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::geo::RedactionError;

/// Application-wide error types with appropriate HTTP status codes.
///
/// Handlers return these and the dispatcher is the only place that turns
/// them into responses. Access-control variants carry no message because
/// their responses have an empty body.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("authorization required")]
    Unauthorized,

    #[error("access denied")]
    Forbidden,

    #[error("host not allowed")]
    HostNotAllowed,

    #[error("{0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed archive data: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Upstream request failed: {0}")]
    Upstream(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status code for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::HostNotAllowed | AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ConfigError(_)
            | AppError::Io(_)
            | AppError::Serialization(_)
            | AppError::Upstream(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the response for this error has an empty body.
    fn is_bodyless(&self) -> bool {
        matches!(
            self,
            AppError::Unauthorized | AppError::Forbidden | AppError::HostNotAllowed
        )
    }
}

/// Error response body for API endpoints.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }

        if self.is_bodyless() {
            return status.into_response();
        }

        let message = match &self {
            // Missing files are reported without leaking server paths
            AppError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => {
                "archive data is unavailable".to_string()
            }
            AppError::Io(_) | AppError::Serialization(_) | AppError::Internal(_) => {
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        (status, axum::Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<RedactionError> for AppError {
    fn from(e: RedactionError) -> Self {
        AppError::ConfigError(e.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
