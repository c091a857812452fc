use std::time::Duration;

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde::Serialize;
use std::error::Error as StdError;
use thiserror::Error;

use crate::logging::SecurityEvent;
use crate::models::ModelValidationError;

/// Centralized application error type shared by the store, the notes
/// service and the HTTP layer. Only the `IntoResponse` impl turns it into a
/// status code.
#[derive(Debug, Error)]
pub enum AppError {
    // Validation errors
    #[error("validation error: {0}")]
    Validation(String),

    // Authentication errors
    #[error("access denied: no token provided")]
    MissingToken,

    /// `reason` is logged server-side only.
    #[error("access denied: invalid token")]
    InvalidToken { reason: String },

    #[error("authenticated identity not found in request context")]
    MissingIdentity,

    // Resource errors
    #[error("{0} not found")]
    NotFound(&'static str),

    // Database errors
    #[error("database error")]
    Database(#[source] DieselError),

    #[error("connection pool error: {0}")]
    Pool(String),

    #[error("failed to encode authentication token: {0}")]
    TokenEncoding(String),

    // Rate limiting
    #[error("rate limit exceeded; please try again later")]
    RateLimitExceeded { retry_after: Option<Duration> },
}

/// Standard JSON error response structure
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl AppError {
    pub fn note_not_found() -> Self {
        AppError::NotFound("note")
    }

    pub fn attachment_not_found() -> Self {
        AppError::NotFound("attachment")
    }

    /// Maps a Diesel error to an appropriate AppError variant
    pub fn from_diesel(error: DieselError) -> Self {
        match error {
            DieselError::NotFound => AppError::NotFound("record"),
            DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _) => {
                AppError::Validation("referenced record does not exist".to_string())
            }
            other => AppError::Database(other),
        }
    }

    /// Determines the HTTP status code for this error
    pub(crate) fn status_code(&self) -> StatusCode {
        match self {
            // 4xx Client errors
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::MissingToken => StatusCode::UNAUTHORIZED,
            AppError::InvalidToken { .. } => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,

            // 5xx Server errors
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Pool(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::MissingIdentity => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::TokenEncoding(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client errors are always described; server errors only in debug
    /// builds.
    fn should_expose_details(&self) -> bool {
        cfg!(debug_assertions) || self.status_code().is_client_error()
    }

    /// Gets the user-facing error message
    fn user_message(&self) -> String {
        if self.should_expose_details() {
            return self.to_string();
        }

        match self {
            AppError::Database(_) => "a database error occurred".to_string(),
            AppError::Pool(_) => "service temporarily unavailable".to_string(),
            AppError::MissingIdentity | AppError::TokenEncoding(_) => {
                "authentication error".to_string()
            }
            _ => "internal server error".to_string(),
        }
    }

    /// Gets optional detailed error information
    /// Only included in debug builds
    fn error_details(&self) -> Option<String> {
        if !cfg!(debug_assertions) {
            return None;
        }

        match self {
            AppError::Database(err) => Some(format!("database: {}", err)),
            AppError::Pool(err) => Some(format!("connection pool: {}", err)),
            AppError::TokenEncoding(err) => Some(format!("token encoding: {}", err)),
            _ => None,
        }
    }

    /// Logs the error with appropriate context
    /// This allows internal errors to be logged even when not exposed to clients
    fn log_error(&self) {
        match self.status_code() {
            code if code.is_client_error() => match self {
                AppError::MissingToken => {
                    crate::log_security_event!(
                        SecurityEvent::MissingAuthHeader,
                        error = %self,
                        status_code = %code,
                        "Request without token rejected"
                    );
                }
                AppError::InvalidToken { reason } => {
                    crate::log_security_event!(
                        SecurityEvent::TokenValidationFailure,
                        reason = %reason,
                        status_code = %code,
                        "Token rejected"
                    );
                }
                _ => {
                    tracing::warn!(
                        error = %self,
                        status_code = %code,
                        "Client error"
                    );
                }
            },
            code if code.is_server_error() => {
                tracing::error!(
                    error = %self,
                    status_code = %code,
                    source = ?self.source(),
                    "Server error"
                );
            }
            _ => {}
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the error before converting to response
        self.log_error();

        let status = self.status_code();
        let body = Json(ErrorResponse {
            error: self.user_message(),
            details: self.error_details(),
        });

        let mut response = (status, body).into_response();

        if let AppError::RateLimitExceeded {
            retry_after: Some(retry_after),
        } = &self
        {
            let secs = retry_after.as_secs().max(1);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
        }

        response
    }
}

// Conversion implementations for common error types

impl From<DieselError> for AppError {
    fn from(error: DieselError) -> Self {
        AppError::from_diesel(error)
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(error: jsonwebtoken::errors::Error) -> Self {
        AppError::TokenEncoding(error.to_string())
    }
}

impl From<ModelValidationError> for AppError {
    fn from(error: ModelValidationError) -> Self {
        AppError::Validation(error.to_string())
    }
}
