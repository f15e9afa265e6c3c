//! Ledger API — error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ledger_core::error::LedgerError;
use serde::Serialize;
use thiserror::Error;

/// Startup and runtime errors for the API server.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required environment variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Database connection or pool error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Applying migrations failed.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Network binding or I/O error.
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),

    /// The tracing pipeline could not be installed.
    #[error("telemetry error: {0}")]
    Telemetry(String),
}

/// JSON body returned for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: &'static str,
    /// Human-readable error message.
    pub message: String,
}

/// HTTP-layer wrapper around `LedgerError` that implements `IntoResponse`.
#[derive(Debug)]
pub struct ApiError(pub LedgerError);

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self.0 {
            LedgerError::UserNotFound(_) => (StatusCode::NOT_FOUND, "user_not_found"),
            LedgerError::UnknownNotification(_) => {
                (StatusCode::NOT_FOUND, "unknown_notification")
            }
            LedgerError::AlreadyExists(_) => (StatusCode::CONFLICT, "already_exists"),
            LedgerError::NegativeAmount(_) => (StatusCode::BAD_REQUEST, "negative_amount"),
            LedgerError::UnknownCommand(_) => (StatusCode::BAD_REQUEST, "unknown_command"),
            LedgerError::MissingField { .. } => (StatusCode::BAD_REQUEST, "missing_field"),
            LedgerError::InvalidEvent(_) => (StatusCode::BAD_REQUEST, "invalid_event"),
            LedgerError::NegativeBalance { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "negative_balance")
            }
            LedgerError::BalanceOverflow(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "balance_overflow")
            }
            LedgerError::Timeout => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            LedgerError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
            LedgerError::Messaging(_) => (StatusCode::INTERNAL_SERVER_ERROR, "messaging_error"),
        };

        let body = ErrorBody {
            error: error_code,
            message: self.0.to_string(),
        };

        (status, Json(body)).into_response()
    }
}
