//! Error handling for the pharmacy ledger server
//!
//! Ledger failures keep their stable codes; infrastructure failures are
//! reported without internal detail.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::LedgerError;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Domain errors
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    // Validation errors
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::ValidationError(errors.to_string())
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Structured numbers behind the failure (requested, available, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorDetail {
    fn new(code: &str, message: String) -> Self {
        Self {
            code: code.to_string(),
            message,
            field: None,
            details: None,
        }
    }
}

fn ledger_status(err: &LedgerError) -> StatusCode {
    match err {
        LedgerError::InsufficientStock { .. }
        | LedgerError::ExceedsBalance { .. }
        | LedgerError::OverPayment { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        LedgerError::InvalidQuantity(_)
        | LedgerError::InvalidInput(_)
        | LedgerError::InvalidPeriod(_) => StatusCode::BAD_REQUEST,
        LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
        LedgerError::PeriodClosed(_) | LedgerError::WrongPartyKind(_) => StatusCode::CONFLICT,
        LedgerError::InvariantViolation(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn ledger_details(err: &LedgerError) -> Option<serde_json::Value> {
    match err {
        LedgerError::InsufficientStock {
            requested,
            available,
            shortfall,
        } => Some(serde_json::json!({
            "requested": requested,
            "available": available,
            "shortfall": shortfall,
        })),
        LedgerError::ExceedsBalance { requested, balance } => Some(serde_json::json!({
            "requested": requested,
            "balance": balance,
        })),
        LedgerError::OverPayment {
            amount,
            outstanding,
        } => Some(serde_json::json!({
            "amount": amount,
            "outstanding": outstanding,
        })),
        _ => None,
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Ledger(err) => ledger_status(err),
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::Configuration(_)
            | AppError::DatabaseError(_)
            | AppError::Internal(_)
            | AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn detail(&self) -> ErrorDetail {
        match self {
            AppError::Ledger(LedgerError::InvariantViolation(_)) => ErrorDetail::new(
                "INVARIANT_VIOLATION",
                "The ledger rejected an inconsistent update".to_string(),
            ),
            AppError::Ledger(err) => ErrorDetail {
                details: ledger_details(err),
                ..ErrorDetail::new(err.code(), err.to_string())
            },
            AppError::ValidationError(msg) => ErrorDetail::new("VALIDATION_ERROR", msg.clone()),
            AppError::Configuration(msg) => {
                ErrorDetail::new("CONFIGURATION_ERROR", format!("Configuration error: {}", msg))
            }
            AppError::DatabaseError(_) => {
                ErrorDetail::new("DATABASE_ERROR", "A database error occurred".to_string())
            }
            AppError::Internal(_) | AppError::InternalError(_) => ErrorDetail::new(
                "INTERNAL_ERROR",
                "An internal server error occurred".to_string(),
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_detail = self.detail();

        // Log the error for debugging
        if status.is_server_error() {
            tracing::error!("Error: {:?}", self);
        } else {
            tracing::warn!("Rejected: {}", self);
        }

        (status, Json(ErrorResponse { error: error_detail })).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;
