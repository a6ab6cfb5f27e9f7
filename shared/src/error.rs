//! Error kinds raised by the ledger core

use rust_decimal::Decimal;
use thiserror::Error;

use crate::types::PeriodKey;

/// Typed failures returned by every ledger operation.
///
/// None of these are retried or swallowed by the core; the caller decides how
/// to surface them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Insufficient stock: requested {requested}, available {available}, short by {shortfall}")]
    InsufficientStock {
        requested: i64,
        available: i64,
        shortfall: i64,
    },

    #[error("Quantity {requested} exceeds current balance {balance}")]
    ExceedsBalance { requested: i64, balance: i64 },

    #[error("Payment of {amount} exceeds outstanding balance {outstanding}")]
    OverPayment {
        amount: Decimal,
        outstanding: Decimal,
    },

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    /// Malformed non-quantity input: dates, identifiers, payment fields
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Consignment period {0} is closed")]
    PeriodClosed(PeriodKey),

    #[error("Invalid period: {0}")]
    InvalidPeriod(String),

    #[error("Operation is not available for {0} parties")]
    WrongPartyKind(&'static str),

    #[error("Ledger invariant violated: {0}")]
    InvariantViolation(String),
}

impl LedgerError {
    /// Build an `InsufficientStock` error, deriving the shortfall
    pub fn insufficient_stock(requested: i64, available: i64) -> Self {
        LedgerError::InsufficientStock {
            requested,
            available,
            shortfall: requested - available,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            LedgerError::ExceedsBalance { .. } => "EXCEEDS_BALANCE",
            LedgerError::OverPayment { .. } => "OVER_PAYMENT",
            LedgerError::InvalidQuantity(_) => "INVALID_QUANTITY",
            LedgerError::InvalidInput(_) => "INVALID_INPUT",
            LedgerError::NotFound(_) => "NOT_FOUND",
            LedgerError::PeriodClosed(_) => "PERIOD_CLOSED",
            LedgerError::InvalidPeriod(_) => "INVALID_PERIOD",
            LedgerError::WrongPartyKind(_) => "WRONG_PARTY_KIND",
            LedgerError::InvariantViolation(_) => "INVARIANT_VIOLATION",
        }
    }
}

/// Result alias for ledger core operations
pub type LedgerResult<T> = Result<T, LedgerError>;
