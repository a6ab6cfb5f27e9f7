//! Validation utilities for the inventory ledger
//!
//! Input checks return a short message; callers lift it into the matching
//! `LedgerError` kind.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::error::LedgerError;

/// Earliest and latest year accepted for a billing period
pub const MIN_PERIOD_YEAR: i32 = 2000;
pub const MAX_PERIOD_YEAR: i32 = 2100;

/// Largest unit count accepted in a single movement
pub const MAX_QUANTITY: i64 = 1_000_000_000;

/// Largest unit price, unit cost or payment amount accepted
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(3_567_587_328, 232, 0, false, 0);

// ============================================================================
// Quantity and Money
// ============================================================================

/// Validate a unit quantity is strictly positive
pub fn validate_quantity(quantity: i64) -> Result<(), &'static str> {
    if quantity <= 0 {
        return Err("Quantity must be greater than zero");
    }
    if quantity > MAX_QUANTITY {
        return Err("Quantity exceeds the largest accepted movement");
    }
    Ok(())
}

/// Validate a unit price or cost is not negative
pub fn validate_unit_price(price: Decimal) -> Result<(), &'static str> {
    if price < Decimal::ZERO {
        return Err("Unit price cannot be negative");
    }
    if price > MAX_AMOUNT {
        return Err("Unit price exceeds the largest accepted amount");
    }
    Ok(())
}

/// Validate a payment amount is strictly positive
pub fn validate_payment_amount(amount: Decimal) -> Result<(), &'static str> {
    if amount <= Decimal::ZERO {
        return Err("Payment amount must be greater than zero");
    }
    if amount > MAX_AMOUNT {
        return Err("Payment amount exceeds the largest accepted amount");
    }
    Ok(())
}

/// Quantity check lifted into the ledger error kind
pub fn ensure_positive_quantity(quantity: i64) -> Result<(), LedgerError> {
    validate_quantity(quantity).map_err(|msg| LedgerError::InvalidQuantity(msg.to_string()))
}

/// Price check lifted into the ledger error kind
pub fn ensure_valid_price(price: Decimal) -> Result<(), LedgerError> {
    validate_unit_price(price).map_err(|msg| LedgerError::InvalidQuantity(msg.to_string()))
}

// ============================================================================
// Periods and Batches
// ============================================================================

/// Validate a billing period month/year
pub fn validate_period(month: u32, year: i32) -> Result<(), &'static str> {
    if !(1..=12).contains(&month) {
        return Err("Month must be between 1 and 12");
    }
    if !(MIN_PERIOD_YEAR..=MAX_PERIOD_YEAR).contains(&year) {
        return Err("Year is out of the supported range");
    }
    Ok(())
}

/// Validate manufacture and expiry dates are consistent
pub fn validate_batch_dates(
    manufacture_date: Option<NaiveDate>,
    expiry_date: Option<NaiveDate>,
) -> Result<(), &'static str> {
    if let (Some(mfg), Some(exp)) = (manufacture_date, expiry_date) {
        if exp <= mfg {
            return Err("Expiry date must be after manufacture date");
        }
    }
    Ok(())
}

/// Validate a batch/lot number (1-64 printable characters, no whitespace)
pub fn validate_batch_number(batch_number: &str) -> Result<(), &'static str> {
    if batch_number.is_empty() {
        return Err("Batch number is required");
    }
    if batch_number.len() > 64 {
        return Err("Batch number must be at most 64 characters");
    }
    if batch_number.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err("Batch number cannot contain whitespace");
    }
    Ok(())
}

// ============================================================================
// Transaction Numbering
// ============================================================================

/// Validate location code format (2-8 uppercase alphanumeric)
///
/// The code is the first segment of every transaction number issued at the
/// location, so it must not contain the `-` separator.
pub fn validate_location_code(code: &str) -> Result<(), &'static str> {
    if code.len() < 2 {
        return Err("Location code must be at least 2 characters");
    }
    if code.len() > 8 {
        return Err("Location code must be at most 8 characters");
    }
    if !code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()) {
        return Err("Location code must be uppercase alphanumeric only");
    }
    Ok(())
}

// ============================================================================
// Payment Instruments
// ============================================================================

/// Validate a cheque number (6-12 digits)
pub fn validate_cheque_number(number: &str) -> Result<(), &'static str> {
    if number.len() < 6 || number.len() > 12 {
        return Err("Cheque number must be 6 to 12 digits");
    }
    if !number.chars().all(|c| c.is_ascii_digit()) {
        return Err("Cheque number must contain digits only");
    }
    Ok(())
}

/// Validate a free-form payment reference (card slip, transfer id)
pub fn validate_payment_reference(reference: &str) -> Result<(), &'static str> {
    let trimmed = reference.trim();
    if trimmed.is_empty() {
        return Err("Payment reference cannot be blank");
    }
    if trimmed.len() > 64 {
        return Err("Payment reference must be at most 64 characters");
    }
    Ok(())
}
