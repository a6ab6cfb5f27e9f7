//! Payments and derived payment status

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::validation::{validate_cheque_number, validate_payment_amount, validate_payment_reference};

/// How a payment was made.
///
/// Reference-number methods carry an optional slip/transfer reference;
/// deferred instruments carry the structured fields needed to clear them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card { reference: Option<String> },
    BankTransfer { reference: Option<String> },
    MobileWallet { reference: Option<String> },
    Cheque {
        number: String,
        bank: String,
        /// Date the cheque may be presented
        cheque_date: NaiveDate,
    },
}

impl PaymentMethod {
    pub fn kind(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card { .. } => "card",
            PaymentMethod::BankTransfer { .. } => "bank_transfer",
            PaymentMethod::MobileWallet { .. } => "mobile_wallet",
            PaymentMethod::Cheque { .. } => "cheque",
        }
    }

    pub fn reference(&self) -> Option<&str> {
        match self {
            PaymentMethod::Cash => None,
            PaymentMethod::Card { reference }
            | PaymentMethod::BankTransfer { reference }
            | PaymentMethod::MobileWallet { reference } => reference.as_deref(),
            PaymentMethod::Cheque { number, .. } => Some(number),
        }
    }

    /// Date a deferred instrument may be presented; `None` for immediate methods
    pub fn presentation_date(&self) -> Option<NaiveDate> {
        match self {
            PaymentMethod::Cheque { cheque_date, .. } => Some(*cheque_date),
            _ => None,
        }
    }

    /// Clearing state at the moment of recording.
    ///
    /// A cheque dated on or before `today` counts as cleared; a post-dated
    /// cheque stays pending. Every other method clears immediately.
    pub fn clearing_status(&self, today: NaiveDate) -> ClearingStatus {
        match self.presentation_date() {
            Some(date) if date > today => ClearingStatus::Pending,
            _ => ClearingStatus::Cleared,
        }
    }

    /// Method-specific fields as JSON, without the type tag
    pub fn metadata(&self) -> serde_json::Value {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(mut fields)) => {
                fields.remove("type");
                serde_json::Value::Object(fields)
            }
            _ => serde_json::Value::Null,
        }
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        match self {
            PaymentMethod::Cash => Ok(()),
            PaymentMethod::Card { reference }
            | PaymentMethod::BankTransfer { reference }
            | PaymentMethod::MobileWallet { reference } => match reference {
                Some(reference) => validate_payment_reference(reference),
                None => Ok(()),
            },
            PaymentMethod::Cheque { number, bank, .. } => {
                validate_cheque_number(number)?;
                if bank.trim().is_empty() {
                    return Err("Cheque bank is required");
                }
                Ok(())
            }
        }
    }
}

/// Whether a recorded payment's funds are considered cleared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClearingStatus {
    Cleared,
    Pending,
}

impl ClearingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClearingStatus::Cleared => "cleared",
            ClearingStatus::Pending => "pending",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "cleared" => Some(ClearingStatus::Cleared),
            "pending" => Some(ClearingStatus::Pending),
            _ => None,
        }
    }
}

/// Derived summary label for a transaction's payments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Partial,
    Paid,
}

impl PaymentStatus {
    /// Status thresholds: paid at or above the total, partial above zero
    pub fn derive(total_amount: Decimal, total_paid: Decimal) -> Self {
        if total_paid >= total_amount {
            PaymentStatus::Paid
        } else if total_paid > Decimal::ZERO {
            PaymentStatus::Partial
        } else {
            PaymentStatus::Unpaid
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Partial => "partial",
            PaymentStatus::Paid => "paid",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "unpaid" => Some(PaymentStatus::Unpaid),
            "partial" => Some(PaymentStatus::Partial),
            "paid" => Some(PaymentStatus::Paid),
            _ => None,
        }
    }
}

/// A payment recorded against a sale transaction (append-only)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub clearing_status: ClearingStatus,
    pub recorded_at: DateTime<Utc>,
}

impl Payment {
    /// Validate and build a payment against a transaction with `total_amount`
    /// and the payments already recorded.
    pub fn accept(
        transaction_id: Uuid,
        total_amount: Decimal,
        existing: &[Payment],
        amount: Decimal,
        method: PaymentMethod,
        recorded_at: DateTime<Utc>,
    ) -> LedgerResult<Self> {
        validate_payment_amount(amount)
            .map_err(|msg| LedgerError::InvalidQuantity(msg.to_string()))?;
        method
            .validate()
            .map_err(|msg| LedgerError::InvalidInput(msg.to_string()))?;

        let outstanding = total_amount - total_paid(existing);
        if amount > outstanding {
            return Err(LedgerError::OverPayment {
                amount,
                outstanding: outstanding.max(Decimal::ZERO),
            });
        }

        let clearing_status = method.clearing_status(recorded_at.date_naive());
        Ok(Self {
            id: Uuid::new_v4(),
            transaction_id,
            amount,
            method,
            clearing_status,
            recorded_at,
        })
    }

    /// A deferred instrument dated on its recording day settles the
    /// transaction outright, whatever the amount.
    pub fn settles_in_full(&self) -> bool {
        self.method.presentation_date() == Some(self.recorded_at.date_naive())
    }
}

/// Sum of recorded payments, cleared or not
pub fn total_paid(payments: &[Payment]) -> Decimal {
    payments.iter().map(|p| p.amount).sum()
}

/// Payment position of one transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSummary {
    pub transaction_id: Uuid,
    pub status: PaymentStatus,
    pub total_amount: Decimal,
    pub total_paid: Decimal,
    pub balance: Decimal,
}

impl PaymentSummary {
    pub fn compute(transaction_id: Uuid, total_amount: Decimal, payments: &[Payment]) -> Self {
        let paid = total_paid(payments);
        let status = if payments.iter().any(Payment::settles_in_full) {
            PaymentStatus::Paid
        } else {
            PaymentStatus::derive(total_amount, paid)
        };
        Self {
            transaction_id,
            status,
            total_amount,
            total_paid: paid,
            balance: total_amount - paid,
        }
    }
}

/// Input for recording a payment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordPaymentInput {
    pub amount: Decimal,
    pub method: PaymentMethod,
}
