//! Common types used across the ledger

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};

/// Stock quantities are counted in whole dispensing units
pub type Quantity = i64;

/// A calendar billing period (month + year)
///
/// Field order matters: the derived ordering compares year first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeriodKey {
    pub year: i32,
    pub month: u32,
}

impl PeriodKey {
    /// Create a validated period key
    pub fn new(month: u32, year: i32) -> LedgerResult<Self> {
        crate::validation::validate_period(month, year)
            .map_err(|msg| LedgerError::InvalidPeriod(msg.to_string()))?;
        Ok(Self { year, month })
    }

    /// The period containing the given date
    pub fn containing(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// The immediately following period
    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// The immediately preceding period
    pub fn previous(&self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    pub fn validate(&self) -> LedgerResult<()> {
        Self::new(self.month, self.year).map(|_| ())
    }
}

impl std::fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Monetary value of `quantity` units at `unit_price`
pub fn line_total(quantity: Quantity, unit_price: Decimal) -> Decimal {
    Decimal::from(quantity) * unit_price
}
