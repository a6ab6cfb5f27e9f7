//! Consignment billing periods

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::assignment::AssignmentLine;
use crate::error::{LedgerError, LedgerResult};
use crate::types::{PeriodKey, Quantity};

/// Lifecycle of a consignment period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodStatus {
    Active,
    Closed,
}

impl PeriodStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodStatus::Active => "active",
            PeriodStatus::Closed => "closed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(PeriodStatus::Active),
            "closed" => Some(PeriodStatus::Closed),
            _ => None,
        }
    }
}

/// Aggregates of every line in a period
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodTotals {
    pub previous_balance: Quantity,
    pub quantity_added: Quantity,
    pub quantity_sold: Quantity,
    pub quantity_returned: Quantity,
    pub current_balance: Quantity,
    pub total_consigned_value: Decimal,
    pub total_sold_value: Decimal,
}

impl PeriodTotals {
    pub fn from_lines(lines: &[AssignmentLine]) -> Self {
        lines.iter().fold(Self::default(), |mut acc, line| {
            acc.previous_balance += line.previous_balance;
            acc.quantity_added += line.quantity_added;
            acc.quantity_sold += line.quantity_sold;
            acc.quantity_returned += line.quantity_returned;
            acc.current_balance += line.current_balance;
            acc.total_consigned_value += line.total_assigned_value;
            acc.total_sold_value += line.total_sold_value;
            acc
        })
    }
}

/// A customer's consignment period and its lines.
///
/// Totals, `amount_paid` and `balance_due` are derived; `recompute` must run
/// after every line mutation and every payment change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConsignmentPeriod {
    pub id: Uuid,
    pub party_id: Uuid,
    pub period: PeriodKey,
    pub status: PeriodStatus,
    #[serde(flatten)]
    pub totals: PeriodTotals,
    /// Payments received against this period's consignment sales
    pub amount_paid: Decimal,
    pub balance_due: Decimal,
    pub lines: Vec<AssignmentLine>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConsignmentPeriod {
    pub fn open(party_id: Uuid, period: PeriodKey, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            party_id,
            period,
            status: PeriodStatus::Active,
            totals: PeriodTotals::default(),
            amount_paid: Decimal::ZERO,
            balance_due: Decimal::ZERO,
            lines: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.status == PeriodStatus::Closed
    }

    pub fn ensure_active(&self) -> LedgerResult<()> {
        if self.is_closed() {
            return Err(LedgerError::PeriodClosed(self.period));
        }
        Ok(())
    }

    pub fn line(&self, product_id: Uuid) -> Option<&AssignmentLine> {
        self.lines.iter().find(|l| l.product_id == product_id)
    }

    pub fn line_mut(&mut self, product_id: Uuid) -> Option<&mut AssignmentLine> {
        self.lines.iter_mut().find(|l| l.product_id == product_id)
    }

    /// The line for `product_id`, opened at `unit_price` if the customer has
    /// never held the product in this period
    pub fn line_or_open(
        &mut self,
        product_id: Uuid,
        unit_price: Decimal,
        now: DateTime<Utc>,
    ) -> &mut AssignmentLine {
        let idx = match self.lines.iter().position(|l| l.product_id == product_id) {
            Some(idx) => idx,
            None => {
                self.lines.push(AssignmentLine::open(
                    self.party_id,
                    Some(self.id),
                    product_id,
                    unit_price,
                    now,
                ));
                self.lines.len() - 1
            }
        };
        &mut self.lines[idx]
    }

    /// Record the amount paid so far and refresh every derived field
    pub fn set_amount_paid(&mut self, amount_paid: Decimal, now: DateTime<Utc>) {
        self.amount_paid = amount_paid;
        self.recompute(now);
    }

    pub fn recompute(&mut self, now: DateTime<Utc>) {
        self.totals = PeriodTotals::from_lines(&self.lines);
        self.balance_due = self.totals.total_sold_value - self.amount_paid;
        self.updated_at = now;
    }

    pub fn close(&mut self, now: DateTime<Utc>) -> LedgerResult<()> {
        self.ensure_active()?;
        self.status = PeriodStatus::Closed;
        self.updated_at = now;
        Ok(())
    }

    /// Lines and aggregates agree, and every line conserves its balance
    pub fn check_invariants(&self) -> LedgerResult<()> {
        for line in &self.lines {
            line.check_invariants()?;
        }
        if self.totals != PeriodTotals::from_lines(&self.lines) {
            return Err(LedgerError::InvariantViolation(format!(
                "period {} aggregates are out of sync with its lines",
                self.period
            )));
        }
        Ok(())
    }

    /// Carry every positive balance of `self` into `target`, then close `self`.
    ///
    /// `target` must be a later period of the same customer.
    pub fn roll_forward_into(
        &mut self,
        target: &mut ConsignmentPeriod,
        now: DateTime<Utc>,
    ) -> LedgerResult<()> {
        if target.party_id != self.party_id {
            return Err(LedgerError::InvalidPeriod(
                "periods belong to different customers".to_string(),
            ));
        }
        if target.period <= self.period {
            return Err(LedgerError::InvalidPeriod(format!(
                "target period {} must be after {}",
                target.period, self.period
            )));
        }
        self.ensure_active()?;
        target.ensure_active()?;

        for line in self.lines.iter().filter(|l| l.current_balance > 0) {
            target
                .line_or_open(line.product_id, line.unit_price, now)
                .receive_carry_in(line, now)?;
        }
        target.recompute(now);
        self.close(now)?;
        target.check_invariants()
    }
}
