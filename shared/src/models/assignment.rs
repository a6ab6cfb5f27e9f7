//! Assignment lines: stock held by consignment customers and agents

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::stock::{allocated_quantity, AllocationLine};
use crate::error::{LedgerError, LedgerResult};
use crate::types::{line_total, PeriodKey, Quantity};
use crate::validation::{ensure_positive_quantity, ensure_valid_price};

/// Units of one stock batch currently held by a party.
///
/// Holdings remember which batches a line's balance came from so that sales
/// can be traced to a batch and returns can re-credit the right batches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchHolding {
    pub batch_id: Uuid,
    pub batch_number: String,
    pub expiry_date: Option<NaiveDate>,
    pub quantity: Quantity,
    pub unit_cost: Decimal,
    /// Acquisition order; lower values were received by the party first
    pub sequence: i32,
}

impl BatchHolding {
    fn draw(&mut self, quantity: Quantity) -> AllocationLine {
        self.quantity -= quantity;
        AllocationLine {
            batch_id: self.batch_id,
            batch_number: self.batch_number.clone(),
            expiry_date: self.expiry_date,
            quantity,
            unit_cost: self.unit_cost,
        }
    }
}

/// Ledger line for one product held by one party (and one period for
/// consignment customers).
///
/// Conservation holds after every mutation:
/// `current_balance = previous_balance + quantity_added - quantity_sold - quantity_returned`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssignmentLine {
    pub id: Uuid,
    pub party_id: Uuid,
    /// Set for consignment lines, absent for agent lines
    pub period_id: Option<Uuid>,
    pub product_id: Uuid,
    pub previous_balance: Quantity,
    pub quantity_added: Quantity,
    pub quantity_sold: Quantity,
    pub quantity_returned: Quantity,
    pub current_balance: Quantity,
    /// Unit price agreed at the most recent assignment
    pub unit_price: Decimal,
    pub total_assigned_value: Decimal,
    pub total_sold_value: Decimal,
    pub holdings: Vec<BatchHolding>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AssignmentLine {
    /// An empty line, created on a party's first assignment of a product
    pub fn open(
        party_id: Uuid,
        period_id: Option<Uuid>,
        product_id: Uuid,
        unit_price: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            party_id,
            period_id,
            product_id,
            previous_balance: 0,
            quantity_added: 0,
            quantity_sold: 0,
            quantity_returned: 0,
            current_balance: 0,
            unit_price,
            total_assigned_value: Decimal::ZERO,
            total_sold_value: Decimal::ZERO,
            holdings: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Balance implied by the four movement counters
    pub fn expected_balance(&self) -> Quantity {
        self.previous_balance + self.quantity_added - self.quantity_sold - self.quantity_returned
    }

    /// Units accounted for by batch holdings
    pub fn held_quantity(&self) -> Quantity {
        self.holdings.iter().map(|h| h.quantity).sum()
    }

    pub fn check_invariants(&self) -> LedgerResult<()> {
        let counters = [
            self.previous_balance,
            self.quantity_added,
            self.quantity_sold,
            self.quantity_returned,
            self.current_balance,
        ];
        if counters.iter().any(|q| *q < 0) {
            return Err(LedgerError::InvariantViolation(format!(
                "line {} has a negative counter",
                self.id
            )));
        }
        if self.current_balance != self.expected_balance() {
            return Err(LedgerError::InvariantViolation(format!(
                "line {} balance {} does not match movements {}",
                self.id,
                self.current_balance,
                self.expected_balance()
            )));
        }
        if self.held_quantity() != self.current_balance {
            return Err(LedgerError::InvariantViolation(format!(
                "line {} holds {} batch units against balance {}",
                self.id,
                self.held_quantity(),
                self.current_balance
            )));
        }
        Ok(())
    }

    /// Record units newly allocated to the party
    pub fn add_items(
        &mut self,
        allocations: &[AllocationLine],
        unit_price: Decimal,
        now: DateTime<Utc>,
    ) -> LedgerResult<()> {
        let quantity = allocated_quantity(allocations);
        ensure_positive_quantity(quantity)?;
        ensure_valid_price(unit_price)?;

        for allocation in allocations {
            self.hold(allocation);
        }

        self.quantity_added += quantity;
        self.current_balance += quantity;
        self.unit_price = unit_price;
        self.total_assigned_value += line_total(quantity, unit_price);
        self.updated_at = now;
        self.check_invariants()
    }

    /// Record units sold by the party; returns the batches they came from.
    ///
    /// Holdings are drawn oldest-first. The stock pool is not touched: the
    /// units left on-hand inventory when they were assigned.
    pub fn record_sale(
        &mut self,
        quantity: Quantity,
        unit_price: Decimal,
        now: DateTime<Utc>,
    ) -> LedgerResult<Vec<AllocationLine>> {
        ensure_positive_quantity(quantity)?;
        ensure_valid_price(unit_price)?;
        self.ensure_within_balance(quantity)?;

        let drawn = self.draw_oldest(quantity);
        self.quantity_sold += quantity;
        self.current_balance -= quantity;
        self.total_sold_value += line_total(quantity, unit_price);
        self.updated_at = now;
        self.check_invariants()?;
        Ok(drawn)
    }

    /// Record units handed back by the party; returns the per-batch quantities
    /// to re-credit to the stock pool.
    ///
    /// When several batches are held the return is spread across them in
    /// proportion to the units held (largest remainder rounding).
    pub fn record_return(
        &mut self,
        quantity: Quantity,
        now: DateTime<Utc>,
    ) -> LedgerResult<Vec<AllocationLine>> {
        ensure_positive_quantity(quantity)?;
        self.ensure_within_balance(quantity)?;

        let weights: Vec<Quantity> = self.holdings.iter().map(|h| h.quantity).collect();
        let shares = split_proportionally(&weights, quantity);
        let credited: Vec<AllocationLine> = self
            .holdings
            .iter_mut()
            .zip(shares)
            .filter(|(_, share)| *share > 0)
            .map(|(holding, share)| holding.draw(share))
            .collect();
        self.holdings.retain(|h| h.quantity > 0);

        self.quantity_returned += quantity;
        self.current_balance -= quantity;
        self.updated_at = now;
        self.check_invariants()?;
        Ok(credited)
    }

    /// Seed this line with the closing balance of a prior period's line.
    ///
    /// The carried units become `previous_balance` and their batch holdings
    /// are placed ahead of anything already held, since they are older.
    pub fn receive_carry_in(&mut self, from: &AssignmentLine, now: DateTime<Utc>) -> LedgerResult<()> {
        if from.product_id != self.product_id {
            return Err(LedgerError::InvariantViolation(format!(
                "cannot carry product {} into line for product {}",
                from.product_id, self.product_id
            )));
        }
        let carried = from.current_balance;
        let mut older = from.holdings.clone();
        older.sort_by_key(|h| h.sequence);
        self.holdings.sort_by_key(|h| h.sequence);

        let mut holdings: Vec<BatchHolding> = Vec::new();
        for holding in older.into_iter().chain(self.holdings.drain(..)) {
            match holdings.iter_mut().find(|h| h.batch_id == holding.batch_id) {
                Some(existing) => existing.quantity += holding.quantity,
                None => holdings.push(holding),
            }
        }
        for (sequence, holding) in holdings.iter_mut().enumerate() {
            holding.sequence = sequence as i32;
        }
        self.holdings = holdings;

        self.previous_balance += carried;
        self.current_balance += carried;
        self.updated_at = now;
        self.check_invariants()
    }

    fn ensure_within_balance(&self, quantity: Quantity) -> LedgerResult<()> {
        if quantity > self.current_balance {
            return Err(LedgerError::ExceedsBalance {
                requested: quantity,
                balance: self.current_balance,
            });
        }
        Ok(())
    }

    fn hold(&mut self, allocation: &AllocationLine) {
        if let Some(existing) = self
            .holdings
            .iter_mut()
            .find(|h| h.batch_id == allocation.batch_id)
        {
            existing.quantity += allocation.quantity;
            return;
        }
        let sequence = self
            .holdings
            .iter()
            .map(|h| h.sequence + 1)
            .max()
            .unwrap_or(0);
        self.holdings.push(BatchHolding {
            batch_id: allocation.batch_id,
            batch_number: allocation.batch_number.clone(),
            expiry_date: allocation.expiry_date,
            quantity: allocation.quantity,
            unit_cost: allocation.unit_cost,
            sequence,
        });
    }

    fn draw_oldest(&mut self, quantity: Quantity) -> Vec<AllocationLine> {
        self.holdings.sort_by_key(|h| h.sequence);
        let mut drawn = Vec::new();
        let mut still_needed = quantity;
        for holding in self.holdings.iter_mut() {
            if still_needed == 0 {
                break;
            }
            let take = holding.quantity.min(still_needed);
            if take > 0 {
                drawn.push(holding.draw(take));
                still_needed -= take;
            }
        }
        self.holdings.retain(|h| h.quantity > 0);
        drawn
    }
}

/// Split `quantity` across `weights` proportionally, in whole units.
///
/// Uses the largest remainder method; ties go to the earlier weight. The
/// result sums to `quantity` whenever `quantity <= sum(weights)` and no share
/// exceeds its weight.
pub fn split_proportionally(weights: &[Quantity], quantity: Quantity) -> Vec<Quantity> {
    let total: i128 = weights.iter().map(|w| i128::from(*w)).sum();
    if total <= 0 || quantity <= 0 {
        return vec![0; weights.len()];
    }

    let quantity = i128::from(quantity).min(total);
    let mut shares = Vec::with_capacity(weights.len());
    let mut remainders = Vec::with_capacity(weights.len());
    let mut assigned: i128 = 0;
    for (idx, weight) in weights.iter().enumerate() {
        let exact = quantity * i128::from(*weight);
        let share = exact / total;
        assigned += share;
        shares.push(share);
        remainders.push((exact % total, idx));
    }

    remainders.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    let mut left = quantity - assigned;
    for (_, idx) in remainders {
        if left == 0 {
            break;
        }
        if shares[idx] < i128::from(weights[idx]) {
            shares[idx] += 1;
            left -= 1;
        }
    }

    shares.into_iter().map(|s| s as Quantity).collect()
}

/// Input for assigning stock to a party
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AssignItemsInput {
    pub party_id: Uuid,
    pub product_id: Uuid,
    pub quantity: Quantity,
    pub unit_price: Decimal,
    /// Consignment period; defaults to the current calendar month
    pub period: Option<PeriodKey>,
}

/// Input for recording stock handed back by a party
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RecordReturnInput {
    pub party_id: Uuid,
    pub product_id: Uuid,
    pub quantity: Quantity,
    /// Consignment period; defaults to the current calendar month
    pub period: Option<PeriodKey>,
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}
