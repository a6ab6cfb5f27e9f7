//! Batch-level stock and FIFO allocation

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::{LedgerError, LedgerResult};
use crate::types::{line_total, Quantity};
use crate::validation::{ensure_positive_quantity, ensure_valid_price, validate_batch_dates};

/// One received lot of a product at one location
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StockBatch {
    pub id: Uuid,
    pub product_id: Uuid,
    pub location_id: Uuid,
    pub batch_number: String,
    pub manufacture_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
    pub unit_cost: Decimal,
    pub quantity_received: Quantity,
    pub quantity_remaining: Quantity,
    pub received_at: DateTime<Utc>,
}

impl StockBatch {
    /// Build a freshly received batch from validated input
    pub fn receive(input: &ReceiveBatchInput, received_at: DateTime<Utc>) -> LedgerResult<Self> {
        ensure_positive_quantity(input.quantity)?;
        ensure_valid_price(input.unit_cost)?;
        validate_batch_dates(input.manufacture_date, input.expiry_date)
            .map_err(|msg| LedgerError::InvalidInput(msg.to_string()))?;

        Ok(Self {
            id: Uuid::new_v4(),
            product_id: input.product_id,
            location_id: input.location_id,
            batch_number: input.batch_number.clone(),
            manufacture_date: input.manufacture_date,
            expiry_date: input.expiry_date,
            unit_cost: input.unit_cost,
            quantity_received: input.quantity,
            quantity_remaining: input.quantity,
            received_at,
        })
    }

    /// A batch is expired on the day its expiry date is reached
    pub fn is_expired_on(&self, today: NaiveDate) -> bool {
        self.expiry_date.map_or(false, |expiry| expiry <= today)
    }

    /// Eligible for allocation: has stock and is not expired
    pub fn is_available_on(&self, today: NaiveDate) -> bool {
        self.quantity_remaining > 0 && !self.is_expired_on(today)
    }

    /// Take `quantity` units out of the batch
    pub fn decrement(&mut self, quantity: Quantity) -> LedgerResult<()> {
        ensure_positive_quantity(quantity)?;
        if quantity > self.quantity_remaining {
            return Err(LedgerError::insufficient_stock(
                quantity,
                self.quantity_remaining,
            ));
        }
        self.quantity_remaining -= quantity;
        Ok(())
    }

    /// Put `quantity` units back into the batch (returned stock)
    pub fn credit(&mut self, quantity: Quantity) -> LedgerResult<()> {
        ensure_positive_quantity(quantity)?;
        self.quantity_remaining += quantity;
        Ok(())
    }

    /// A new batch at another location carrying the same lot fields
    pub fn split_to(&self, location_id: Uuid, quantity: Quantity, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            location_id,
            quantity_received: quantity,
            quantity_remaining: quantity,
            received_at: at,
            ..self.clone()
        }
    }
}

/// Input for receiving a batch into the stock pool
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReceiveBatchInput {
    pub product_id: Uuid,
    pub location_id: Uuid,
    #[validate(length(min = 1, max = 64))]
    pub batch_number: String,
    pub manufacture_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
    pub unit_cost: Decimal,
    pub quantity: Quantity,
}

/// Immutable record of units drawn from one batch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AllocationLine {
    pub batch_id: Uuid,
    pub batch_number: String,
    pub expiry_date: Option<NaiveDate>,
    pub quantity: Quantity,
    /// Unit cost of the batch at the moment of allocation
    pub unit_cost: Decimal,
}

impl AllocationLine {
    pub fn cost(&self) -> Decimal {
        line_total(self.quantity, self.unit_cost)
    }
}

/// Total quantity covered by a set of allocation lines
pub fn allocated_quantity(lines: &[AllocationLine]) -> Quantity {
    lines.iter().map(|l| l.quantity).sum()
}

/// Total cost of a set of allocation lines
pub fn allocated_cost(lines: &[AllocationLine]) -> Decimal {
    lines.iter().map(AllocationLine::cost).sum()
}

/// Oldest-first ordering used by the allocator.
///
/// Manufacture date ascending, batches without a manufacture date last.
/// Ties fall back to expiry date (none last), then receipt time, then id so
/// the order is total and repeatable.
pub fn fifo_order(a: &StockBatch, b: &StockBatch) -> Ordering {
    fn none_last(x: Option<NaiveDate>, y: Option<NaiveDate>) -> Ordering {
        match (x, y) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }

    none_last(a.manufacture_date, b.manufacture_date)
        .then_with(|| none_last(a.expiry_date, b.expiry_date))
        .then_with(|| a.received_at.cmp(&b.received_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Plan a FIFO allocation over candidate batches without mutating them.
///
/// Returns lines covering exactly `quantity`, or `InsufficientStock` when the
/// eligible batches hold less than requested. Expired and empty batches are
/// skipped.
pub fn plan_fifo(
    batches: &[StockBatch],
    quantity: Quantity,
    today: NaiveDate,
) -> LedgerResult<Vec<AllocationLine>> {
    ensure_positive_quantity(quantity)?;

    let mut eligible: Vec<&StockBatch> = batches
        .iter()
        .filter(|b| b.is_available_on(today))
        .collect();
    eligible.sort_by(|a, b| fifo_order(a, b));

    // Saturates: a total past i64::MAX covers any accepted request.
    let available = eligible
        .iter()
        .fold(0 as Quantity, |acc, b| acc.saturating_add(b.quantity_remaining));
    if available < quantity {
        return Err(LedgerError::insufficient_stock(quantity, available));
    }

    let mut lines = Vec::new();
    let mut still_needed = quantity;
    for batch in eligible {
        if still_needed == 0 {
            break;
        }
        let take = batch.quantity_remaining.min(still_needed);
        lines.push(AllocationLine {
            batch_id: batch.id,
            batch_number: batch.batch_number.clone(),
            expiry_date: batch.expiry_date,
            quantity: take,
            unit_cost: batch.unit_cost,
        });
        still_needed -= take;
    }

    Ok(lines)
}

/// Apply planned lines to the batches they reference
pub fn apply_allocation(batches: &mut [StockBatch], lines: &[AllocationLine]) -> LedgerResult<()> {
    for line in lines {
        let batch = batches
            .iter_mut()
            .find(|b| b.id == line.batch_id)
            .ok_or_else(|| LedgerError::NotFound(format!("Stock batch {}", line.batch_id)))?;
        batch.decrement(line.quantity)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn today() -> NaiveDate {
        date(2024, 6, 1)
    }

    fn batch(number: &str, mfg: Option<NaiveDate>, qty: Quantity) -> StockBatch {
        StockBatch {
            id: Uuid::new_v4(),
            product_id: Uuid::nil(),
            location_id: Uuid::nil(),
            batch_number: number.to_string(),
            manufacture_date: mfg,
            expiry_date: None,
            unit_cost: Decimal::from(10),
            quantity_received: qty,
            quantity_remaining: qty,
            received_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn allocates_oldest_batch_first() {
        let b1 = batch("B1", Some(date(2024, 1, 1)), 5);
        let b2 = batch("B2", Some(date(2024, 2, 1)), 10);
        // Deliberately out of order
        let batches = vec![b2.clone(), b1.clone()];

        let lines = plan_fifo(&batches, 8, today()).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!((lines[0].batch_id, lines[0].quantity), (b1.id, 5));
        assert_eq!((lines[1].batch_id, lines[1].quantity), (b2.id, 3));
    }

    #[test]
    fn single_batch_covers_request() {
        let b1 = batch("B1", Some(date(2024, 1, 1)), 5);
        let b2 = batch("B2", Some(date(2024, 2, 1)), 10);
        let lines = plan_fifo(&[b1.clone(), b2], 4, today()).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].batch_id, b1.id);
    }

    #[test]
    fn insufficient_stock_reports_shortfall() {
        let batches = vec![
            batch("B1", Some(date(2024, 1, 1)), 3),
            batch("B2", Some(date(2024, 2, 1)), 4),
        ];
        let err = plan_fifo(&batches, 10, today()).unwrap_err();
        assert_eq!(err, LedgerError::insufficient_stock(10, 7));
    }

    #[test]
    fn batches_without_manufacture_date_sort_last() {
        let undated = batch("U", None, 5);
        let dated = batch("D", Some(date(2024, 3, 1)), 5);
        let lines = plan_fifo(&[undated.clone(), dated.clone()], 6, today()).unwrap();
        assert_eq!(lines[0].batch_id, dated.id);
        assert_eq!(lines[1].batch_id, undated.id);
    }

    #[test]
    fn expired_and_empty_batches_are_skipped() {
        let mut expired = batch("E", Some(date(2023, 1, 1)), 50);
        expired.expiry_date = Some(today());
        let mut empty = batch("Z", Some(date(2023, 2, 1)), 5);
        empty.quantity_remaining = 0;
        let fresh = batch("F", Some(date(2024, 1, 1)), 5);

        let lines = plan_fifo(&[expired, empty, fresh.clone()], 5, today()).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].batch_id, fresh.id);
    }

    #[test]
    fn expiry_breaks_manufacture_ties() {
        let mut later = batch("L", Some(date(2024, 1, 1)), 5);
        later.expiry_date = Some(date(2026, 1, 1));
        let mut sooner = batch("S", Some(date(2024, 1, 1)), 5);
        sooner.expiry_date = Some(date(2025, 1, 1));

        let lines = plan_fifo(&[later, sooner.clone()], 1, today()).unwrap();
        assert_eq!(lines[0].batch_id, sooner.id);
    }

    #[test]
    fn zero_quantity_is_invalid() {
        let batches = vec![batch("B1", None, 3)];
        assert!(matches!(
            plan_fifo(&batches, 0, today()),
            Err(LedgerError::InvalidQuantity(_))
        ));
    }

    #[test]
    fn decrement_refuses_overdraw() {
        let mut b = batch("B1", None, 3);
        assert!(b.decrement(4).is_err());
        assert_eq!(b.quantity_remaining, 3);
        b.decrement(3).unwrap();
        assert_eq!(b.quantity_remaining, 0);
        assert!(!b.is_available_on(today()));
    }

    #[test]
    fn apply_allocation_decrements_each_batch() {
        let b1 = batch("B1", Some(date(2024, 1, 1)), 5);
        let b2 = batch("B2", Some(date(2024, 2, 1)), 10);
        let mut batches = vec![b1, b2];
        let lines = plan_fifo(&batches, 8, today()).unwrap();
        apply_allocation(&mut batches, &lines).unwrap();
        assert_eq!(batches[0].quantity_remaining, 0);
        assert_eq!(batches[1].quantity_remaining, 7);
    }

    #[test]
    fn receive_rejects_bad_dates() {
        let input = ReceiveBatchInput {
            product_id: Uuid::new_v4(),
            location_id: Uuid::new_v4(),
            batch_number: "LOT-1".into(),
            manufacture_date: Some(date(2025, 1, 1)),
            expiry_date: Some(date(2024, 1, 1)),
            unit_cost: Decimal::from(3),
            quantity: 10,
        };
        assert!(matches!(
            StockBatch::receive(&input, Utc::now()),
            Err(LedgerError::InvalidInput(_))
        ));
    }

    #[test]
    fn receive_rejects_oversized_quantity_and_cost() {
        let mut input = ReceiveBatchInput {
            product_id: Uuid::new_v4(),
            location_id: Uuid::new_v4(),
            batch_number: "LOT-1".into(),
            manufacture_date: None,
            expiry_date: None,
            unit_cost: Decimal::from(3),
            quantity: i64::MAX,
        };
        assert!(matches!(
            StockBatch::receive(&input, Utc::now()),
            Err(LedgerError::InvalidQuantity(_))
        ));

        input.quantity = 10;
        input.unit_cost = Decimal::from_i128_with_scale(10i128.pow(28), 0);
        assert!(matches!(
            StockBatch::receive(&input, Utc::now()),
            Err(LedgerError::InvalidQuantity(_))
        ));
    }

    #[test]
    fn huge_batches_do_not_overflow_the_plan() {
        let batches = vec![
            batch("B1", Some(date(2024, 1, 1)), i64::MAX),
            batch("B2", Some(date(2024, 2, 1)), i64::MAX),
        ];
        let lines = plan_fifo(&batches, 5, today()).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].batch_number, "B1");
        assert_eq!(lines[0].quantity, 5);
    }

    #[test]
    fn split_keeps_lot_fields() {
        let source = batch("B1", Some(date(2024, 1, 1)), 10);
        let target = Uuid::new_v4();
        let moved = source.split_to(target, 4, Utc::now());
        assert_ne!(moved.id, source.id);
        assert_eq!(moved.location_id, target);
        assert_eq!(moved.batch_number, "B1");
        assert_eq!(moved.manufacture_date, source.manufacture_date);
        assert_eq!(moved.quantity_remaining, 4);
    }

    fn batches_strategy() -> impl Strategy<Value = Vec<StockBatch>> {
        prop::collection::vec((0u32..365, 0i64..20, any::<bool>()), 1..8).prop_map(|specs| {
            specs
                .into_iter()
                .enumerate()
                .map(|(i, (day_offset, qty, dated))| {
                    let mfg = dated.then(|| {
                        date(2023, 1, 1) + chrono::Duration::days(i64::from(day_offset))
                    });
                    batch(&format!("B{i}"), mfg, qty)
                })
                .collect()
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Allocation covers exactly the request and never overdraws a batch
        #[test]
        fn prop_allocation_is_exact_or_rejected(
            batches in batches_strategy(),
            requested in 1i64..80,
        ) {
            let available: i64 = batches.iter().map(|b| b.quantity_remaining).sum();
            match plan_fifo(&batches, requested, today()) {
                Ok(lines) => {
                    prop_assert!(available >= requested);
                    prop_assert_eq!(allocated_quantity(&lines), requested);
                    for line in &lines {
                        let source = batches.iter().find(|b| b.id == line.batch_id).unwrap();
                        prop_assert!(line.quantity > 0);
                        prop_assert!(line.quantity <= source.quantity_remaining);
                    }
                }
                Err(err) => {
                    prop_assert!(available < requested);
                    prop_assert_eq!(err, LedgerError::insufficient_stock(requested, available));
                }
            }
        }

        /// Every batch before the last one touched is fully drained
        #[test]
        fn prop_earlier_batches_exhausted_first(
            batches in batches_strategy(),
            requested in 1i64..80,
        ) {
            if let Ok(lines) = plan_fifo(&batches, requested, today()) {
                for line in lines.iter().take(lines.len().saturating_sub(1)) {
                    let source = batches.iter().find(|b| b.id == line.batch_id).unwrap();
                    prop_assert_eq!(line.quantity, source.quantity_remaining);
                }
                for pair in lines.windows(2) {
                    let a = batches.iter().find(|b| b.id == pair[0].batch_id).unwrap();
                    let b = batches.iter().find(|b| b.id == pair[1].batch_id).unwrap();
                    prop_assert_ne!(fifo_order(a, b), Ordering::Greater);
                }
            }
        }
    }
}
