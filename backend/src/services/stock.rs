//! Stock pool service: batch receipt, FIFO allocation, write-offs and transfers

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{now, require_location, require_product};
use crate::error::AppResult;
use crate::models::{
    allocated_cost, allocated_quantity, apply_allocation, fifo_order, plan_fifo, AllocationLine,
    Quantity, ReceiveBatchInput, StockBatch,
};
use crate::store::{LedgerStore, LedgerTx};
use shared::{ensure_positive_quantity, validate_batch_number, LedgerError};

/// Stock service for the batch-level inventory pool
#[derive(Clone)]
pub struct StockService {
    store: Arc<dyn LedgerStore>,
}

/// Input for allocating stock without assigning it to anyone
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AllocateStockInput {
    pub product_id: Uuid,
    pub location_id: Uuid,
    pub quantity: Quantity,
}

/// Result of a FIFO allocation
#[derive(Debug, Clone, Serialize)]
pub struct Allocation {
    pub product_id: Uuid,
    pub location_id: Uuid,
    pub total_quantity: Quantity,
    pub total_cost: Decimal,
    pub lines: Vec<AllocationLine>,
}

/// Input for writing stock off a batch
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RemoveStockInput {
    pub quantity: Quantity,
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
}

/// Input for moving stock to another location
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct TransferStockInput {
    pub to_location_id: Uuid,
    pub quantity: Quantity,
}

/// Both sides of a transfer
#[derive(Debug, Clone, Serialize)]
pub struct StockTransfer {
    pub source: StockBatch,
    pub target: StockBatch,
}

/// Filter for batch listings
#[derive(Debug, Clone, Deserialize)]
pub struct BatchListQuery {
    #[serde(default = "default_exclude_expired")]
    pub exclude_expired: bool,
}

fn default_exclude_expired() -> bool {
    true
}

impl StockService {
    /// Create a new StockService instance
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Receive a new batch into the pool
    pub async fn receive_batch(&self, input: ReceiveBatchInput) -> AppResult<StockBatch> {
        input.validate()?;
        validate_batch_number(&input.batch_number)
            .map_err(|msg| LedgerError::InvalidInput(msg.to_string()))?;
        let batch = StockBatch::receive(&input, now())?;

        let mut tx = self.store.begin().await?;
        require_product(tx.as_mut(), input.product_id).await?;
        require_location(tx.as_mut(), input.location_id).await?;
        tx.insert_batch(&batch).await?;
        tx.commit().await?;

        tracing::info!(
            batch_id = %batch.id,
            batch_number = %batch.batch_number,
            quantity = batch.quantity_received,
            "Received stock batch"
        );
        Ok(batch)
    }

    /// Batches with stock left, in allocation order
    pub async fn list_available(
        &self,
        product_id: Uuid,
        location_id: Uuid,
        exclude_expired: bool,
    ) -> AppResult<Vec<StockBatch>> {
        let today = now().date_naive();
        let mut tx = self.store.begin().await?;
        require_product(tx.as_mut(), product_id).await?;
        require_location(tx.as_mut(), location_id).await?;
        let mut batches: Vec<StockBatch> = tx
            .batches(product_id, location_id)
            .await?
            .into_iter()
            .filter(|b| b.quantity_remaining > 0)
            .filter(|b| !exclude_expired || !b.is_expired_on(today))
            .collect();
        batches.sort_by(fifo_order);
        Ok(batches)
    }

    /// Allocate stock oldest-first and take it out of the pool
    pub async fn allocate(&self, input: AllocateStockInput) -> AppResult<Allocation> {
        input.validate()?;
        let mut tx = self.store.begin().await?;
        let lines = allocate_in(
            tx.as_mut(),
            input.product_id,
            input.location_id,
            input.quantity,
            now().date_naive(),
        )
        .await?;
        tx.commit().await?;

        Ok(Allocation {
            product_id: input.product_id,
            location_id: input.location_id,
            total_quantity: allocated_quantity(&lines),
            total_cost: allocated_cost(&lines),
            lines,
        })
    }

    /// Write units off a batch (damage, expiry, recall)
    pub async fn remove(&self, batch_id: Uuid, input: RemoveStockInput) -> AppResult<StockBatch> {
        input.validate()?;
        ensure_positive_quantity(input.quantity)?;

        let mut tx = self.store.begin().await?;
        let mut batch = require_batch(tx.as_mut(), batch_id).await?;
        batch.decrement(input.quantity)?;
        tx.update_batch(&batch).await?;
        tx.commit().await?;

        tracing::info!(
            batch_id = %batch.id,
            quantity = input.quantity,
            reason = %input.reason,
            "Removed stock from batch"
        );
        Ok(batch)
    }

    /// Move units of a batch to another location as a new batch
    pub async fn transfer(&self, batch_id: Uuid, input: TransferStockInput) -> AppResult<StockTransfer> {
        input.validate()?;
        ensure_positive_quantity(input.quantity)?;

        let mut tx = self.store.begin().await?;
        let mut source = require_batch(tx.as_mut(), batch_id).await?;
        require_location(tx.as_mut(), input.to_location_id).await?;
        if source.location_id == input.to_location_id {
            return Err(LedgerError::InvalidInput(
                "Transfer target must be a different location".to_string(),
            )
            .into());
        }

        source.decrement(input.quantity)?;
        let target = source.split_to(input.to_location_id, input.quantity, now());
        tx.update_batch(&source).await?;
        tx.insert_batch(&target).await?;
        tx.commit().await?;

        tracing::info!(
            from_batch = %source.id,
            to_batch = %target.id,
            quantity = input.quantity,
            "Transferred stock"
        );
        Ok(StockTransfer { source, target })
    }
}

async fn require_batch(tx: &mut dyn LedgerTx, id: Uuid) -> AppResult<StockBatch> {
    tx.batch_for_update(id)
        .await?
        .ok_or_else(|| LedgerError::NotFound(format!("Stock batch {}", id)).into())
}

/// FIFO-allocate `quantity` of a product at a location inside `tx`.
///
/// Candidate batches are locked, the allocation is planned in full and only
/// then applied, so an `InsufficientStock` failure leaves every batch as it
/// was.
pub(crate) async fn allocate_in(
    tx: &mut dyn LedgerTx,
    product_id: Uuid,
    location_id: Uuid,
    quantity: Quantity,
    today: NaiveDate,
) -> AppResult<Vec<AllocationLine>> {
    require_product(tx, product_id).await?;
    require_location(tx, location_id).await?;

    let mut batches = tx.batches_for_update(product_id, location_id).await?;
    let lines = plan_fifo(&batches, quantity, today).map_err(|err| {
        tracing::warn!(%product_id, %location_id, quantity, "Allocation rejected: {}", err);
        err
    })?;
    apply_allocation(&mut batches, &lines)?;

    for line in &lines {
        if let Some(batch) = batches.iter().find(|b| b.id == line.batch_id) {
            tx.update_batch(batch).await?;
        }
    }

    tracing::debug!(
        %product_id,
        %location_id,
        quantity,
        batches = lines.len(),
        "Allocated stock"
    );
    Ok(lines)
}

/// Put returned units back into the batches they were drawn from
pub(crate) async fn credit_in(tx: &mut dyn LedgerTx, lines: &[AllocationLine]) -> AppResult<()> {
    let mut ordered: Vec<&AllocationLine> = lines.iter().collect();
    ordered.sort_by_key(|line| line.batch_id);
    for line in ordered {
        let mut batch = require_batch(tx, line.batch_id).await?;
        batch.credit(line.quantity)?;
        tx.update_batch(&batch).await?;
    }
    Ok(())
}
