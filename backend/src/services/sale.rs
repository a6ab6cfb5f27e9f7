//! Sale recorder: one sale, its ledger mutation and its number as one unit of work

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use uuid::Uuid;
use validator::Validate;

use super::assignment::{sell_from_party_in, PartySale};
use super::payment::record_payment_in;
use super::stock::allocate_in;
use super::{now, require_location, require_party};
use crate::config::LedgerConfig;
use crate::error::AppResult;
use crate::models::{
    format_transaction_number, next_sequence, transaction_prefix, CreateSaleInput, PaymentStatus,
    SaleLineItem, SaleSource, SaleTransaction, SaleType, Settlement,
};
use crate::store::{LedgerStore, LedgerTx};
use shared::{ensure_positive_quantity, ensure_valid_price, validate_location_code, LedgerError};

/// Sale service
#[derive(Clone)]
pub struct SaleService {
    store: Arc<dyn LedgerStore>,
    config: LedgerConfig,
}

impl SaleService {
    /// Create a new SaleService instance
    pub fn new(store: Arc<dyn LedgerStore>, config: LedgerConfig) -> Self {
        Self { store, config }
    }

    /// Record a sale from a party's held balance or from location stock.
    ///
    /// Every item must succeed or nothing is written.
    pub async fn create_sale(&self, input: CreateSaleInput) -> AppResult<SaleTransaction> {
        input.validate()?;
        for item in &input.items {
            ensure_positive_quantity(item.quantity)?;
            ensure_valid_price(item.unit_price)?;
        }

        let now = now();
        let today = now.date_naive();
        let mut tx = self.store.begin().await?;

        let (sale_type, party_id, location_id, PartySale { items, period_id }) = match &input.source {
            SaleSource::Party { party_id, period } => {
                let party = require_party(tx.as_mut(), *party_id).await?;
                let sold = sell_from_party_in(tx.as_mut(), &party, *period, &input.items, now).await?;
                (
                    SaleType::for_party(party.kind),
                    Some(party.id),
                    party.home_location_id,
                    sold,
                )
            }
            SaleSource::Counter {
                location_id,
                sale_type,
            } => {
                require_location(tx.as_mut(), *location_id).await?;
                // Batches are locked product by product in ascending id order;
                // the line items keep the request order.
                let mut order: Vec<usize> = (0..input.items.len()).collect();
                order.sort_by_key(|&idx| input.items[idx].product_id);
                let mut drawn = vec![Vec::new(); input.items.len()];
                for idx in order {
                    let item = &input.items[idx];
                    drawn[idx] =
                        allocate_in(tx.as_mut(), item.product_id, *location_id, item.quantity, today)
                            .await?;
                }
                let items = input
                    .items
                    .iter()
                    .zip(drawn)
                    .map(|(item, allocations)| {
                        SaleLineItem::new(item.product_id, item.quantity, item.unit_price, allocations)
                    })
                    .collect();
                (
                    SaleType::from(*sale_type),
                    None,
                    *location_id,
                    PartySale {
                        items,
                        period_id: None,
                    },
                )
            }
        };

        let location = require_location(tx.as_mut(), location_id).await?;
        let transaction_number =
            next_transaction_number_in(tx.as_mut(), &location.code, today, self.config.sequence_width)
                .await?;

        let total_amount = SaleTransaction::total_of(&items);
        let mut sale = SaleTransaction {
            id: Uuid::new_v4(),
            transaction_number,
            sale_type,
            party_id,
            location_id,
            period_id,
            customer_name: input.customer_name.clone(),
            total_amount,
            payment_status: PaymentStatus::derive(total_amount, Decimal::ZERO),
            items,
            created_at: now,
        };
        tx.insert_sale(&sale).await?;

        let settlement = input
            .settlement
            .clone()
            .unwrap_or_else(|| sale_type.default_settlement(&self.config.retail_method.payment_method()));
        if let Settlement::PaidInFull { method } = settlement {
            if total_amount > Decimal::ZERO {
                let receipt = record_payment_in(tx.as_mut(), sale.id, total_amount, method, now).await?;
                sale.payment_status = receipt.summary.status;
            }
        }

        tx.commit().await?;

        tracing::info!(
            sale_id = %sale.id,
            transaction_number = %sale.transaction_number,
            sale_type = sale.sale_type.as_str(),
            items = sale.items.len(),
            total = %sale.total_amount,
            status = sale.payment_status.as_str(),
            "Recorded sale"
        );
        Ok(sale)
    }

    /// A sale transaction with its line items
    pub async fn get_sale(&self, id: Uuid) -> AppResult<SaleTransaction> {
        let mut tx = self.store.begin().await?;
        let sale = tx
            .sale(id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("Sale transaction {}", id)))?;
        Ok(sale)
    }
}

/// Issue the next `<CODE>-<YYYYMMDD>-<NNNN>` number inside `tx`.
///
/// The per-prefix lock is held until `tx` ends, so concurrent sales at the
/// same location and day see each other's numbers.
pub(crate) async fn next_transaction_number_in(
    tx: &mut dyn LedgerTx,
    location_code: &str,
    day: NaiveDate,
    width: usize,
) -> AppResult<String> {
    validate_location_code(location_code).map_err(|msg| {
        LedgerError::InvariantViolation(format!("Location code {:?}: {}", location_code, msg))
    })?;
    let prefix = transaction_prefix(location_code, day);
    tx.lock_numbering(&prefix).await?;
    let issued = tx.transaction_numbers(&prefix).await?;
    let sequence = next_sequence(&prefix, issued.iter().map(String::as_str));
    Ok(format_transaction_number(&prefix, sequence, width))
}
