//! In-process ledger store
//!
//! Units of work are serialized behind one async mutex. Each transaction
//! works on a private copy of the state and swaps it in on commit, so an
//! aborted operation leaves nothing behind.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{LedgerStore, LedgerTx};
use crate::error::AppResult;
use crate::models::{
    AssignmentLine, CatalogSeed, ConsignmentPeriod, Location, Party, Payment, PaymentStatus,
    PeriodKey, Product, SaleTransaction, StockBatch,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    products: HashMap<Uuid, Product>,
    locations: HashMap<Uuid, Location>,
    parties: HashMap<Uuid, Party>,
    batches: HashMap<Uuid, StockBatch>,
    /// Keyed by (party, product)
    agent_lines: HashMap<(Uuid, Uuid), AssignmentLine>,
    periods: HashMap<Uuid, ConsignmentPeriod>,
    sales: HashMap<Uuid, SaleTransaction>,
    payments: HashMap<Uuid, Payment>,
}

/// Ledger store kept entirely in memory
#[derive(Clone, Default)]
pub struct MemoryLedgerStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_product(&self, product: Product) {
        self.state.lock().await.products.insert(product.id, product);
    }

    pub async fn insert_location(&self, location: Location) {
        self.state.lock().await.locations.insert(location.id, location);
    }

    pub async fn insert_party(&self, party: Party) {
        self.state.lock().await.parties.insert(party.id, party);
    }

    /// Load catalog rows, e.g. from a seed file for local runs
    pub async fn seed(&self, catalog: CatalogSeed) {
        let mut state = self.state.lock().await;
        for product in catalog.products {
            state.products.insert(product.id, product);
        }
        for location in catalog.locations {
            state.locations.insert(location.id, location);
        }
        for party in catalog.parties {
            state.parties.insert(party.id, party);
        }
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn begin(&self) -> AppResult<Box<dyn LedgerTx>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryLedgerTx { guard, working }))
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// Unit of work over [`MemoryLedgerStore`]; holds the store lock until it ends
pub struct MemoryLedgerTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl LedgerTx for MemoryLedgerTx {
    async fn product(&mut self, id: Uuid) -> AppResult<Option<Product>> {
        Ok(self.working.products.get(&id).cloned())
    }

    async fn location(&mut self, id: Uuid) -> AppResult<Option<Location>> {
        Ok(self.working.locations.get(&id).cloned())
    }

    async fn party(&mut self, id: Uuid) -> AppResult<Option<Party>> {
        Ok(self.working.parties.get(&id).cloned())
    }

    async fn insert_batch(&mut self, batch: &StockBatch) -> AppResult<()> {
        self.working.batches.insert(batch.id, batch.clone());
        Ok(())
    }

    async fn batch_for_update(&mut self, id: Uuid) -> AppResult<Option<StockBatch>> {
        Ok(self.working.batches.get(&id).cloned())
    }

    async fn batches(&mut self, product_id: Uuid, location_id: Uuid) -> AppResult<Vec<StockBatch>> {
        self.batches_for_update(product_id, location_id).await
    }

    async fn batches_for_update(
        &mut self,
        product_id: Uuid,
        location_id: Uuid,
    ) -> AppResult<Vec<StockBatch>> {
        Ok(self
            .working
            .batches
            .values()
            .filter(|b| b.product_id == product_id && b.location_id == location_id)
            .cloned()
            .collect())
    }

    async fn update_batch(&mut self, batch: &StockBatch) -> AppResult<()> {
        self.working.batches.insert(batch.id, batch.clone());
        Ok(())
    }

    async fn agent_line_for_update(
        &mut self,
        party_id: Uuid,
        product_id: Uuid,
    ) -> AppResult<Option<AssignmentLine>> {
        Ok(self.working.agent_lines.get(&(party_id, product_id)).cloned())
    }

    async fn agent_lines(&mut self, party_id: Uuid) -> AppResult<Vec<AssignmentLine>> {
        let mut lines: Vec<AssignmentLine> = self
            .working
            .agent_lines
            .values()
            .filter(|l| l.party_id == party_id)
            .cloned()
            .collect();
        lines.sort_by_key(|l| l.created_at);
        Ok(lines)
    }

    async fn save_line(&mut self, line: &AssignmentLine) -> AppResult<()> {
        match line.period_id {
            None => {
                self.working
                    .agent_lines
                    .insert((line.party_id, line.product_id), line.clone());
            }
            Some(period_id) => {
                if let Some(period) = self.working.periods.get_mut(&period_id) {
                    match period.lines.iter_mut().find(|l| l.id == line.id) {
                        Some(existing) => *existing = line.clone(),
                        None => period.lines.push(line.clone()),
                    }
                }
            }
        }
        Ok(())
    }

    async fn lock_period(&mut self, _party_id: Uuid, _period: PeriodKey) -> AppResult<()> {
        // Same as numbering: the store lock covers it
        Ok(())
    }

    async fn period_for_update(
        &mut self,
        party_id: Uuid,
        period: PeriodKey,
    ) -> AppResult<Option<ConsignmentPeriod>> {
        Ok(self
            .working
            .periods
            .values()
            .find(|p| p.party_id == party_id && p.period == period)
            .cloned())
    }

    async fn period_by_id_for_update(&mut self, id: Uuid) -> AppResult<Option<ConsignmentPeriod>> {
        Ok(self.working.periods.get(&id).cloned())
    }

    async fn save_period(&mut self, period: &ConsignmentPeriod) -> AppResult<()> {
        self.working.periods.insert(period.id, period.clone());
        Ok(())
    }

    async fn lock_numbering(&mut self, _prefix: &str) -> AppResult<()> {
        // The store lock already serializes every unit of work
        Ok(())
    }

    async fn transaction_numbers(&mut self, prefix: &str) -> AppResult<Vec<String>> {
        Ok(self
            .working
            .sales
            .values()
            .filter(|s| s.transaction_number.starts_with(prefix))
            .map(|s| s.transaction_number.clone())
            .collect())
    }

    async fn insert_sale(&mut self, sale: &SaleTransaction) -> AppResult<()> {
        self.working.sales.insert(sale.id, sale.clone());
        Ok(())
    }

    async fn sale(&mut self, id: Uuid) -> AppResult<Option<SaleTransaction>> {
        Ok(self.working.sales.get(&id).cloned())
    }

    async fn sale_for_update(&mut self, id: Uuid) -> AppResult<Option<SaleTransaction>> {
        Ok(self.working.sales.get(&id).cloned())
    }

    async fn update_sale_status(&mut self, id: Uuid, status: PaymentStatus) -> AppResult<()> {
        if let Some(sale) = self.working.sales.get_mut(&id) {
            sale.payment_status = status;
        }
        Ok(())
    }

    async fn payments_for(&mut self, transaction_id: Uuid) -> AppResult<Vec<Payment>> {
        let mut payments: Vec<Payment> = self
            .working
            .payments
            .values()
            .filter(|p| p.transaction_id == transaction_id)
            .cloned()
            .collect();
        payments.sort_by_key(|p| p.recorded_at);
        Ok(payments)
    }

    async fn payment_for_update(&mut self, id: Uuid) -> AppResult<Option<Payment>> {
        Ok(self.working.payments.get(&id).cloned())
    }

    async fn insert_payment(&mut self, payment: &Payment) -> AppResult<()> {
        self.working.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn delete_payment(&mut self, id: Uuid) -> AppResult<()> {
        self.working.payments.remove(&id);
        Ok(())
    }

    async fn period_payments_total(&mut self, period_id: Uuid) -> AppResult<Decimal> {
        let state = &self.working;
        Ok(state
            .payments
            .values()
            .filter(|p| {
                state
                    .sales
                    .get(&p.transaction_id)
                    .map_or(false, |s| s.period_id == Some(period_id))
            })
            .map(|p| p.amount)
            .sum())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let MemoryLedgerTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
