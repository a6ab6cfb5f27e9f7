//! Transactional store abstraction for the ledger
//!
//! Every service operation opens exactly one [`LedgerTx`], performs its reads
//! and writes through it, and commits. Dropping a transaction without
//! committing discards every write made through it.
//!
//! `*_for_update` reads lock the returned rows until the transaction ends, so
//! concurrent operations touching the same batch, line, period or sale are
//! serialized.

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{
    AssignmentLine, ConsignmentPeriod, Location, Party, Payment, PaymentStatus, PeriodKey,
    Product, SaleTransaction, StockBatch,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryLedgerStore;
pub use postgres::PgLedgerStore;

/// Factory for units of work
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Open a new unit of work
    async fn begin(&self) -> AppResult<Box<dyn LedgerTx>>;

    /// Connectivity probe used by the health endpoint
    async fn ping(&self) -> AppResult<()>;

    /// Short name of the backing store, reported by the health endpoint
    fn backend_name(&self) -> &'static str;
}

/// One atomic unit of work over ledger rows
#[async_trait]
pub trait LedgerTx: Send {
    // Catalog (read-only)
    async fn product(&mut self, id: Uuid) -> AppResult<Option<Product>>;
    async fn location(&mut self, id: Uuid) -> AppResult<Option<Location>>;
    async fn party(&mut self, id: Uuid) -> AppResult<Option<Party>>;

    // Stock batches
    async fn insert_batch(&mut self, batch: &StockBatch) -> AppResult<()>;
    async fn batch_for_update(&mut self, id: Uuid) -> AppResult<Option<StockBatch>>;
    /// Every batch of a product at a location, without locking
    async fn batches(&mut self, product_id: Uuid, location_id: Uuid) -> AppResult<Vec<StockBatch>>;
    /// Every batch of a product at a location, empty and expired ones included
    async fn batches_for_update(
        &mut self,
        product_id: Uuid,
        location_id: Uuid,
    ) -> AppResult<Vec<StockBatch>>;
    async fn update_batch(&mut self, batch: &StockBatch) -> AppResult<()>;

    // Agent lines (no period)
    async fn agent_line_for_update(
        &mut self,
        party_id: Uuid,
        product_id: Uuid,
    ) -> AppResult<Option<AssignmentLine>>;
    async fn agent_lines(&mut self, party_id: Uuid) -> AppResult<Vec<AssignmentLine>>;
    /// Insert or replace a line together with its batch holdings
    async fn save_line(&mut self, line: &AssignmentLine) -> AppResult<()>;

    // Consignment periods (loaded with their lines)
    /// Serialize opening or mutating `period` of `party_id` until the
    /// transaction ends, including while no row exists yet
    async fn lock_period(&mut self, party_id: Uuid, period: PeriodKey) -> AppResult<()>;
    async fn period_for_update(
        &mut self,
        party_id: Uuid,
        period: PeriodKey,
    ) -> AppResult<Option<ConsignmentPeriod>>;
    async fn period_by_id_for_update(&mut self, id: Uuid) -> AppResult<Option<ConsignmentPeriod>>;
    /// Insert or replace a period header and every one of its lines
    async fn save_period(&mut self, period: &ConsignmentPeriod) -> AppResult<()>;

    // Sale transactions
    /// Serialize numbering for `prefix` until the transaction ends
    async fn lock_numbering(&mut self, prefix: &str) -> AppResult<()>;
    async fn transaction_numbers(&mut self, prefix: &str) -> AppResult<Vec<String>>;
    async fn insert_sale(&mut self, sale: &SaleTransaction) -> AppResult<()>;
    async fn sale(&mut self, id: Uuid) -> AppResult<Option<SaleTransaction>>;
    async fn sale_for_update(&mut self, id: Uuid) -> AppResult<Option<SaleTransaction>>;
    async fn update_sale_status(&mut self, id: Uuid, status: PaymentStatus) -> AppResult<()>;

    // Payments
    async fn payments_for(&mut self, transaction_id: Uuid) -> AppResult<Vec<Payment>>;
    async fn payment_for_update(&mut self, id: Uuid) -> AppResult<Option<Payment>>;
    async fn insert_payment(&mut self, payment: &Payment) -> AppResult<()>;
    async fn delete_payment(&mut self, id: Uuid) -> AppResult<()>;
    /// Sum of payments on every sale drawn from a consignment period
    async fn period_payments_total(&mut self, period_id: Uuid) -> AppResult<Decimal>;

    /// Make every write of this unit of work durable
    async fn commit(self: Box<Self>) -> AppResult<()>;
}
