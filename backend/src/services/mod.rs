//! Business logic services for the pharmacy inventory ledger
//!
//! Each public service method is one unit of work: it opens a transaction,
//! runs the `*_in` steps it needs against that transaction and commits.
//! The `*_in` functions never commit, so they compose into larger operations.

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{Location, Party, PeriodKey, Product};
use crate::store::LedgerTx;
use shared::{LedgerError, LedgerResult};

pub mod assignment;
pub mod payment;
pub mod sale;
pub mod stock;

pub use assignment::AssignmentService;
pub use payment::PaymentService;
pub use sale::SaleService;
pub use stock::StockService;

/// Wall clock used by every service
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now()
}

pub(crate) async fn require_product(tx: &mut dyn LedgerTx, id: Uuid) -> AppResult<Product> {
    tx.product(id)
        .await?
        .ok_or_else(|| LedgerError::NotFound(format!("Product {}", id)).into())
}

pub(crate) async fn require_location(tx: &mut dyn LedgerTx, id: Uuid) -> AppResult<Location> {
    tx.location(id)
        .await?
        .ok_or_else(|| LedgerError::NotFound(format!("Location {}", id)).into())
}

pub(crate) async fn require_party(tx: &mut dyn LedgerTx, id: Uuid) -> AppResult<Party> {
    tx.party(id)
        .await?
        .ok_or_else(|| LedgerError::NotFound(format!("Party {}", id)).into())
}

/// Requested consignment period, or the calendar month containing `today`
pub(crate) fn resolve_period(requested: Option<PeriodKey>, today: NaiveDate) -> LedgerResult<PeriodKey> {
    let period = requested.unwrap_or_else(|| PeriodKey::containing(today));
    period.validate()?;
    Ok(period)
}
