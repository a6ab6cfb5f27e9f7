//! Assignment ledger service: stock held by consignment customers and agents

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::stock::{allocate_in, credit_in};
use super::{now, require_party, resolve_period};
use crate::error::AppResult;
use crate::models::{
    AssignItemsInput, AssignmentLine, ConsignmentPeriod, Party, PartyKind, PeriodKey,
    RecordReturnInput, SaleItemInput, SaleLineItem,
};
use crate::store::{LedgerStore, LedgerTx};
use shared::{ensure_positive_quantity, ensure_valid_price, LedgerError, Quantity};

/// Assignment service for party-held stock
#[derive(Clone)]
pub struct AssignmentService {
    store: Arc<dyn LedgerStore>,
}

/// Input for carrying balances into a later period
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RollForwardInput {
    pub from: PeriodKey,
    pub to: PeriodKey,
}

/// Line items drawn from a party's held balance
#[derive(Debug)]
pub(crate) struct PartySale {
    pub items: Vec<SaleLineItem>,
    pub period_id: Option<Uuid>,
}

fn no_balance(requested: Quantity) -> LedgerError {
    LedgerError::ExceedsBalance {
        requested,
        balance: 0,
    }
}

fn require_consignment(party: &Party) -> Result<(), LedgerError> {
    match party.kind {
        PartyKind::Consignment => Ok(()),
        PartyKind::Agent => Err(LedgerError::WrongPartyKind(PartyKind::Agent.as_str())),
    }
}

// Lock order inside one unit of work: party-held rows (period, then its
// lines, or agent lines by ascending product) before stock batches, batches
// by ascending id, numbering last.

async fn load_or_open_period(
    tx: &mut dyn LedgerTx,
    party_id: Uuid,
    period: PeriodKey,
    now: DateTime<Utc>,
) -> AppResult<ConsignmentPeriod> {
    tx.lock_period(party_id, period).await?;
    Ok(tx
        .period_for_update(party_id, period)
        .await?
        .unwrap_or_else(|| ConsignmentPeriod::open(party_id, period, now)))
}

async fn require_period(
    tx: &mut dyn LedgerTx,
    party_id: Uuid,
    period: PeriodKey,
) -> AppResult<ConsignmentPeriod> {
    tx.lock_period(party_id, period).await?;
    tx.period_for_update(party_id, period)
        .await?
        .ok_or_else(|| LedgerError::NotFound(format!("Consignment period {}", period)).into())
}

impl AssignmentService {
    /// Create a new AssignmentService instance
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Allocate stock from the party's home location and add it to the
    /// party's line for the product
    pub async fn assign_items(&self, input: AssignItemsInput) -> AppResult<AssignmentLine> {
        input.validate()?;
        ensure_positive_quantity(input.quantity)?;
        ensure_valid_price(input.unit_price)?;

        let now = now();
        let today = now.date_naive();
        let mut tx = self.store.begin().await?;
        let party = require_party(tx.as_mut(), input.party_id).await?;

        let line = match party.kind {
            PartyKind::Agent => {
                if input.period.is_some() {
                    return Err(LedgerError::WrongPartyKind(PartyKind::Agent.as_str()).into());
                }
                let mut line = tx
                    .agent_line_for_update(party.id, input.product_id)
                    .await?
                    .unwrap_or_else(|| {
                        AssignmentLine::open(party.id, None, input.product_id, input.unit_price, now)
                    });
                let allocations = allocate_in(
                    tx.as_mut(),
                    input.product_id,
                    party.home_location_id,
                    input.quantity,
                    today,
                )
                .await?;
                line.add_items(&allocations, input.unit_price, now)?;
                tx.save_line(&line).await?;
                line
            }
            PartyKind::Consignment => {
                let key = resolve_period(input.period, today)?;
                let mut period = load_or_open_period(tx.as_mut(), party.id, key, now).await?;
                period.ensure_active()?;

                let allocations = allocate_in(
                    tx.as_mut(),
                    input.product_id,
                    party.home_location_id,
                    input.quantity,
                    today,
                )
                .await?;
                let line = {
                    let line = period.line_or_open(input.product_id, input.unit_price, now);
                    line.add_items(&allocations, input.unit_price, now)?;
                    line.clone()
                };
                period.recompute(now);
                period.check_invariants()?;
                tx.save_period(&period).await?;
                line
            }
        };

        tx.commit().await?;

        tracing::info!(
            party_id = %party.id,
            product_id = %input.product_id,
            quantity = input.quantity,
            balance = line.current_balance,
            "Assigned stock to party"
        );
        Ok(line)
    }

    /// Take units back from a party and re-credit the batches they came from
    pub async fn record_return(&self, input: RecordReturnInput) -> AppResult<AssignmentLine> {
        input.validate()?;
        ensure_positive_quantity(input.quantity)?;

        let now = now();
        let mut tx = self.store.begin().await?;
        let party = require_party(tx.as_mut(), input.party_id).await?;

        let (line, credited) = match party.kind {
            PartyKind::Agent => {
                if input.period.is_some() {
                    return Err(LedgerError::WrongPartyKind(PartyKind::Agent.as_str()).into());
                }
                let mut line = tx
                    .agent_line_for_update(party.id, input.product_id)
                    .await?
                    .ok_or_else(|| no_balance(input.quantity))?;
                let credited = line.record_return(input.quantity, now)?;
                tx.save_line(&line).await?;
                (line, credited)
            }
            PartyKind::Consignment => {
                let key = resolve_period(input.period, now.date_naive())?;
                let mut period = require_period(tx.as_mut(), party.id, key).await?;
                period.ensure_active()?;
                let (line, credited) = {
                    let line = period
                        .line_mut(input.product_id)
                        .ok_or_else(|| no_balance(input.quantity))?;
                    let credited = line.record_return(input.quantity, now)?;
                    (line.clone(), credited)
                };
                period.recompute(now);
                period.check_invariants()?;
                tx.save_period(&period).await?;
                (line, credited)
            }
        };
        credit_in(tx.as_mut(), &credited).await?;
        tx.commit().await?;

        tracing::info!(
            party_id = %party.id,
            product_id = %input.product_id,
            quantity = input.quantity,
            batches = credited.len(),
            reason = input.reason.as_deref().unwrap_or(""),
            "Recorded return from party"
        );
        Ok(line)
    }

    /// Carry every open balance of `from` into `to` and close `from`.
    ///
    /// Returns the target period.
    pub async fn roll_forward(
        &self,
        party_id: Uuid,
        input: RollForwardInput,
    ) -> AppResult<ConsignmentPeriod> {
        input.from.validate()?;
        input.to.validate()?;
        if input.to <= input.from {
            return Err(LedgerError::InvalidPeriod(format!(
                "cannot roll {} forward into {}",
                input.from, input.to
            ))
            .into());
        }

        let now = now();
        let mut tx = self.store.begin().await?;
        let party = require_party(tx.as_mut(), party_id).await?;
        require_consignment(&party)?;

        let mut source = require_period(tx.as_mut(), party.id, input.from).await?;
        let mut target = load_or_open_period(tx.as_mut(), party.id, input.to, now).await?;
        source.roll_forward_into(&mut target, now)?;

        tx.save_period(&source).await?;
        tx.save_period(&target).await?;
        tx.commit().await?;

        tracing::info!(
            %party_id,
            from = %input.from,
            to = %input.to,
            carried = target.totals.previous_balance,
            "Rolled consignment period forward"
        );
        Ok(target)
    }

    /// Close a consignment period without carrying anything forward
    pub async fn close_period(&self, party_id: Uuid, period: PeriodKey) -> AppResult<ConsignmentPeriod> {
        period.validate()?;
        let mut tx = self.store.begin().await?;
        let party = require_party(tx.as_mut(), party_id).await?;
        require_consignment(&party)?;

        let mut record = require_period(tx.as_mut(), party.id, period).await?;
        record.close(now())?;
        tx.save_period(&record).await?;
        tx.commit().await?;

        tracing::info!(%party_id, %period, "Closed consignment period");
        Ok(record)
    }

    /// A consignment period with its lines
    pub async fn get_period(&self, party_id: Uuid, period: PeriodKey) -> AppResult<ConsignmentPeriod> {
        period.validate()?;
        let mut tx = self.store.begin().await?;
        let party = require_party(tx.as_mut(), party_id).await?;
        require_consignment(&party)?;
        let record = require_period(tx.as_mut(), party.id, period).await?;
        Ok(record)
    }

    /// Running lines of an agent
    pub async fn agent_lines(&self, party_id: Uuid) -> AppResult<Vec<AssignmentLine>> {
        let mut tx = self.store.begin().await?;
        let party = require_party(tx.as_mut(), party_id).await?;
        if party.kind != PartyKind::Agent {
            return Err(LedgerError::WrongPartyKind(party.kind.as_str()).into());
        }
        let lines = tx.agent_lines(party.id).await?;
        Ok(lines)
    }
}

/// Record a sale of every item out of the party's held balance inside `tx`.
///
/// Items are applied in order and the first failure aborts the whole sale;
/// nothing is persisted unless every item succeeds.
pub(crate) async fn sell_from_party_in(
    tx: &mut dyn LedgerTx,
    party: &Party,
    period: Option<PeriodKey>,
    items: &[SaleItemInput],
    now: DateTime<Utc>,
) -> AppResult<PartySale> {
    let mut sold = Vec::with_capacity(items.len());

    match party.kind {
        PartyKind::Agent => {
            if period.is_some() {
                return Err(LedgerError::WrongPartyKind(PartyKind::Agent.as_str()).into());
            }
            let mut products: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
            products.sort();
            products.dedup();
            let mut lines: Vec<AssignmentLine> = Vec::with_capacity(products.len());
            for product_id in products {
                if let Some(line) = tx.agent_line_for_update(party.id, product_id).await? {
                    lines.push(line);
                }
            }

            for item in items {
                let line = lines
                    .iter_mut()
                    .find(|l| l.product_id == item.product_id)
                    .ok_or_else(|| no_balance(item.quantity))?;
                let drawn = line.record_sale(item.quantity, item.unit_price, now)?;
                sold.push(SaleLineItem::new(
                    item.product_id,
                    item.quantity,
                    item.unit_price,
                    drawn,
                ));
            }
            for line in &lines {
                tx.save_line(line).await?;
            }
            Ok(PartySale {
                items: sold,
                period_id: None,
            })
        }
        PartyKind::Consignment => {
            let key = resolve_period(period, now.date_naive())?;
            let mut record = require_period(tx, party.id, key).await?;
            record.ensure_active()?;
            for item in items {
                let line = record
                    .line_mut(item.product_id)
                    .ok_or_else(|| no_balance(item.quantity))?;
                let drawn = line.record_sale(item.quantity, item.unit_price, now)?;
                sold.push(SaleLineItem::new(
                    item.product_id,
                    item.quantity,
                    item.unit_price,
                    drawn,
                ));
            }
            record.recompute(now);
            record.check_invariants()?;
            tx.save_period(&record).await?;
            Ok(PartySale {
                items: sold,
                period_id: Some(record.id),
            })
        }
    }
}
