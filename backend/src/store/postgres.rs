//! PostgreSQL ledger store
//!
//! Row locks come from `SELECT ... FOR UPDATE`. Transaction numbering and
//! period opening are serialized with transaction-scoped advisory locks,
//! backed by the unique constraints on `transaction_number` and on
//! `(party_id, year, month)`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{types::Json, FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{LedgerStore, LedgerTx};
use crate::error::{AppError, AppResult};
use crate::models::{
    AllocationLine, AssignmentLine, BatchHolding, ClearingStatus, ConsignmentPeriod, Location,
    Party, PartyKind, Payment, PaymentMethod, PaymentStatus, PeriodKey, PeriodStatus,
    PeriodTotals, Product, SaleLineItem, SaleTransaction, SaleType, StockBatch,
};

/// Advisory lock key spaces, kept apart so numbering and period keys never
/// hash onto each other
const NUMBERING_LOCK_SPACE: i32 = 1;
const PERIOD_LOCK_SPACE: i32 = 2;

/// Ledger store backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgLedgerStore {
    db: PgPool,
}

impl PgLedgerStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn begin(&self) -> AppResult<Box<dyn LedgerTx>> {
        let tx = self.db.begin().await?;
        Ok(Box::new(PgLedgerTx { tx }))
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.db).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

/// Unit of work over one database transaction
pub struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
}

fn corrupt(what: &str, value: impl std::fmt::Display) -> AppError {
    AppError::Internal(format!("Unexpected {} in database: {}", what, value))
}

// ============================================================================
// Rows
// ============================================================================

#[derive(Debug, FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    unit: String,
}

#[derive(Debug, FromRow)]
struct LocationRow {
    id: Uuid,
    code: String,
    name: String,
}

#[derive(Debug, FromRow)]
struct PartyRow {
    id: Uuid,
    name: String,
    kind: String,
    home_location_id: Uuid,
}

impl TryFrom<PartyRow> for Party {
    type Error = AppError;

    fn try_from(row: PartyRow) -> AppResult<Self> {
        let kind = PartyKind::from_str(&row.kind).ok_or_else(|| corrupt("party kind", &row.kind))?;
        Ok(Party {
            id: row.id,
            name: row.name,
            kind,
            home_location_id: row.home_location_id,
        })
    }
}

#[derive(Debug, FromRow)]
struct BatchRow {
    id: Uuid,
    product_id: Uuid,
    location_id: Uuid,
    batch_number: String,
    manufacture_date: Option<NaiveDate>,
    expiry_date: Option<NaiveDate>,
    unit_cost: Decimal,
    quantity_received: i64,
    quantity_remaining: i64,
    received_at: DateTime<Utc>,
}

impl From<BatchRow> for StockBatch {
    fn from(row: BatchRow) -> Self {
        StockBatch {
            id: row.id,
            product_id: row.product_id,
            location_id: row.location_id,
            batch_number: row.batch_number,
            manufacture_date: row.manufacture_date,
            expiry_date: row.expiry_date,
            unit_cost: row.unit_cost,
            quantity_received: row.quantity_received,
            quantity_remaining: row.quantity_remaining,
            received_at: row.received_at,
        }
    }
}

const BATCH_COLUMNS: &str = "id, product_id, location_id, batch_number, manufacture_date, \
     expiry_date, unit_cost, quantity_received, quantity_remaining, received_at";

#[derive(Debug, FromRow)]
struct LineRow {
    id: Uuid,
    party_id: Uuid,
    period_id: Option<Uuid>,
    product_id: Uuid,
    previous_balance: i64,
    quantity_added: i64,
    quantity_sold: i64,
    quantity_returned: i64,
    current_balance: i64,
    unit_price: Decimal,
    total_assigned_value: Decimal,
    total_sold_value: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl LineRow {
    fn into_line(self, holdings: Vec<BatchHolding>) -> AssignmentLine {
        AssignmentLine {
            id: self.id,
            party_id: self.party_id,
            period_id: self.period_id,
            product_id: self.product_id,
            previous_balance: self.previous_balance,
            quantity_added: self.quantity_added,
            quantity_sold: self.quantity_sold,
            quantity_returned: self.quantity_returned,
            current_balance: self.current_balance,
            unit_price: self.unit_price,
            total_assigned_value: self.total_assigned_value,
            total_sold_value: self.total_sold_value,
            holdings,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

const LINE_COLUMNS: &str = "id, party_id, period_id, product_id, previous_balance, \
     quantity_added, quantity_sold, quantity_returned, current_balance, unit_price, \
     total_assigned_value, total_sold_value, created_at, updated_at";

#[derive(Debug, FromRow)]
struct HoldingRow {
    line_id: Uuid,
    batch_id: Uuid,
    batch_number: String,
    expiry_date: Option<NaiveDate>,
    quantity: i64,
    unit_cost: Decimal,
    sequence: i32,
}

#[derive(Debug, FromRow)]
struct PeriodRow {
    id: Uuid,
    party_id: Uuid,
    year: i32,
    month: i32,
    status: String,
    previous_balance: i64,
    quantity_added: i64,
    quantity_sold: i64,
    quantity_returned: i64,
    current_balance: i64,
    total_consigned_value: Decimal,
    total_sold_value: Decimal,
    amount_paid: Decimal,
    balance_due: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

const PERIOD_COLUMNS: &str = "id, party_id, year, month, status, previous_balance, \
     quantity_added, quantity_sold, quantity_returned, current_balance, \
     total_consigned_value, total_sold_value, amount_paid, balance_due, created_at, updated_at";

impl PeriodRow {
    fn into_period(self, lines: Vec<AssignmentLine>) -> AppResult<ConsignmentPeriod> {
        let month = u32::try_from(self.month).map_err(|_| corrupt("period month", self.month))?;
        let status =
            PeriodStatus::from_str(&self.status).ok_or_else(|| corrupt("period status", &self.status))?;
        Ok(ConsignmentPeriod {
            id: self.id,
            party_id: self.party_id,
            period: PeriodKey {
                year: self.year,
                month,
            },
            status,
            totals: PeriodTotals {
                previous_balance: self.previous_balance,
                quantity_added: self.quantity_added,
                quantity_sold: self.quantity_sold,
                quantity_returned: self.quantity_returned,
                current_balance: self.current_balance,
                total_consigned_value: self.total_consigned_value,
                total_sold_value: self.total_sold_value,
            },
            amount_paid: self.amount_paid,
            balance_due: self.balance_due,
            lines,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct SaleRow {
    id: Uuid,
    transaction_number: String,
    sale_type: String,
    party_id: Option<Uuid>,
    location_id: Uuid,
    period_id: Option<Uuid>,
    customer_name: Option<String>,
    total_amount: Decimal,
    payment_status: String,
    created_at: DateTime<Utc>,
}

const SALE_COLUMNS: &str = "id, transaction_number, sale_type, party_id, location_id, \
     period_id, customer_name, total_amount, payment_status, created_at";

#[derive(Debug, FromRow)]
struct SaleItemRow {
    id: Uuid,
    product_id: Uuid,
    batch_id: Option<Uuid>,
    quantity: i64,
    unit_price: Decimal,
    line_total: Decimal,
}

#[derive(Debug, FromRow)]
struct AllocationRow {
    line_item_id: Uuid,
    batch_id: Uuid,
    batch_number: String,
    expiry_date: Option<NaiveDate>,
    quantity: i64,
    unit_cost: Decimal,
}

#[derive(Debug, FromRow)]
struct PaymentRow {
    id: Uuid,
    transaction_id: Uuid,
    amount: Decimal,
    method: Json<PaymentMethod>,
    clearing_status: String,
    recorded_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = AppError;

    fn try_from(row: PaymentRow) -> AppResult<Self> {
        let clearing_status = ClearingStatus::from_str(&row.clearing_status)
            .ok_or_else(|| corrupt("clearing status", &row.clearing_status))?;
        Ok(Payment {
            id: row.id,
            transaction_id: row.transaction_id,
            amount: row.amount,
            method: row.method.0,
            clearing_status,
            recorded_at: row.recorded_at,
        })
    }
}

const PAYMENT_COLUMNS: &str = "id, transaction_id, amount, method, clearing_status, recorded_at";

// ============================================================================
// Loading helpers
// ============================================================================

impl PgLedgerTx {
    /// Transaction-scoped advisory lock on `key` within `space`
    async fn advisory_lock(&mut self, space: i32, key: &str) -> AppResult<()> {
        sqlx::query("SELECT pg_advisory_xact_lock($1, hashtext($2))")
            .bind(space)
            .bind(key)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn attach_holdings(&mut self, rows: Vec<LineRow>) -> AppResult<Vec<AssignmentLine>> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let holding_rows = sqlx::query_as::<_, HoldingRow>(
            r#"
            SELECT line_id, batch_id, batch_number, expiry_date, quantity, unit_cost, sequence
            FROM assignment_holdings
            WHERE line_id = ANY($1)
            ORDER BY line_id, sequence
            "#,
        )
        .bind(&ids)
        .fetch_all(&mut *self.tx)
        .await?;

        let mut by_line: HashMap<Uuid, Vec<BatchHolding>> = HashMap::new();
        for row in holding_rows {
            by_line.entry(row.line_id).or_default().push(BatchHolding {
                batch_id: row.batch_id,
                batch_number: row.batch_number,
                expiry_date: row.expiry_date,
                quantity: row.quantity,
                unit_cost: row.unit_cost,
                sequence: row.sequence,
            });
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let holdings = by_line.remove(&row.id).unwrap_or_default();
                row.into_line(holdings)
            })
            .collect())
    }

    async fn load_period(&mut self, row: PeriodRow) -> AppResult<ConsignmentPeriod> {
        let line_rows = sqlx::query_as::<_, LineRow>(&format!(
            "SELECT {} FROM assignment_lines WHERE period_id = $1 ORDER BY created_at, id FOR UPDATE",
            LINE_COLUMNS
        ))
        .bind(row.id)
        .fetch_all(&mut *self.tx)
        .await?;
        let lines = self.attach_holdings(line_rows).await?;
        row.into_period(lines)
    }

    async fn load_sale(&mut self, row: SaleRow) -> AppResult<SaleTransaction> {
        let item_rows = sqlx::query_as::<_, SaleItemRow>(
            r#"
            SELECT id, product_id, batch_id, quantity, unit_price, line_total
            FROM sale_line_items
            WHERE transaction_id = $1
            ORDER BY position
            "#,
        )
        .bind(row.id)
        .fetch_all(&mut *self.tx)
        .await?;

        let item_ids: Vec<Uuid> = item_rows.iter().map(|r| r.id).collect();
        let allocation_rows = sqlx::query_as::<_, AllocationRow>(
            r#"
            SELECT line_item_id, batch_id, batch_number, expiry_date, quantity, unit_cost
            FROM sale_allocations
            WHERE line_item_id = ANY($1)
            ORDER BY line_item_id, position
            "#,
        )
        .bind(&item_ids)
        .fetch_all(&mut *self.tx)
        .await?;

        let mut by_item: HashMap<Uuid, Vec<AllocationLine>> = HashMap::new();
        for a in allocation_rows {
            by_item.entry(a.line_item_id).or_default().push(AllocationLine {
                batch_id: a.batch_id,
                batch_number: a.batch_number,
                expiry_date: a.expiry_date,
                quantity: a.quantity,
                unit_cost: a.unit_cost,
            });
        }

        let items = item_rows
            .into_iter()
            .map(|item| SaleLineItem {
                id: item.id,
                product_id: item.product_id,
                batch_id: item.batch_id,
                quantity: item.quantity,
                unit_price: item.unit_price,
                line_total: item.line_total,
                allocations: by_item.remove(&item.id).unwrap_or_default(),
            })
            .collect();

        let sale_type =
            SaleType::from_str(&row.sale_type).ok_or_else(|| corrupt("sale type", &row.sale_type))?;
        let payment_status = PaymentStatus::from_str(&row.payment_status)
            .ok_or_else(|| corrupt("payment status", &row.payment_status))?;

        Ok(SaleTransaction {
            id: row.id,
            transaction_number: row.transaction_number,
            sale_type,
            party_id: row.party_id,
            location_id: row.location_id,
            period_id: row.period_id,
            customer_name: row.customer_name,
            total_amount: row.total_amount,
            payment_status,
            items,
            created_at: row.created_at,
        })
    }

    async fn fetch_sale(&mut self, id: Uuid, lock: bool) -> AppResult<Option<SaleTransaction>> {
        let sql = format!(
            "SELECT {} FROM sale_transactions WHERE id = $1{}",
            SALE_COLUMNS,
            if lock { " FOR UPDATE" } else { "" }
        );
        let row = sqlx::query_as::<_, SaleRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        match row {
            Some(row) => Ok(Some(self.load_sale(row).await?)),
            None => Ok(None),
        }
    }
}

// ============================================================================
// Unit of work
// ============================================================================

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn product(&mut self, id: Uuid) -> AppResult<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>("SELECT id, name, unit FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(|r| Product {
            id: r.id,
            name: r.name,
            unit: r.unit,
        }))
    }

    async fn location(&mut self, id: Uuid) -> AppResult<Option<Location>> {
        let row =
            sqlx::query_as::<_, LocationRow>("SELECT id, code, name FROM locations WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut *self.tx)
                .await?;
        Ok(row.map(|r| Location {
            id: r.id,
            code: r.code,
            name: r.name,
        }))
    }

    async fn party(&mut self, id: Uuid) -> AppResult<Option<Party>> {
        sqlx::query_as::<_, PartyRow>(
            "SELECT id, name, kind, home_location_id FROM parties WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?
        .map(Party::try_from)
        .transpose()
    }

    async fn insert_batch(&mut self, batch: &StockBatch) -> AppResult<()> {
        sqlx::query(&format!(
            "INSERT INTO stock_batches ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            BATCH_COLUMNS
        ))
        .bind(batch.id)
        .bind(batch.product_id)
        .bind(batch.location_id)
        .bind(&batch.batch_number)
        .bind(batch.manufacture_date)
        .bind(batch.expiry_date)
        .bind(batch.unit_cost)
        .bind(batch.quantity_received)
        .bind(batch.quantity_remaining)
        .bind(batch.received_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn batch_for_update(&mut self, id: Uuid) -> AppResult<Option<StockBatch>> {
        let row = sqlx::query_as::<_, BatchRow>(&format!(
            "SELECT {} FROM stock_batches WHERE id = $1 FOR UPDATE",
            BATCH_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(StockBatch::from))
    }

    async fn batches(&mut self, product_id: Uuid, location_id: Uuid) -> AppResult<Vec<StockBatch>> {
        let rows = sqlx::query_as::<_, BatchRow>(&format!(
            "SELECT {} FROM stock_batches WHERE product_id = $1 AND location_id = $2",
            BATCH_COLUMNS
        ))
        .bind(product_id)
        .bind(location_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows.into_iter().map(StockBatch::from).collect())
    }

    async fn batches_for_update(
        &mut self,
        product_id: Uuid,
        location_id: Uuid,
    ) -> AppResult<Vec<StockBatch>> {
        let rows = sqlx::query_as::<_, BatchRow>(&format!(
            "SELECT {} FROM stock_batches WHERE product_id = $1 AND location_id = $2 \
             ORDER BY id FOR UPDATE",
            BATCH_COLUMNS
        ))
        .bind(product_id)
        .bind(location_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows.into_iter().map(StockBatch::from).collect())
    }

    async fn update_batch(&mut self, batch: &StockBatch) -> AppResult<()> {
        sqlx::query("UPDATE stock_batches SET quantity_remaining = $2 WHERE id = $1")
            .bind(batch.id)
            .bind(batch.quantity_remaining)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn agent_line_for_update(
        &mut self,
        party_id: Uuid,
        product_id: Uuid,
    ) -> AppResult<Option<AssignmentLine>> {
        let rows = sqlx::query_as::<_, LineRow>(&format!(
            "SELECT {} FROM assignment_lines \
             WHERE party_id = $1 AND product_id = $2 AND period_id IS NULL FOR UPDATE",
            LINE_COLUMNS
        ))
        .bind(party_id)
        .bind(product_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(self.attach_holdings(rows).await?.into_iter().next())
    }

    async fn agent_lines(&mut self, party_id: Uuid) -> AppResult<Vec<AssignmentLine>> {
        let rows = sqlx::query_as::<_, LineRow>(&format!(
            "SELECT {} FROM assignment_lines \
             WHERE party_id = $1 AND period_id IS NULL ORDER BY created_at, id",
            LINE_COLUMNS
        ))
        .bind(party_id)
        .fetch_all(&mut *self.tx)
        .await?;
        self.attach_holdings(rows).await
    }

    async fn save_line(&mut self, line: &AssignmentLine) -> AppResult<()> {
        sqlx::query(&format!(
            r#"
            INSERT INTO assignment_lines ({})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (id) DO UPDATE SET
                previous_balance = EXCLUDED.previous_balance,
                quantity_added = EXCLUDED.quantity_added,
                quantity_sold = EXCLUDED.quantity_sold,
                quantity_returned = EXCLUDED.quantity_returned,
                current_balance = EXCLUDED.current_balance,
                unit_price = EXCLUDED.unit_price,
                total_assigned_value = EXCLUDED.total_assigned_value,
                total_sold_value = EXCLUDED.total_sold_value,
                updated_at = EXCLUDED.updated_at
            "#,
            LINE_COLUMNS
        ))
        .bind(line.id)
        .bind(line.party_id)
        .bind(line.period_id)
        .bind(line.product_id)
        .bind(line.previous_balance)
        .bind(line.quantity_added)
        .bind(line.quantity_sold)
        .bind(line.quantity_returned)
        .bind(line.current_balance)
        .bind(line.unit_price)
        .bind(line.total_assigned_value)
        .bind(line.total_sold_value)
        .bind(line.created_at)
        .bind(line.updated_at)
        .execute(&mut *self.tx)
        .await?;

        sqlx::query("DELETE FROM assignment_holdings WHERE line_id = $1")
            .bind(line.id)
            .execute(&mut *self.tx)
            .await?;

        for holding in &line.holdings {
            sqlx::query(
                r#"
                INSERT INTO assignment_holdings
                    (line_id, batch_id, batch_number, expiry_date, quantity, unit_cost, sequence)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(line.id)
            .bind(holding.batch_id)
            .bind(&holding.batch_number)
            .bind(holding.expiry_date)
            .bind(holding.quantity)
            .bind(holding.unit_cost)
            .bind(holding.sequence)
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(())
    }

    async fn lock_period(&mut self, party_id: Uuid, period: PeriodKey) -> AppResult<()> {
        self.advisory_lock(PERIOD_LOCK_SPACE, &format!("{}:{}", party_id, period))
            .await
    }

    async fn period_for_update(
        &mut self,
        party_id: Uuid,
        period: PeriodKey,
    ) -> AppResult<Option<ConsignmentPeriod>> {
        let row = sqlx::query_as::<_, PeriodRow>(&format!(
            "SELECT {} FROM consignment_periods \
             WHERE party_id = $1 AND year = $2 AND month = $3 FOR UPDATE",
            PERIOD_COLUMNS
        ))
        .bind(party_id)
        .bind(period.year)
        .bind(period.month as i32)
        .fetch_optional(&mut *self.tx)
        .await?;
        match row {
            Some(row) => Ok(Some(self.load_period(row).await?)),
            None => Ok(None),
        }
    }

    async fn period_by_id_for_update(&mut self, id: Uuid) -> AppResult<Option<ConsignmentPeriod>> {
        let row = sqlx::query_as::<_, PeriodRow>(&format!(
            "SELECT {} FROM consignment_periods WHERE id = $1 FOR UPDATE",
            PERIOD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        match row {
            Some(row) => Ok(Some(self.load_period(row).await?)),
            None => Ok(None),
        }
    }

    async fn save_period(&mut self, period: &ConsignmentPeriod) -> AppResult<()> {
        let totals = &period.totals;
        sqlx::query(&format!(
            r#"
            INSERT INTO consignment_periods ({})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                previous_balance = EXCLUDED.previous_balance,
                quantity_added = EXCLUDED.quantity_added,
                quantity_sold = EXCLUDED.quantity_sold,
                quantity_returned = EXCLUDED.quantity_returned,
                current_balance = EXCLUDED.current_balance,
                total_consigned_value = EXCLUDED.total_consigned_value,
                total_sold_value = EXCLUDED.total_sold_value,
                amount_paid = EXCLUDED.amount_paid,
                balance_due = EXCLUDED.balance_due,
                updated_at = EXCLUDED.updated_at
            "#,
            PERIOD_COLUMNS
        ))
        .bind(period.id)
        .bind(period.party_id)
        .bind(period.period.year)
        .bind(period.period.month as i32)
        .bind(period.status.as_str())
        .bind(totals.previous_balance)
        .bind(totals.quantity_added)
        .bind(totals.quantity_sold)
        .bind(totals.quantity_returned)
        .bind(totals.current_balance)
        .bind(totals.total_consigned_value)
        .bind(totals.total_sold_value)
        .bind(period.amount_paid)
        .bind(period.balance_due)
        .bind(period.created_at)
        .bind(period.updated_at)
        .execute(&mut *self.tx)
        .await?;

        for line in &period.lines {
            self.save_line(line).await?;
        }
        Ok(())
    }

    async fn lock_numbering(&mut self, prefix: &str) -> AppResult<()> {
        self.advisory_lock(NUMBERING_LOCK_SPACE, prefix).await
    }

    async fn transaction_numbers(&mut self, prefix: &str) -> AppResult<Vec<String>> {
        let pattern = format!("{}-%", prefix.replace('%', "\\%").replace('_', "\\_"));
        let numbers = sqlx::query_scalar::<_, String>(
            "SELECT transaction_number FROM sale_transactions WHERE transaction_number LIKE $1",
        )
        .bind(pattern)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(numbers)
    }

    async fn insert_sale(&mut self, sale: &SaleTransaction) -> AppResult<()> {
        sqlx::query(&format!(
            "INSERT INTO sale_transactions ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            SALE_COLUMNS
        ))
        .bind(sale.id)
        .bind(&sale.transaction_number)
        .bind(sale.sale_type.as_str())
        .bind(sale.party_id)
        .bind(sale.location_id)
        .bind(sale.period_id)
        .bind(&sale.customer_name)
        .bind(sale.total_amount)
        .bind(sale.payment_status.as_str())
        .bind(sale.created_at)
        .execute(&mut *self.tx)
        .await?;

        for (position, item) in sale.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO sale_line_items
                    (id, transaction_id, position, product_id, batch_id, quantity, unit_price, line_total)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(item.id)
            .bind(sale.id)
            .bind(position as i32)
            .bind(item.product_id)
            .bind(item.batch_id)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(item.line_total)
            .execute(&mut *self.tx)
            .await?;

            for (position, allocation) in item.allocations.iter().enumerate() {
                sqlx::query(
                    r#"
                    INSERT INTO sale_allocations
                        (line_item_id, position, batch_id, batch_number, expiry_date, quantity, unit_cost)
                    VALUES ($1, $2, $3, $4, $5, $6, $7)
                    "#,
                )
                .bind(item.id)
                .bind(position as i32)
                .bind(allocation.batch_id)
                .bind(&allocation.batch_number)
                .bind(allocation.expiry_date)
                .bind(allocation.quantity)
                .bind(allocation.unit_cost)
                .execute(&mut *self.tx)
                .await?;
            }
        }
        Ok(())
    }

    async fn sale(&mut self, id: Uuid) -> AppResult<Option<SaleTransaction>> {
        self.fetch_sale(id, false).await
    }

    async fn sale_for_update(&mut self, id: Uuid) -> AppResult<Option<SaleTransaction>> {
        self.fetch_sale(id, true).await
    }

    async fn update_sale_status(&mut self, id: Uuid, status: PaymentStatus) -> AppResult<()> {
        sqlx::query("UPDATE sale_transactions SET payment_status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn payments_for(&mut self, transaction_id: Uuid) -> AppResult<Vec<Payment>> {
        sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE transaction_id = $1 ORDER BY recorded_at, id",
            PAYMENT_COLUMNS
        ))
        .bind(transaction_id)
        .fetch_all(&mut *self.tx)
        .await?
        .into_iter()
        .map(Payment::try_from)
        .collect()
    }

    async fn payment_for_update(&mut self, id: Uuid) -> AppResult<Option<Payment>> {
        sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE id = $1 FOR UPDATE",
            PAYMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?
        .map(Payment::try_from)
        .transpose()
    }

    async fn insert_payment(&mut self, payment: &Payment) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payments
                (id, transaction_id, amount, method_type, reference, method, clearing_status, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(payment.id)
        .bind(payment.transaction_id)
        .bind(payment.amount)
        .bind(payment.method.kind())
        .bind(payment.method.reference())
        .bind(Json(&payment.method))
        .bind(payment.clearing_status.as_str())
        .bind(payment.recorded_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_payment(&mut self, id: Uuid) -> AppResult<()> {
        sqlx::query("DELETE FROM payments WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn period_payments_total(&mut self, period_id: Uuid) -> AppResult<Decimal> {
        let total = sqlx::query_scalar::<_, Decimal>(
            r#"
            SELECT COALESCE(SUM(p.amount), 0)
            FROM payments p
            JOIN sale_transactions s ON s.id = p.transaction_id
            WHERE s.period_id = $1
            "#,
        )
        .bind(period_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(total)
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let PgLedgerTx { tx } = *self;
        tx.commit().await?;
        Ok(())
    }
}
