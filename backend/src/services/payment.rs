//! Payment reconciliation: append-only payments and derived payment status

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use super::now;
use crate::error::AppResult;
use crate::models::{Payment, PaymentMethod, PaymentSummary, RecordPaymentInput, SaleTransaction};
use crate::store::{LedgerStore, LedgerTx};
use shared::LedgerError;

/// Payment service
#[derive(Clone)]
pub struct PaymentService {
    store: Arc<dyn LedgerStore>,
}

/// Recorded payment together with the transaction's new position
#[derive(Debug, Clone, Serialize)]
pub struct PaymentReceipt {
    pub payment: Payment,
    /// Method-specific fields (cheque number, bank, references)
    pub metadata: serde_json::Value,
    pub summary: PaymentSummary,
}

impl PaymentService {
    /// Create a new PaymentService instance
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Append a payment to a sale transaction
    pub async fn record_payment(
        &self,
        transaction_id: Uuid,
        input: RecordPaymentInput,
    ) -> AppResult<PaymentReceipt> {
        let mut tx = self.store.begin().await?;
        let receipt =
            record_payment_in(tx.as_mut(), transaction_id, input.amount, input.method, now()).await?;
        tx.commit().await?;

        tracing::info!(
            %transaction_id,
            payment_id = %receipt.payment.id,
            amount = %receipt.payment.amount,
            method = receipt.payment.method.kind(),
            status = receipt.summary.status.as_str(),
            "Recorded payment"
        );
        Ok(receipt)
    }

    /// Delete a payment and re-derive the transaction's status
    pub async fn remove_payment(&self, payment_id: Uuid) -> AppResult<PaymentSummary> {
        let mut tx = self.store.begin().await?;
        let payment = tx
            .payment_for_update(payment_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("Payment {}", payment_id)))?;
        let sale = require_sale(tx.as_mut(), payment.transaction_id).await?;

        tx.delete_payment(payment.id).await?;
        let payments = tx.payments_for(sale.id).await?;
        let summary = PaymentSummary::compute(sale.id, sale.total_amount, &payments);
        apply_summary_in(tx.as_mut(), &sale, &summary, now()).await?;
        tx.commit().await?;

        tracing::info!(
            %payment_id,
            transaction_id = %sale.id,
            amount = %payment.amount,
            status = summary.status.as_str(),
            "Removed payment"
        );
        Ok(summary)
    }

    /// Current payment position of a transaction
    pub async fn payment_summary(&self, transaction_id: Uuid) -> AppResult<PaymentSummary> {
        let mut tx = self.store.begin().await?;
        let sale = tx
            .sale(transaction_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("Sale transaction {}", transaction_id)))?;
        let payments = tx.payments_for(sale.id).await?;
        Ok(PaymentSummary::compute(sale.id, sale.total_amount, &payments))
    }

    /// Every payment recorded against a transaction, oldest first
    pub async fn list_payments(&self, transaction_id: Uuid) -> AppResult<Vec<Payment>> {
        let mut tx = self.store.begin().await?;
        if tx.sale(transaction_id).await?.is_none() {
            return Err(LedgerError::NotFound(format!("Sale transaction {}", transaction_id)).into());
        }
        let payments = tx.payments_for(transaction_id).await?;
        Ok(payments)
    }
}

async fn require_sale(tx: &mut dyn LedgerTx, id: Uuid) -> AppResult<SaleTransaction> {
    tx.sale_for_update(id)
        .await?
        .ok_or_else(|| LedgerError::NotFound(format!("Sale transaction {}", id)).into())
}

/// Validate and append a payment inside `tx`, then re-derive status
pub(crate) async fn record_payment_in(
    tx: &mut dyn LedgerTx,
    transaction_id: Uuid,
    amount: Decimal,
    method: PaymentMethod,
    now: DateTime<Utc>,
) -> AppResult<PaymentReceipt> {
    let sale = require_sale(tx, transaction_id).await?;
    let mut payments = tx.payments_for(sale.id).await?;

    let payment = Payment::accept(sale.id, sale.total_amount, &payments, amount, method, now)
        .map_err(|err| {
            tracing::warn!(%transaction_id, %amount, "Payment rejected: {}", err);
            err
        })?;
    tx.insert_payment(&payment).await?;
    payments.push(payment.clone());

    let summary = PaymentSummary::compute(sale.id, sale.total_amount, &payments);
    apply_summary_in(tx, &sale, &summary, now).await?;
    Ok(PaymentReceipt {
        metadata: payment.method.metadata(),
        payment,
        summary,
    })
}

/// Persist a re-derived status and refresh the owning period's amount paid
async fn apply_summary_in(
    tx: &mut dyn LedgerTx,
    sale: &SaleTransaction,
    summary: &PaymentSummary,
    now: DateTime<Utc>,
) -> AppResult<()> {
    if summary.status != sale.payment_status {
        tx.update_sale_status(sale.id, summary.status).await?;
    }

    if let Some(period_id) = sale.period_id {
        let mut period = tx
            .period_by_id_for_update(period_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("Consignment period {}", period_id)))?;
        let paid = tx.period_payments_total(period_id).await?;
        period.set_amount_paid(paid, now);
        tx.save_period(&period).await?;
        tracing::debug!(%period_id, amount_paid = %paid, "Refreshed period amount paid");
    }
    Ok(())
}
