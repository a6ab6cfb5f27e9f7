//! Sale transactions and transaction numbering

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::catalog::PartyKind;
use super::payment::{PaymentMethod, PaymentStatus};
use super::stock::AllocationLine;
use crate::types::{line_total, PeriodKey, Quantity};

/// Default zero-padding of the per-day sequence
pub const DEFAULT_SEQUENCE_WIDTH: usize = 4;

/// Kind of sale recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaleType {
    Retail,
    Bulk,
    ConsignmentSale,
    AgentSale,
}

impl SaleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleType::Retail => "retail",
            SaleType::Bulk => "bulk",
            SaleType::ConsignmentSale => "consignment_sale",
            SaleType::AgentSale => "agent_sale",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "retail" => Some(SaleType::Retail),
            "bulk" => Some(SaleType::Bulk),
            "consignment_sale" => Some(SaleType::ConsignmentSale),
            "agent_sale" => Some(SaleType::AgentSale),
            _ => None,
        }
    }

    /// Sale type recorded when a party sells from its held balance
    pub fn for_party(kind: PartyKind) -> Self {
        match kind {
            PartyKind::Consignment => SaleType::ConsignmentSale,
            PartyKind::Agent => SaleType::AgentSale,
        }
    }

    /// Settlement applied when the caller does not choose one.
    ///
    /// Walk-in retail is paid at the counter; everything else is invoiced.
    pub fn default_settlement(&self, counter_method: &PaymentMethod) -> Settlement {
        match self {
            SaleType::Retail => Settlement::PaidInFull {
                method: counter_method.clone(),
            },
            SaleType::Bulk | SaleType::ConsignmentSale | SaleType::AgentSale => {
                Settlement::Unsettled
            }
        }
    }
}

/// One product line on a sale
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SaleLineItem {
    pub id: Uuid,
    pub product_id: Uuid,
    /// First batch the units were drawn from
    pub batch_id: Option<Uuid>,
    pub quantity: Quantity,
    pub unit_price: Decimal,
    pub line_total: Decimal,
    /// Every batch the units were drawn from, oldest first
    pub allocations: Vec<AllocationLine>,
}

impl SaleLineItem {
    pub fn new(
        product_id: Uuid,
        quantity: Quantity,
        unit_price: Decimal,
        allocations: Vec<AllocationLine>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            product_id,
            batch_id: allocations.first().map(|a| a.batch_id),
            quantity,
            unit_price,
            line_total: line_total(quantity, unit_price),
            allocations,
        }
    }
}

/// Immutable sale header; only `payment_status` changes after creation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SaleTransaction {
    pub id: Uuid,
    pub transaction_number: String,
    pub sale_type: SaleType,
    pub party_id: Option<Uuid>,
    pub location_id: Uuid,
    /// Consignment period the sale was drawn from
    pub period_id: Option<Uuid>,
    pub customer_name: Option<String>,
    pub total_amount: Decimal,
    pub payment_status: PaymentStatus,
    pub items: Vec<SaleLineItem>,
    pub created_at: DateTime<Utc>,
}

impl SaleTransaction {
    pub fn total_of(items: &[SaleLineItem]) -> Decimal {
        items.iter().map(|i| i.line_total).sum()
    }
}

/// Requested product line on a sale
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleItemInput {
    pub product_id: Uuid,
    pub quantity: Quantity,
    pub unit_price: Decimal,
}

/// Counter sale kinds that draw directly from location stock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterSaleType {
    Retail,
    Bulk,
}

impl From<CounterSaleType> for SaleType {
    fn from(kind: CounterSaleType) -> Self {
        match kind {
            CounterSaleType::Retail => SaleType::Retail,
            CounterSaleType::Bulk => SaleType::Bulk,
        }
    }
}

/// Where the sold units come from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum SaleSource {
    /// A consignment customer or agent selling from its held balance
    Party {
        party_id: Uuid,
        /// Consignment period; defaults to the current calendar month
        period: Option<PeriodKey>,
    },
    /// Retail or bulk sale allocated FIFO from a location's stock
    Counter {
        location_id: Uuid,
        sale_type: CounterSaleType,
    },
}

/// How the sale is settled at creation time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum Settlement {
    /// No payment yet; status starts `Unpaid`
    Unsettled,
    /// A payment for the full total is recorded with the sale
    PaidInFull { method: PaymentMethod },
}

/// Input for recording a sale
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateSaleInput {
    pub source: SaleSource,
    #[validate(length(min = 1, max = 200))]
    pub items: Vec<SaleItemInput>,
    pub settlement: Option<Settlement>,
    #[validate(length(max = 200))]
    pub customer_name: Option<String>,
}

// ============================================================================
// Transaction Numbering
// ============================================================================

/// Numbering prefix for a location and business day, e.g. `MAIN-20240315`
pub fn transaction_prefix(location_code: &str, day: NaiveDate) -> String {
    format!("{}-{}", location_code, day.format("%Y%m%d"))
}

/// Full transaction number, e.g. `MAIN-20240315-0007`
pub fn format_transaction_number(prefix: &str, sequence: u32, width: usize) -> String {
    format!("{}-{:0width$}", prefix, sequence, width = width)
}

/// Sequence part of `number` if it was issued under `prefix`
pub fn parse_sequence(prefix: &str, number: &str) -> Option<u32> {
    let rest = number.strip_prefix(prefix)?.strip_prefix('-')?;
    if rest.is_empty() || !rest.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    rest.parse().ok()
}

/// Next sequence after the highest number already issued under `prefix`
pub fn next_sequence<'a, I>(prefix: &str, existing: I) -> u32
where
    I: IntoIterator<Item = &'a str>,
{
    existing
        .into_iter()
        .filter_map(|number| parse_sequence(prefix, number))
        .max()
        .map_or(1, |highest| highest + 1)
}
