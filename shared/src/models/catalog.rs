//! Catalog records the ledger reads but never maintains

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stocked product
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    /// Dispensing unit (e.g. "box", "strip", "bottle")
    pub unit: String,
}

/// A stock-holding location (branch, warehouse)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Location {
    pub id: Uuid,
    /// Short uppercase code used to prefix transaction numbers
    pub code: String,
    pub name: String,
}

/// Kind of external party that can hold assigned stock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartyKind {
    /// Customer holding stock on consignment, billed per calendar period
    Consignment,
    /// Delivery/sales agent with a perpetual running balance
    Agent,
}

impl PartyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartyKind::Consignment => "consignment",
            PartyKind::Agent => "agent",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "consignment" => Some(PartyKind::Consignment),
            "agent" => Some(PartyKind::Agent),
            _ => None,
        }
    }
}

impl std::fmt::Display for PartyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A consignment customer or agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Party {
    pub id: Uuid,
    pub name: String,
    pub kind: PartyKind,
    /// Location whose stock is allocated when the party receives goods
    pub home_location_id: Uuid,
}
