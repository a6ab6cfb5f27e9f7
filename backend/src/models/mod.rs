//! Ledger models used by the backend
//!
//! Re-exports the domain models from the shared crate and adds the few
//! backend-only shapes.

use serde::Deserialize;

pub use shared::models::*;
pub use shared::types::{PeriodKey, Quantity};

/// Catalog rows loaded into the in-process store at startup
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogSeed {
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(default)]
    pub parties: Vec<Party>,
}

impl CatalogSeed {
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}
