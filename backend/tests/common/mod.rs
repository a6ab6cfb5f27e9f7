//! Shared fixture for ledger integration tests

#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use uuid::Uuid;

use ledger_backend::config::LedgerConfig;
use ledger_backend::models::{
    Location, Party, PartyKind, Product, ReceiveBatchInput, StockBatch,
};
use ledger_backend::services::{AssignmentService, PaymentService, SaleService, StockService};
use ledger_backend::{LedgerStore, MemoryLedgerStore};

/// A memory store seeded with one product, one location and two parties
pub struct Fixture {
    pub memory: MemoryLedgerStore,
    pub store: Arc<dyn LedgerStore>,
    pub product: Product,
    pub location: Location,
    pub customer: Party,
    pub agent: Party,
}

impl Fixture {
    pub async fn new() -> Self {
        let memory = MemoryLedgerStore::new();
        let location = Location {
            id: Uuid::new_v4(),
            code: "MAIN".to_string(),
            name: "Main branch".to_string(),
        };
        let product = Product {
            id: Uuid::new_v4(),
            name: "Paracetamol 500mg".to_string(),
            unit: "box".to_string(),
        };
        let customer = Party {
            id: Uuid::new_v4(),
            name: "Corner Clinic".to_string(),
            kind: PartyKind::Consignment,
            home_location_id: location.id,
        };
        let agent = Party {
            id: Uuid::new_v4(),
            name: "Field Agent".to_string(),
            kind: PartyKind::Agent,
            home_location_id: location.id,
        };

        memory.insert_location(location.clone()).await;
        memory.insert_product(product.clone()).await;
        memory.insert_party(customer.clone()).await;
        memory.insert_party(agent.clone()).await;

        Self {
            store: Arc::new(memory.clone()),
            memory,
            product,
            location,
            customer,
            agent,
        }
    }

    pub fn stock(&self) -> StockService {
        StockService::new(self.store.clone())
    }

    pub fn assignments(&self) -> AssignmentService {
        AssignmentService::new(self.store.clone())
    }

    pub fn sales(&self) -> SaleService {
        SaleService::new(self.store.clone(), LedgerConfig::default())
    }

    pub fn payments(&self) -> PaymentService {
        PaymentService::new(self.store.clone())
    }

    /// Register another product in the catalog
    pub async fn add_product(&self, name: &str) -> Product {
        let product = Product {
            id: Uuid::new_v4(),
            name: name.to_string(),
            unit: "box".to_string(),
        };
        self.memory.insert_product(product.clone()).await;
        product
    }

    /// Receive a batch of `product_id` at the fixture location
    pub async fn receive_product(&self, product_id: Uuid, batch_number: &str, quantity: i64) -> StockBatch {
        self.stock()
            .receive_batch(ReceiveBatchInput {
                product_id,
                location_id: self.location.id,
                batch_number: batch_number.to_string(),
                manufacture_date: Some(date(2024, 1, 1)),
                expiry_date: None,
                unit_cost: Decimal::new(250, 2),
                quantity,
            })
            .await
            .unwrap()
    }

    /// Receive a batch of the fixture product manufactured on `manufactured`
    pub async fn receive(
        &self,
        batch_number: &str,
        quantity: i64,
        manufactured: NaiveDate,
    ) -> StockBatch {
        self.stock()
            .receive_batch(ReceiveBatchInput {
                product_id: self.product.id,
                location_id: self.location.id,
                batch_number: batch_number.to_string(),
                manufacture_date: Some(manufactured),
                expiry_date: None,
                unit_cost: Decimal::new(250, 2),
                quantity,
            })
            .await
            .unwrap()
    }

    pub async fn remaining(&self) -> Vec<(String, i64)> {
        self.stock()
            .list_available(self.product.id, self.location.id, false)
            .await
            .unwrap()
            .into_iter()
            .map(|b| (b.batch_number, b.quantity_remaining))
            .collect()
    }
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}
