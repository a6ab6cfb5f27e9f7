//! Ledger tests against a live PostgreSQL database
//!
//! Run with `DATABASE_URL` pointing at a scratch database and `--ignored`.
//! Each test seeds its own catalog rows, so runs do not interfere.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use ledger_backend::config::LedgerConfig;
use ledger_backend::models::{
    AssignItemsInput, CounterSaleType, CreateSaleInput, PeriodKey, ReceiveBatchInput,
    RecordReturnInput, SaleItemInput, SaleSource,
};
use ledger_backend::services::{AssignmentService, SaleService, StockService};
use ledger_backend::{LedgerStore, PgLedgerStore};

struct PgFixture {
    store: Arc<dyn LedgerStore>,
    products: Vec<Uuid>,
    location_id: Uuid,
    customer_id: Uuid,
    agent_id: Uuid,
}

async fn connect() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&url)
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

impl PgFixture {
    async fn new(products: usize) -> Self {
        let pool = connect().await;
        let location_id = Uuid::new_v4();
        let code = format!("T{}", &location_id.simple().to_string()[..7]).to_uppercase();
        sqlx::query("INSERT INTO locations (id, code, name) VALUES ($1, $2, 'Test branch')")
            .bind(location_id)
            .bind(&code)
            .execute(&pool)
            .await
            .unwrap();

        let mut ids = Vec::with_capacity(products);
        for n in 0..products {
            let id = Uuid::new_v4();
            sqlx::query("INSERT INTO products (id, name, unit) VALUES ($1, $2, 'box')")
                .bind(id)
                .bind(format!("Product {}", n))
                .execute(&pool)
                .await
                .unwrap();
            ids.push(id);
        }

        let customer_id = Uuid::new_v4();
        let agent_id = Uuid::new_v4();
        for (id, name, kind) in [
            (customer_id, "Corner Clinic", "consignment"),
            (agent_id, "Field Agent", "agent"),
        ] {
            sqlx::query(
                "INSERT INTO parties (id, name, kind, home_location_id) VALUES ($1, $2, $3, $4)",
            )
            .bind(id)
            .bind(name)
            .bind(kind)
            .bind(location_id)
            .execute(&pool)
            .await
            .unwrap();
        }

        Self {
            store: Arc::new(PgLedgerStore::new(pool)),
            products: ids,
            location_id,
            customer_id,
            agent_id,
        }
    }

    async fn receive(&self, product_id: Uuid, batch_number: &str, quantity: i64) {
        StockService::new(self.store.clone())
            .receive_batch(ReceiveBatchInput {
                product_id,
                location_id: self.location_id,
                batch_number: batch_number.to_string(),
                manufacture_date: None,
                expiry_date: None,
                unit_cost: Decimal::new(250, 2),
                quantity,
            })
            .await
            .unwrap();
    }

    fn sales(&self) -> SaleService {
        SaleService::new(self.store.clone(), LedgerConfig::default())
    }

    fn counter_sale(&self, products: &[Uuid]) -> CreateSaleInput {
        CreateSaleInput {
            source: SaleSource::Counter {
                location_id: self.location_id,
                sale_type: CounterSaleType::Bulk,
            },
            items: products
                .iter()
                .map(|&product_id| SaleItemInput {
                    product_id,
                    quantity: 1,
                    unit_price: Decimal::ONE,
                })
                .collect(),
            settlement: None,
            customer_name: None,
        }
    }
}

#[tokio::test]
#[ignore] // Requires database connection (DATABASE_URL)
async fn concurrent_sales_get_distinct_numbers() {
    let fx = PgFixture::new(1).await;
    fx.receive(fx.products[0], "B1", 100).await;

    let mut handles = Vec::new();
    for _ in 0..12 {
        let service = fx.sales();
        let input = fx.counter_sale(&fx.products);
        handles.push(tokio::spawn(async move { service.create_sale(input).await }));
    }
    let mut numbers = Vec::new();
    for handle in handles {
        numbers.push(handle.await.unwrap().unwrap().transaction_number);
    }
    numbers.sort();
    numbers.dedup();
    assert_eq!(numbers.len(), 12);
    assert!(numbers[11].ends_with("-0012"));
}

#[tokio::test]
#[ignore] // Requires database connection (DATABASE_URL)
async fn crossing_multi_product_sales_all_commit() {
    let fx = PgFixture::new(2).await;
    fx.receive(fx.products[0], "A1", 100).await;
    fx.receive(fx.products[1], "B1", 100).await;

    let forward = [fx.products[0], fx.products[1]];
    let backward = [fx.products[1], fx.products[0]];
    let mut handles = Vec::new();
    for n in 0..16 {
        let service = fx.sales();
        let input = fx.counter_sale(if n % 2 == 0 { &forward } else { &backward });
        handles.push(tokio::spawn(async move { service.create_sale(input).await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let stock = StockService::new(fx.store.clone());
    for product_id in &fx.products {
        let left = stock
            .list_available(*product_id, fx.location_id, false)
            .await
            .unwrap();
        assert_eq!(left[0].quantity_remaining, 84);
    }
}

#[tokio::test]
#[ignore] // Requires database connection (DATABASE_URL)
async fn concurrent_first_assignments_open_one_period() {
    let fx = PgFixture::new(1).await;
    fx.receive(fx.products[0], "B1", 100).await;
    let period = PeriodKey::containing(Utc::now().date_naive());

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = AssignmentService::new(fx.store.clone());
        let input = AssignItemsInput {
            party_id: fx.customer_id,
            product_id: fx.products[0],
            quantity: 3,
            unit_price: Decimal::new(400, 2),
            period: Some(period),
        };
        handles.push(tokio::spawn(async move { service.assign_items(input).await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let record = AssignmentService::new(fx.store.clone())
        .get_period(fx.customer_id, period)
        .await
        .unwrap();
    assert_eq!(record.lines.len(), 1);
    assert_eq!(record.totals.quantity_added, 24);
}

#[tokio::test]
#[ignore] // Requires database connection (DATABASE_URL)
async fn interleaved_agent_assignments_and_returns_all_commit() {
    let fx = PgFixture::new(1).await;
    fx.receive(fx.products[0], "B1", 100).await;
    let assign = |quantity| AssignItemsInput {
        party_id: fx.agent_id,
        product_id: fx.products[0],
        quantity,
        unit_price: Decimal::new(400, 2),
        period: None,
    };
    AssignmentService::new(fx.store.clone())
        .assign_items(assign(40))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for n in 0..16 {
        let service = AssignmentService::new(fx.store.clone());
        let product_id = fx.products[0];
        let party_id = fx.agent_id;
        let input = assign(2);
        handles.push(tokio::spawn(async move {
            if n % 2 == 0 {
                service.assign_items(input).await.map(|_| ())
            } else {
                service
                    .record_return(RecordReturnInput {
                        party_id,
                        product_id,
                        quantity: 2,
                        period: None,
                        reason: None,
                    })
                    .await
                    .map(|_| ())
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let lines = AssignmentService::new(fx.store.clone())
        .agent_lines(fx.agent_id)
        .await
        .unwrap();
    assert_eq!(lines[0].current_balance, 40);
    let left = StockService::new(fx.store.clone())
        .list_available(fx.products[0], fx.location_id, false)
        .await
        .unwrap();
    assert_eq!(left.iter().map(|b| b.quantity_remaining).sum::<i64>(), 60);
}
