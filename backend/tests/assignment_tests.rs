//! Assignment ledger tests: agent and consignment balances, returns, period
//! roll-forward and balance conservation

mod common;

use proptest::prelude::*;
use rust_decimal::Decimal;

use common::{date, Fixture};
use ledger_backend::models::{
    AssignItemsInput, CreateSaleInput, PeriodKey, PeriodStatus, RecordReturnInput, SaleItemInput,
    SaleSource,
};
use ledger_backend::services::assignment::RollForwardInput;
use ledger_backend::AppError;
use shared::LedgerError;

const MARCH: PeriodKey = PeriodKey { year: 2024, month: 3 };
const APRIL: PeriodKey = PeriodKey { year: 2024, month: 4 };

fn assign(fx: &Fixture, party_id: uuid::Uuid, quantity: i64, period: Option<PeriodKey>) -> AssignItemsInput {
    AssignItemsInput {
        party_id,
        product_id: fx.product.id,
        quantity,
        unit_price: Decimal::new(400, 2),
        period,
    }
}

fn give_back(fx: &Fixture, party_id: uuid::Uuid, quantity: i64) -> RecordReturnInput {
    RecordReturnInput {
        party_id,
        product_id: fx.product.id,
        quantity,
        period: None,
        reason: Some("unsold".to_string()),
    }
}

fn party_sale(fx: &Fixture, party_id: uuid::Uuid, quantity: i64) -> CreateSaleInput {
    CreateSaleInput {
        source: SaleSource::Party {
            party_id,
            period: None,
        },
        items: vec![SaleItemInput {
            product_id: fx.product.id,
            quantity,
            unit_price: Decimal::new(500, 2),
        }],
        settlement: None,
        customer_name: None,
    }
}

async fn agent_balance(fx: &Fixture) -> i64 {
    fx.assignments()
        .agent_lines(fx.agent.id)
        .await
        .unwrap()
        .iter()
        .map(|l| l.current_balance)
        .sum()
}

// ============================================================================
// Agent Lines
// ============================================================================

#[tokio::test]
async fn agent_assignment_draws_from_home_location() {
    let fx = Fixture::new().await;
    fx.receive("B1", 5, date(2024, 1, 1)).await;
    fx.receive("B2", 10, date(2024, 2, 1)).await;

    let line = fx
        .assignments()
        .assign_items(assign(&fx, fx.agent.id, 8, None))
        .await
        .unwrap();

    assert_eq!(line.quantity_added, 8);
    assert_eq!(line.current_balance, 8);
    assert_eq!(line.period_id, None);
    assert_eq!(line.total_assigned_value, Decimal::new(3200, 2));
    assert_eq!(fx.remaining().await, vec![("B2".to_string(), 7)]);
}

#[tokio::test]
async fn failed_assignment_changes_nothing() {
    let fx = Fixture::new().await;
    fx.receive("B1", 3, date(2024, 1, 1)).await;

    let err = fx
        .assignments()
        .assign_items(assign(&fx, fx.agent.id, 4, None))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AppError::Ledger(LedgerError::InsufficientStock { shortfall: 1, .. })
    ));
    assert_eq!(agent_balance(&fx).await, 0);
    assert_eq!(fx.remaining().await, vec![("B1".to_string(), 3)]);
}

#[tokio::test]
async fn sale_cannot_exceed_held_balance() {
    let fx = Fixture::new().await;
    fx.receive("B1", 20, date(2024, 1, 1)).await;
    fx.assignments()
        .assign_items(assign(&fx, fx.agent.id, 5, None))
        .await
        .unwrap();

    let err = fx
        .sales()
        .create_sale(party_sale(&fx, fx.agent.id, 6))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Ledger(LedgerError::ExceedsBalance {
            requested: 6,
            balance: 5,
        })
    ));
    assert_eq!(agent_balance(&fx).await, 5);

    let sale = fx
        .sales()
        .create_sale(party_sale(&fx, fx.agent.id, 5))
        .await
        .unwrap();
    assert_eq!(sale.items[0].allocations[0].batch_number, "B1");
    assert_eq!(agent_balance(&fx).await, 0);
}

#[tokio::test]
async fn return_re_credits_the_stock_pool() {
    let fx = Fixture::new().await;
    fx.receive("B1", 10, date(2024, 1, 1)).await;
    fx.assignments()
        .assign_items(assign(&fx, fx.agent.id, 6, None))
        .await
        .unwrap();

    let line = fx
        .assignments()
        .record_return(give_back(&fx, fx.agent.id, 2))
        .await
        .unwrap();
    assert_eq!(line.quantity_returned, 2);
    assert_eq!(line.current_balance, 4);
    assert_eq!(fx.remaining().await, vec![("B1".to_string(), 6)]);

    let err = fx
        .assignments()
        .record_return(give_back(&fx, fx.agent.id, 5))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Ledger(LedgerError::ExceedsBalance {
            requested: 5,
            balance: 4,
        })
    ));
}

#[tokio::test]
async fn return_without_a_line_has_zero_balance() {
    let fx = Fixture::new().await;
    let err = fx
        .assignments()
        .record_return(give_back(&fx, fx.agent.id, 1))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Ledger(LedgerError::ExceedsBalance { balance: 0, .. })
    ));
}

#[tokio::test]
async fn agents_have_no_periods() {
    let fx = Fixture::new().await;
    fx.receive("B1", 10, date(2024, 1, 1)).await;

    let err = fx
        .assignments()
        .assign_items(assign(&fx, fx.agent.id, 1, Some(MARCH)))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Ledger(LedgerError::WrongPartyKind(_))));

    let err = fx
        .assignments()
        .get_period(fx.agent.id, MARCH)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Ledger(LedgerError::WrongPartyKind(_))));

    let err = fx
        .assignments()
        .agent_lines(fx.customer.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Ledger(LedgerError::WrongPartyKind(_))));
}

// ============================================================================
// Consignment Periods
// ============================================================================

#[tokio::test]
async fn roll_forward_carries_balance_into_next_period() {
    let fx = Fixture::new().await;
    fx.receive("B1", 20, date(2024, 1, 1)).await;
    fx.assignments()
        .assign_items(assign(&fx, fx.customer.id, 12, Some(MARCH)))
        .await
        .unwrap();

    let april = fx
        .assignments()
        .roll_forward(fx.customer.id, RollForwardInput { from: MARCH, to: APRIL })
        .await
        .unwrap();

    assert_eq!(april.period, APRIL);
    assert_eq!(april.totals.previous_balance, 12);
    assert_eq!(april.totals.quantity_added, 0);
    assert_eq!(april.totals.current_balance, 12);
    assert_eq!(april.lines.len(), 1);
    assert_eq!(april.lines[0].previous_balance, 12);
    assert_eq!(april.lines[0].holdings.iter().map(|h| h.quantity).sum::<i64>(), 12);

    let march = fx
        .assignments()
        .get_period(fx.customer.id, MARCH)
        .await
        .unwrap();
    assert_eq!(march.status, PeriodStatus::Closed);

    let err = fx
        .assignments()
        .assign_items(assign(&fx, fx.customer.id, 1, Some(MARCH)))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Ledger(LedgerError::PeriodClosed(_))));
}

#[tokio::test]
async fn roll_forward_must_move_to_a_later_period() {
    let fx = Fixture::new().await;
    fx.receive("B1", 20, date(2024, 1, 1)).await;
    fx.assignments()
        .assign_items(assign(&fx, fx.customer.id, 3, Some(APRIL)))
        .await
        .unwrap();

    let err = fx
        .assignments()
        .roll_forward(fx.customer.id, RollForwardInput { from: APRIL, to: MARCH })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Ledger(LedgerError::InvalidPeriod(_))));

    let april = fx
        .assignments()
        .get_period(fx.customer.id, APRIL)
        .await
        .unwrap();
    assert_eq!(april.status, PeriodStatus::Active);
    assert!(fx
        .assignments()
        .get_period(fx.customer.id, MARCH)
        .await
        .is_err());
}

#[tokio::test]
async fn backwards_roll_is_rejected_before_any_lookup() {
    let fx = Fixture::new().await;

    for party_id in [fx.customer.id, uuid::Uuid::new_v4()] {
        for (from, to) in [(APRIL, MARCH), (MARCH, MARCH)] {
            let err = fx
                .assignments()
                .roll_forward(party_id, RollForwardInput { from, to })
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::Ledger(LedgerError::InvalidPeriod(_))));
        }
    }
}

#[tokio::test]
async fn concurrent_first_assignments_share_one_period() {
    let fx = Fixture::new().await;
    fx.receive("B1", 40, date(2024, 1, 1)).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = fx.assignments();
        let input = assign(&fx, fx.customer.id, 2, Some(MARCH));
        handles.push(tokio::spawn(async move { service.assign_items(input).await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let march = fx
        .assignments()
        .get_period(fx.customer.id, MARCH)
        .await
        .unwrap();
    assert_eq!(march.lines.len(), 1);
    assert_eq!(march.totals.quantity_added, 16);
    assert_eq!(fx.remaining().await, vec![("B1".to_string(), 24)]);
}

#[tokio::test]
async fn multi_product_agent_sale_keeps_request_order() {
    let fx = Fixture::new().await;
    let other = fx.add_product("Amoxicillin 250mg").await;
    fx.receive("B1", 10, date(2024, 1, 1)).await;
    fx.receive_product(other.id, "A1", 10).await;

    let mut second = assign(&fx, fx.agent.id, 4, None);
    second.product_id = other.id;
    fx.assignments()
        .assign_items(assign(&fx, fx.agent.id, 4, None))
        .await
        .unwrap();
    fx.assignments().assign_items(second).await.unwrap();

    let line = |product_id, quantity| SaleItemInput {
        product_id,
        quantity,
        unit_price: Decimal::new(500, 2),
    };
    for products in [[fx.product.id, other.id], [other.id, fx.product.id]] {
        let mut input = party_sale(&fx, fx.agent.id, 1);
        input.items = products.iter().map(|&id| line(id, 1)).collect();
        let sale = fx.sales().create_sale(input).await.unwrap();
        let sold: Vec<_> = sale.items.iter().map(|i| i.product_id).collect();
        assert_eq!(sold, products.to_vec());
    }

    let mut input = party_sale(&fx, fx.agent.id, 1);
    input.items = vec![line(other.id, 1), line(uuid::Uuid::new_v4(), 3)];
    let err = fx.sales().create_sale(input).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::Ledger(LedgerError::ExceedsBalance {
            requested: 3,
            balance: 0,
        })
    ));
    assert_eq!(agent_balance(&fx).await, 4);
}

#[tokio::test]
async fn closed_period_rejects_movements() {
    let fx = Fixture::new().await;
    fx.receive("B1", 20, date(2024, 1, 1)).await;
    fx.assignments()
        .assign_items(assign(&fx, fx.customer.id, 5, Some(MARCH)))
        .await
        .unwrap();

    let closed = fx
        .assignments()
        .close_period(fx.customer.id, MARCH)
        .await
        .unwrap();
    assert_eq!(closed.status, PeriodStatus::Closed);
    assert_eq!(closed.totals.current_balance, 5);

    let err = fx
        .assignments()
        .close_period(fx.customer.id, MARCH)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Ledger(LedgerError::PeriodClosed(_))));

    let mut input = give_back(&fx, fx.customer.id, 1);
    input.period = Some(MARCH);
    let err = fx.assignments().record_return(input).await.unwrap_err();
    assert!(matches!(err, AppError::Ledger(LedgerError::PeriodClosed(_))));

    let err = fx
        .assignments()
        .roll_forward(fx.customer.id, RollForwardInput { from: MARCH, to: APRIL })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Ledger(LedgerError::PeriodClosed(_))));
    assert_eq!(fx.remaining().await, vec![("B1".to_string(), 15)]);
}

#[tokio::test]
async fn consignment_sale_updates_period_totals() {
    let fx = Fixture::new().await;
    fx.receive("B1", 20, date(2024, 1, 1)).await;
    fx.assignments()
        .assign_items(assign(&fx, fx.customer.id, 10, None))
        .await
        .unwrap();

    let sale = fx
        .sales()
        .create_sale(party_sale(&fx, fx.customer.id, 4))
        .await
        .unwrap();
    assert!(sale.period_id.is_some());

    let current = PeriodKey::containing(chrono::Utc::now().date_naive());
    let period = fx
        .assignments()
        .get_period(fx.customer.id, current)
        .await
        .unwrap();
    assert_eq!(period.id, sale.period_id.unwrap());
    assert_eq!(period.totals.quantity_sold, 4);
    assert_eq!(period.totals.current_balance, 6);
    assert_eq!(period.totals.total_sold_value, Decimal::new(2000, 2));
    assert_eq!(period.balance_due, Decimal::new(2000, 2));
}

// ============================================================================
// Property Tests
// ============================================================================

#[derive(Debug, Clone)]
enum Op {
    Assign(i64),
    Sell(i64),
    Return(i64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1i64..15).prop_map(Op::Assign),
        (1i64..10).prop_map(Op::Sell),
        (1i64..10).prop_map(Op::Return),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Units are never created or lost: pool + held + sold always equals
    /// what was received, whatever mix of operations succeeds or fails
    #[test]
    fn units_are_conserved(ops in prop::collection::vec(op_strategy(), 1..20)) {
        tokio_test::block_on(async {
            let fx = Fixture::new().await;
            fx.receive("B1", 30, date(2024, 1, 1)).await;
            fx.receive("B2", 30, date(2024, 2, 1)).await;

            let mut sold = 0;
            for op in ops {
                match op {
                    Op::Assign(q) => {
                        let _ = fx.assignments().assign_items(assign(&fx, fx.agent.id, q, None)).await;
                    }
                    Op::Sell(q) => {
                        if fx.sales().create_sale(party_sale(&fx, fx.agent.id, q)).await.is_ok() {
                            sold += q;
                        }
                    }
                    Op::Return(q) => {
                        let _ = fx.assignments().record_return(give_back(&fx, fx.agent.id, q)).await;
                    }
                }
            }

            let pool: i64 = fx.remaining().await.iter().map(|(_, q)| q).sum();
            let lines = fx.assignments().agent_lines(fx.agent.id).await.unwrap();
            let held: i64 = lines.iter().map(|l| l.current_balance).sum();
            assert_eq!(pool + held + sold, 60);

            for line in &lines {
                assert_eq!(
                    line.previous_balance + line.quantity_added
                        - line.quantity_sold
                        - line.quantity_returned,
                    line.current_balance
                );
                assert_eq!(line.holdings.iter().map(|h| h.quantity).sum::<i64>(), line.current_balance);
            }
        });
    }
}
