//! PostgreSQL store integration tests.
//!
//! Skipped unless TEST_DATABASE_URL points at a scratch database.

mod common;

use chrono::{Duration, Utc};
use common::{
    create_bank_account, create_franchise, create_petty_cash, create_stock_line, pg_database,
    pg_service,
};
use franchise_ledger::models::{
    BankMovementKind, CashMovementKind, DateRange, Delta, EntityRef, MovementFilter,
    MovementMeta, NewPettyCash,
};
use franchise_ledger::services::{Database, LedgerPolicy, LedgerService};
use franchise_ledger::LedgerError;
use std::sync::Arc;
use futures::future::join_all;
use rust_decimal_macros::dec;
use serial_test::serial;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn pg_concurrent_movements_serialize_on_row_lock() {
    let Some(service) = pg_service().await else {
        return;
    };
    let franchise_id = create_franchise(&service).await;
    let cash = create_petty_cash(&service, franchise_id, dec!(100)).await;

    let writes = (0..20).map(|i| {
        let service = service.clone();
        tokio::spawn(async move {
            let (delta, kind) = if i % 2 == 0 {
                (Delta::income(dec!(10)), CashMovementKind::Replenishment)
            } else {
                (Delta::expense(dec!(5)), CashMovementKind::Disbursement)
            };
            service
                .apply_movement(cash.entity, delta, MovementMeta::cash(kind))
                .await
        })
    });
    for joined in join_all(writes).await {
        joined.unwrap().unwrap();
    }

    let current = service.balance(cash.entity).await.unwrap();
    assert_eq!(current.current_balance, dec!(150));

    // Stored balances must form one unbroken chain in timestamp order.
    let log = service
        .store()
        .movements(&MovementFilter::for_entity(cash.entity))
        .await
        .unwrap();
    assert_eq!(log.len(), 20);
    let mut previous = dec!(100);
    for movement in &log {
        assert_eq!(
            movement.balance_after,
            previous + movement.income - movement.expense
        );
        previous = movement.balance_after;
    }

    let report = service.reconcile(cash.entity, false).await.unwrap();
    assert!(report.is_consistent());
}

#[tokio::test]
#[serial]
async fn pg_insufficient_stock_rolls_back() {
    let Some(service) = pg_service().await else {
        return;
    };
    let franchise_id = create_franchise(&service).await;
    let stock = create_stock_line(&service, franchise_id, 5).await;

    let result = service
        .apply_movement(stock.entity, Delta::exit(10), MovementMeta::stock(9))
        .await;
    assert!(matches!(result, Err(LedgerError::InsufficientBalance { .. })));

    let current = service.balance(stock.entity).await.unwrap();
    assert_eq!(current.current_balance, dec!(5));
    let log = service
        .store()
        .movements(&MovementFilter::for_entity(stock.entity))
        .await
        .unwrap();
    assert!(log.is_empty());

    let entry = service
        .apply_movement(stock.entity, Delta::entry(2), MovementMeta::stock(9))
        .await
        .unwrap();
    assert_eq!(entry.balance_after, dec!(7));
    assert_eq!(entry.actor_id, Some(9));
}

#[tokio::test]
#[serial]
async fn pg_statement_recomputes_running_balance() {
    let Some(service) = pg_service().await else {
        return;
    };
    let franchise_id = create_franchise(&service).await;
    let account = create_bank_account(&service, franchise_id, dec!(500)).await;

    for (delta, kind) in [
        (Delta::income(dec!(50)), BankMovementKind::Deposit),
        (Delta::expense(dec!(20)), BankMovementKind::Check),
        (Delta::income(dec!(30)), BankMovementKind::Transfer),
    ] {
        service
            .apply_movement(
                account.entity,
                delta,
                MovementMeta::bank(kind).with_reference("REF-1"),
            )
            .await
            .unwrap();
    }

    let today = Utc::now().date_naive();
    let statement = service
        .build_statement(
            account.entity,
            DateRange::new(today - Duration::days(1), today + Duration::days(1)),
            None,
        )
        .await
        .unwrap();
    let running: Vec<_> = statement
        .lines
        .iter()
        .map(|line| line.running_balance)
        .collect();
    assert_eq!(running, vec![dec!(50), dec!(30), dec!(60)]);
    assert_eq!(statement.totals.total_income, dec!(80));
    assert_eq!(statement.totals.total_expense, dec!(20));
    assert_eq!(statement.totals.final_balance, dec!(60));
    assert!(statement
        .lines
        .iter()
        .all(|line| line.reference_number.as_deref() == Some("REF-1")));
}

#[tokio::test]
#[serial]
async fn pg_duplicate_code_conflicts() {
    let Some(service) = pg_service().await else {
        return;
    };
    let franchise_id = create_franchise(&service).await;
    let cash = create_petty_cash(&service, franchise_id, dec!(0)).await;

    let result = service
        .open_petty_cash(NewPettyCash {
            franchise_id,
            code: cash.code.clone().unwrap(),
            name: "Duplicada".to_string(),
            responsible_id: 1,
            opening_balance: dec!(0),
        })
        .await;
    assert!(matches!(result, Err(LedgerError::Conflict(_))));
}

#[tokio::test]
#[serial]
async fn pg_unknown_franchise_is_reported() {
    let Some(service) = pg_service().await else {
        return;
    };
    let result = service
        .open_petty_cash(NewPettyCash {
            franchise_id: i64::MAX,
            code: "PC-ORPHAN".to_string(),
            name: "Huérfana".to_string(),
            responsible_id: 1,
            opening_balance: dec!(0),
        })
        .await;
    assert!(matches!(result, Err(LedgerError::FranchiseNotFound(_))));
}

#[tokio::test]
#[serial]
async fn pg_lock_timeout_fails_without_partial_write() {
    let Some(db) = pg_database().await else {
        return;
    };
    let pool = db.pool().clone();
    let impatient = LedgerService::new(
        Arc::new(Database::from_pool(pool.clone()).with_lock_timeout(Some(200))),
        LedgerPolicy::default(),
    );
    let service = LedgerService::new(Arc::new(db), LedgerPolicy::default());
    let franchise_id = create_franchise(&service).await;
    let cash = create_petty_cash(&service, franchise_id, dec!(100)).await;
    let EntityRef::PettyCash { petty_cash_id } = cash.entity else {
        panic!("expected a petty cash entity");
    };

    // Another transaction holds the row lock for the whole attempt.
    let mut holder = pool.begin().await.unwrap();
    sqlx::query("SELECT petty_cash_id FROM petty_cash WHERE petty_cash_id = $1 FOR UPDATE")
        .bind(petty_cash_id)
        .execute(&mut *holder)
        .await
        .unwrap();

    let result = impatient
        .apply_movement(
            cash.entity,
            Delta::expense(dec!(40)),
            MovementMeta::cash(CashMovementKind::Disbursement),
        )
        .await;
    let err = result.unwrap_err();
    assert!(matches!(err, LedgerError::TransactionFailure(_)));
    assert!(err.is_retryable());

    holder.rollback().await.unwrap();

    let current = service.balance(cash.entity).await.unwrap();
    assert_eq!(current.current_balance, dec!(100));
    let log = service
        .store()
        .movements(&MovementFilter::for_entity(cash.entity))
        .await
        .unwrap();
    assert!(log.is_empty());
}
