//! Statement integration tests against the in-memory store.

mod common;

use chrono::{Duration, Utc};
use common::{create_bank_account, create_franchise, create_petty_cash, memory_service};
use franchise_ledger::models::{
    BankMovementKind, CashMovementKind, DateRange, Delta, EntityRef, MovementKind, MovementMeta,
};
use rust_decimal_macros::dec;

/// Window around the current day, wide enough to survive a midnight rollover.
fn around_today() -> DateRange {
    let today = Utc::now().date_naive();
    DateRange::new(today - Duration::days(1), today + Duration::days(1))
}

#[tokio::test]
async fn running_balance_starts_from_zero() {
    let service = memory_service();
    let franchise_id = create_franchise(&service).await;
    // The opening balance must not leak into the running values.
    let cash = create_petty_cash(&service, franchise_id, dec!(1000)).await;

    for delta in [
        Delta::income(dec!(50)),
        Delta::expense(dec!(20)),
        Delta::income(dec!(30)),
    ] {
        service
            .apply_movement(
                cash.entity,
                delta,
                MovementMeta::cash(CashMovementKind::Adjustment),
            )
            .await
            .unwrap();
    }

    let statement = service
        .build_statement(cash.entity, around_today(), None)
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
    assert_eq!(
        statement.entity.map(|e| e.current_balance),
        Some(dec!(1060))
    );
}

#[tokio::test]
async fn statement_is_reproducible() {
    let service = memory_service();
    let franchise_id = create_franchise(&service).await;
    let account = create_bank_account(&service, franchise_id, dec!(0)).await;

    for amount in [dec!(10), dec!(20), dec!(5.25)] {
        service
            .apply_movement(
                account.entity,
                Delta::income(amount),
                MovementMeta::bank(BankMovementKind::Transfer),
            )
            .await
            .unwrap();
    }

    let first = service
        .build_statement(account.entity, around_today(), None)
        .await
        .unwrap();
    let second = service
        .build_statement(account.entity, around_today(), None)
        .await
        .unwrap();
    assert_eq!(first, second);

    let ids: Vec<_> = first.lines.iter().map(|line| line.movement_id).collect();
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted);
}

#[tokio::test]
async fn kind_filter_narrows_lines() {
    let service = memory_service();
    let franchise_id = create_franchise(&service).await;
    let account = create_bank_account(&service, franchise_id, dec!(0)).await;

    service
        .apply_movement(
            account.entity,
            Delta::income(dec!(100)),
            MovementMeta::bank(BankMovementKind::Deposit),
        )
        .await
        .unwrap();
    service
        .apply_movement(
            account.entity,
            Delta::expense(dec!(30)),
            MovementMeta::bank(BankMovementKind::Withdrawal),
        )
        .await
        .unwrap();
    service
        .apply_movement(
            account.entity,
            Delta::income(dec!(15)),
            MovementMeta::bank(BankMovementKind::Deposit),
        )
        .await
        .unwrap();

    let deposits = service
        .build_statement(
            account.entity,
            around_today(),
            Some(MovementKind::Bank(BankMovementKind::Deposit)),
        )
        .await
        .unwrap();
    assert_eq!(deposits.lines.len(), 2);
    assert_eq!(deposits.totals.final_balance, dec!(115));
    assert_eq!(deposits.totals.total_expense, dec!(0));
}

#[tokio::test]
async fn range_excludes_other_days() {
    let service = memory_service();
    let franchise_id = create_franchise(&service).await;
    let cash = create_petty_cash(&service, franchise_id, dec!(0)).await;

    service
        .apply_movement(
            cash.entity,
            Delta::income(dec!(12)),
            MovementMeta::cash(CashMovementKind::Replenishment),
        )
        .await
        .unwrap();

    let earlier = Utc::now().date_naive() - Duration::days(2);
    let statement = service
        .build_statement(cash.entity, DateRange::day(earlier), None)
        .await
        .unwrap();
    assert!(statement.lines.is_empty());
    assert_eq!(statement.totals.final_balance, dec!(0));
    assert!(statement.entity.is_some());
}

#[tokio::test]
async fn unknown_entity_yields_empty_statement() {
    let service = memory_service();
    let statement = service
        .build_statement(EntityRef::bank_account(12345), around_today(), None)
        .await
        .unwrap();
    assert!(statement.entity.is_none());
    assert!(statement.lines.is_empty());
    assert_eq!(statement.totals.total_income, dec!(0));
    assert_eq!(statement.totals.total_expense, dec!(0));
    assert_eq!(statement.totals.final_balance, dec!(0));
}
