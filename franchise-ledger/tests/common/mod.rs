//! Common test utilities for franchise-ledger integration tests.

#![allow(dead_code)]

use franchise_ledger::models::{
    LedgerEntity, NewBankAccount, NewFranchise, NewPettyCash, NewStockLine,
};
use franchise_ledger::services::{Database, LedgerPolicy, LedgerService, MemoryLedgerStore};
use rust_decimal::Decimal;
use std::sync::{Arc, Once};
use uuid::Uuid;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,franchise_ledger=debug,sqlx=warn")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Ledger service over a fresh in-memory store.
pub fn memory_service() -> LedgerService {
    init_tracing();
    LedgerService::new(Arc::new(MemoryLedgerStore::new()), LedgerPolicy::default())
}

/// Migrated PostgreSQL store, or `None` when `TEST_DATABASE_URL` is unset.
pub async fn pg_database() -> Option<Database> {
    init_tracing();

    let Ok(database_url) = std::env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set - skipping PostgreSQL test");
        return None;
    };

    let db = Database::new(&database_url, 8, 1)
        .await
        .expect("Failed to connect to test database")
        .with_lock_timeout(Some(5_000));
    db.run_migrations()
        .await
        .expect("Failed to run migrations");

    Some(db)
}

/// Ledger service over PostgreSQL, or `None` when `TEST_DATABASE_URL` is unset.
pub async fn pg_service() -> Option<LedgerService> {
    let db = pg_database().await?;
    Some(LedgerService::new(Arc::new(db), LedgerPolicy::default()))
}

fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, &Uuid::new_v4().simple().to_string()[..12])
}

/// Register a franchise with a unique name.
pub async fn create_franchise(service: &LedgerService) -> i64 {
    service
        .register_franchise(NewFranchise {
            name: unique("Franchise"),
        })
        .await
        .expect("Failed to register franchise")
        .franchise_id
}

pub async fn create_bank_account(
    service: &LedgerService,
    franchise_id: i64,
    opening_balance: Decimal,
) -> LedgerEntity {
    service
        .open_bank_account(NewBankAccount {
            franchise_id,
            code: unique("BA"),
            bank_name: "Banco Nacional".to_string(),
            responsible_id: 1,
            opening_balance,
        })
        .await
        .expect("Failed to open bank account")
}

pub async fn create_petty_cash(
    service: &LedgerService,
    franchise_id: i64,
    opening_balance: Decimal,
) -> LedgerEntity {
    service
        .open_petty_cash(NewPettyCash {
            franchise_id,
            code: unique("PC"),
            name: "Caja chica".to_string(),
            responsible_id: 1,
            opening_balance,
        })
        .await
        .expect("Failed to open petty cash")
}

pub async fn create_stock_line(
    service: &LedgerService,
    franchise_id: i64,
    opening_quantity: i64,
) -> LedgerEntity {
    // Product ids only need to be unique per franchise.
    let product_id = (Uuid::new_v4().as_u128() % 1_000_000_000) as i64 + 1;
    service
        .open_stock(NewStockLine {
            product_id,
            franchise_id,
            opening_quantity,
        })
        .await
        .expect("Failed to open stock line")
}
