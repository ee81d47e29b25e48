//! Franchise Ledger - transactional balances for bank accounts, petty cash
//! and inventory stock, with append-only movement logs and statements.

pub mod config;
pub mod error;
pub mod models;
pub mod scope;
pub mod services;
pub mod startup;

pub use error::{LedgerError, LedgerResult};
