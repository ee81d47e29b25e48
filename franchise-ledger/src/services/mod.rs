//! Services module for franchise-ledger.

pub mod database;
pub mod ledger;
pub mod memory;
pub mod metrics;
pub mod mutator;
pub mod reconcile;
pub mod statement;
pub mod store;

pub use database::Database;
pub use ledger::LedgerService;
pub use memory::MemoryLedgerStore;
pub use metrics::{get_metrics, init_metrics, record_error, record_movement};
pub use mutator::{LedgerPolicy, MovementDraft};
pub use store::LedgerStore;
