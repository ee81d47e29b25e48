//! Domain models for franchise-ledger.

mod entity;
mod filter;
mod movement;
mod reconciliation;
mod statement;

pub use entity::{
    validate_money, EntityRef, Franchise, LedgerEntity, LedgerKind, NewBankAccount, NewFranchise,
    NewPettyCash, NewStockLine,
};
pub use filter::MovementFilter;
pub use movement::{
    BankMovementKind, CashMovementKind, Delta, Movement, MovementKind, MovementMeta,
    StockDirection,
};
pub use reconciliation::Reconciliation;
pub use statement::{DateRange, Statement, StatementLine, StatementTotals};
