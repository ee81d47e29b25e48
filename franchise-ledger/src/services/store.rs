//! Storage contract for the ledger.

use async_trait::async_trait;

use crate::error::LedgerResult;
use crate::models::{
    EntityRef, Franchise, LedgerEntity, Movement, MovementFilter, NewBankAccount, NewPettyCash,
    NewStockLine, Reconciliation,
};
use crate::services::mutator::MovementDraft;

/// Transactional storage for balances and their movement logs.
///
/// Implementations own every write to an entity's current balance. `apply`
/// and `reconcile` must hold an exclusive lock on the entity row for the
/// whole read-compute-write sequence and must leave no trace when they fail.
/// Locks on one entity never block another.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Register a tenant.
    async fn register_franchise(&self, name: &str) -> LedgerResult<Franchise>;

    /// Open a bank account. Codes are unique across bank accounts.
    async fn open_bank_account(&self, input: &NewBankAccount) -> LedgerResult<LedgerEntity>;

    /// Open a petty cash box. Codes are unique across petty cash boxes.
    async fn open_petty_cash(&self, input: &NewPettyCash) -> LedgerResult<LedgerEntity>;

    /// Open a stock line for a product in a franchise.
    async fn open_stock(&self, input: &NewStockLine) -> LedgerResult<LedgerEntity>;

    /// Read an entity and its current balance without locking.
    async fn entity(&self, entity: &EntityRef) -> LedgerResult<Option<LedgerEntity>>;

    /// Atomically append a movement and update the entity's balance.
    async fn apply(&self, draft: &MovementDraft) -> LedgerResult<Movement>;

    /// Movements matching `filter`, ordered by `(created_utc, movement_id)`.
    async fn movements(&self, filter: &MovementFilter) -> LedgerResult<Vec<Movement>>;

    /// Fold the entity's full log against its cached balance under the row
    /// lock, rewriting the cached balance when `repair` is set.
    async fn reconcile(&self, entity: &EntityRef, repair: bool) -> LedgerResult<Reconciliation>;

    /// Check the backing store is reachable.
    async fn health_check(&self) -> LedgerResult<()>;
}
