//! Ledger operations exposed to request handlers.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use validator::Validate;

use crate::error::{LedgerError, LedgerResult};
use crate::models::{
    DateRange, Delta, EntityRef, Franchise, LedgerEntity, LedgerKind, Movement, MovementFilter,
    MovementKind, MovementMeta, NewBankAccount, NewFranchise, NewPettyCash, NewStockLine,
    Reconciliation, Statement,
};
use crate::scope::{scope_for, Caller};
use crate::services::metrics::{
    record_error, record_movement, RECONCILIATIONS_TOTAL, STATEMENTS_TOTAL,
};
use crate::services::mutator::{LedgerPolicy, MovementDraft};
use crate::services::statement::{build_statement, empty_statement};
use crate::services::store::LedgerStore;

/// Balance mutator and statement builder over a [`LedgerStore`].
#[derive(Clone)]
pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
    policy: LedgerPolicy,
}

impl LedgerService {
    pub fn new(store: Arc<dyn LedgerStore>, policy: LedgerPolicy) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    pub fn policy(&self) -> &LedgerPolicy {
        &self.policy
    }

    /// Register a franchise under its trimmed name.
    pub async fn register_franchise(&self, input: NewFranchise) -> LedgerResult<Franchise> {
        let input = NewFranchise {
            name: input.name.trim().to_string(),
        };
        input.validate()?;
        self.store.register_franchise(&input.name).await
    }

    pub async fn open_bank_account(&self, input: NewBankAccount) -> LedgerResult<LedgerEntity> {
        input.validate()?;
        self.store.open_bank_account(&input).await
    }

    pub async fn open_petty_cash(&self, input: NewPettyCash) -> LedgerResult<LedgerEntity> {
        input.validate()?;
        self.store.open_petty_cash(&input).await
    }

    pub async fn open_stock(&self, input: NewStockLine) -> LedgerResult<LedgerEntity> {
        input.validate()?;
        self.store.open_stock(&input).await
    }

    /// Current state of an entity, read fresh from the store.
    pub async fn balance(&self, entity: EntityRef) -> LedgerResult<LedgerEntity> {
        self.store
            .entity(&entity)
            .await?
            .ok_or(LedgerError::NotFound(entity))
    }

    /// Record one movement and move the entity's balance by its delta.
    ///
    /// The delta is checked before the store is touched. The lock, the new
    /// balance, the movement row and the balance update all happen in one
    /// store transaction.
    #[instrument(skip(self, meta), fields(entity = %entity))]
    pub async fn apply_movement(
        &self,
        entity: EntityRef,
        delta: Delta,
        meta: MovementMeta,
    ) -> LedgerResult<Movement> {
        let ledger = entity.kind().as_str();

        let result = match MovementDraft::prepare(entity, delta, meta, &self.policy) {
            Ok(draft) => self.store.apply(&draft).await,
            Err(e) => Err(e),
        };

        match &result {
            Ok(movement) => {
                record_movement(ledger, true);
                info!(
                    movement_id = movement.movement_id,
                    kind = %movement.kind,
                    income = %movement.income,
                    expense = %movement.expense,
                    balance_after = %movement.balance_after,
                    "Movement recorded"
                );
            }
            Err(e) => {
                record_movement(ledger, false);
                record_error(e.error_type());
                debug!(error = %e, "Movement rejected");
            }
        }

        result
    }

    /// Statement of an entity's movements within `range`.
    ///
    /// Running balances start from zero at the window start. An unknown
    /// entity yields an empty statement.
    #[instrument(skip(self), fields(entity = %entity))]
    pub async fn build_statement(
        &self,
        entity: EntityRef,
        range: DateRange,
        kind: Option<MovementKind>,
    ) -> LedgerResult<Statement> {
        if !range.is_valid() {
            record_error("invalid_range");
            return Err(LedgerError::InvalidRange {
                start: range.start,
                end: range.end,
            });
        }

        let Some(found) = self.store.entity(&entity).await? else {
            debug!("Statement requested for unknown entity");
            return Ok(empty_statement(range, kind));
        };

        let filter = MovementFilter::for_entity(entity).within(range).of_kind(kind);
        let movements = self.store.movements(&filter).await?;
        let statement = build_statement(Some(found), range, kind, movements)?;

        STATEMENTS_TOTAL
            .with_label_values(&[entity.kind().as_str()])
            .inc();
        debug!(lines = statement.lines.len(), "Statement built");

        Ok(statement)
    }

    /// Compare the cached balance with the folded log, repairing on request.
    #[instrument(skip(self), fields(entity = %entity))]
    pub async fn reconcile(
        &self,
        entity: EntityRef,
        repair: bool,
    ) -> LedgerResult<Reconciliation> {
        let report = self.store.reconcile(&entity, repair).await?;

        let outcome = if report.repaired {
            "repaired"
        } else if report.is_consistent() {
            "consistent"
        } else {
            "drift"
        };
        RECONCILIATIONS_TOTAL.with_label_values(&[outcome]).inc();

        if !report.is_consistent() {
            warn!(
                cached = %report.cached_balance,
                derived = %report.derived_balance,
                first_divergence = ?report.first_divergence,
                repaired = report.repaired,
                "Cached balance diverges from movement log"
            );
        }

        Ok(report)
    }

    /// [`Self::apply_movement`] on behalf of `caller`.
    ///
    /// The acting user defaults to the caller for inventory movements.
    pub async fn apply_movement_as(
        &self,
        caller: &Caller,
        entity: EntityRef,
        delta: Delta,
        mut meta: MovementMeta,
    ) -> LedgerResult<Movement> {
        self.authorize(caller, entity).await?;
        if entity.kind() == LedgerKind::Inventory && meta.actor_id.is_none() {
            meta.actor_id = Some(caller.user_id);
        }
        self.apply_movement(entity, delta, meta).await
    }

    /// [`Self::build_statement`] on behalf of `caller`.
    pub async fn build_statement_as(
        &self,
        caller: &Caller,
        entity: EntityRef,
        range: DateRange,
        kind: Option<MovementKind>,
    ) -> LedgerResult<Statement> {
        self.authorize(caller, entity).await?;
        self.build_statement(entity, range, kind).await
    }

    /// [`Self::balance`] on behalf of `caller`.
    pub async fn balance_as(
        &self,
        caller: &Caller,
        entity: EntityRef,
    ) -> LedgerResult<LedgerEntity> {
        self.authorize(caller, entity).await?;
        self.balance(entity).await
    }

    /// Check the entity's franchise against the caller's scope.
    ///
    /// Runs before every scoped operation. Unknown entities pass, so every
    /// scoped entry point reports them the same way its unscoped counterpart
    /// does: `NotFound` for writes and balances, an empty statement for reads.
    async fn authorize(&self, caller: &Caller, entity: EntityRef) -> LedgerResult<()> {
        let scope = scope_for(caller);
        let franchise_id = match entity {
            EntityRef::Stock { franchise_id, .. } => Some(franchise_id),
            _ => self.store.entity(&entity).await?.map(|e| e.franchise_id),
        };
        match franchise_id {
            Some(franchise_id) => scope.ensure(franchise_id).inspect_err(|e| {
                record_error(e.error_type());
                warn!(user_id = caller.user_id, entity = %entity, "Caller outside franchise scope");
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CashMovementKind;
    use crate::services::memory::MemoryLedgerStore;
    use rust_decimal_macros::dec;

    async fn service_with_cash() -> (LedgerService, LedgerEntity) {
        let service = LedgerService::new(
            Arc::new(MemoryLedgerStore::new()),
            LedgerPolicy::default(),
        );
        let franchise = service
            .register_franchise(NewFranchise {
                name: "Centro".to_string(),
            })
            .await
            .unwrap();
        let cash = service
            .open_petty_cash(NewPettyCash {
                franchise_id: franchise.franchise_id,
                code: "CC-10".to_string(),
                name: "Caja".to_string(),
                responsible_id: 1,
                opening_balance: dec!(0),
            })
            .await
            .unwrap();
        (service, cash)
    }

    #[tokio::test]
    async fn test_empty_franchise_name_rejected() {
        let service = LedgerService::new(
            Arc::new(MemoryLedgerStore::new()),
            LedgerPolicy::default(),
        );
        let result = service
            .register_franchise(NewFranchise {
                name: String::new(),
            })
            .await;
        assert!(matches!(result, Err(LedgerError::Validation(_))));
    }

    #[tokio::test]
    async fn test_blank_franchise_name_rejected_after_trim() {
        let service = LedgerService::new(
            Arc::new(MemoryLedgerStore::new()),
            LedgerPolicy::default(),
        );
        let result = service
            .register_franchise(NewFranchise {
                name: "   ".to_string(),
            })
            .await;
        assert!(matches!(result, Err(LedgerError::Validation(_))));

        let franchise = service
            .register_franchise(NewFranchise {
                name: "  Norte ".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(franchise.name, "Norte");
    }

    #[tokio::test]
    async fn test_oversized_amount_rejected_without_writing() {
        let (service, cash) = service_with_cash().await;
        let result = service
            .apply_movement(
                cash.entity,
                Delta::income(rust_decimal::Decimal::MAX),
                MovementMeta::cash(CashMovementKind::Replenishment),
            )
            .await;
        assert!(matches!(result, Err(LedgerError::InvalidDelta(_))));

        let log = service
            .store()
            .movements(&MovementFilter::for_entity(cash.entity))
            .await
            .unwrap();
        assert!(log.is_empty());
        assert_eq!(
            service.balance(cash.entity).await.unwrap().current_balance,
            dec!(0)
        );
    }

    #[tokio::test]
    async fn test_balance_as_checks_scope_before_lookup() {
        let (service, cash) = service_with_cash().await;
        let outsider = Caller::coordinator(9, cash.franchise_id + 1);

        assert!(matches!(
            service.balance_as(&outsider, cash.entity).await,
            Err(LedgerError::OutOfScope { franchise_id }) if franchise_id == cash.franchise_id
        ));
        assert!(matches!(
            service.balance_as(&outsider, EntityRef::petty_cash(404)).await,
            Err(LedgerError::NotFound(_))
        ));
        let own = service
            .balance_as(&Caller::coordinator(9, cash.franchise_id), cash.entity)
            .await
            .unwrap();
        assert_eq!(own.entity, cash.entity);
    }

    #[tokio::test]
    async fn test_invalid_input_fails_validation() {
        let (service, cash) = service_with_cash().await;
        let result = service
            .open_petty_cash(NewPettyCash {
                franchise_id: cash.franchise_id,
                code: String::new(),
                name: "Caja".to_string(),
                responsible_id: 1,
                opening_balance: dec!(0),
            })
            .await;
        assert!(matches!(result, Err(LedgerError::Validation(_))));
    }

    #[tokio::test]
    async fn test_statement_rejects_inverted_range() {
        let (service, cash) = service_with_cash().await;
        let start = chrono::NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        let end = chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let result = service
            .build_statement(cash.entity, DateRange::new(start, end), None)
            .await;
        assert!(matches!(result, Err(LedgerError::InvalidRange { .. })));
    }

    #[tokio::test]
    async fn test_unknown_entity_in_scope_reports_not_found() {
        let (service, _) = service_with_cash().await;
        let result = service
            .apply_movement_as(
                &Caller::coordinator(9, 1),
                EntityRef::petty_cash(404),
                Delta::income(dec!(1)),
                MovementMeta::cash(CashMovementKind::Replenishment),
            )
            .await;
        assert!(matches!(result, Err(LedgerError::NotFound(_))));
    }
}
