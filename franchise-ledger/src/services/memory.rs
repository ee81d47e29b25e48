//! In-process ledger store for tests and local development.
//!
//! Each entity row sits behind its own `tokio::sync::Mutex`, which plays the
//! part of a row lock: `apply` and `reconcile` hold it from the balance read
//! until both the log append and the balance update are done. Movement
//! timestamps never go backwards within one entity, even if the wall clock does.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, instrument};

use crate::error::{LedgerError, LedgerResult};
use crate::models::{
    EntityRef, Franchise, LedgerEntity, LedgerKind, Movement, MovementFilter, NewBankAccount,
    NewPettyCash, NewStockLine, Reconciliation,
};
use crate::services::mutator::MovementDraft;
use crate::services::reconcile;
use crate::services::store::LedgerStore;

/// Entity state guarded by its row lock.
struct Row {
    entity: LedgerEntity,
    last_movement_utc: Option<DateTime<Utc>>,
}

type RowLock = Arc<Mutex<Row>>;

#[derive(Default)]
struct Registry {
    franchises: HashMap<i64, Franchise>,
    rows: HashMap<EntityRef, RowLock>,
    codes: HashSet<(LedgerKind, String)>,
}

/// Ledger store held entirely in memory.
#[derive(Default)]
pub struct MemoryLedgerStore {
    registry: RwLock<Registry>,
    log: RwLock<Vec<Movement>>,
    next_franchise_id: AtomicI64,
    next_entity_id: AtomicI64,
    next_movement_id: AtomicI64,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn row(&self, entity: &EntityRef) -> Option<RowLock> {
        self.registry.read().await.rows.get(entity).cloned()
    }

    async fn open(
        &self,
        franchise_id: i64,
        code: Option<&str>,
        build: impl FnOnce(i64) -> LedgerEntity,
    ) -> LedgerResult<LedgerEntity> {
        let mut registry = self.registry.write().await;

        if !registry.franchises.contains_key(&franchise_id) {
            return Err(LedgerError::FranchiseNotFound(franchise_id));
        }

        let entity = build(self.next_entity_id.fetch_add(1, Ordering::SeqCst) + 1);
        let kind = entity.kind();

        if registry.rows.contains_key(&entity.entity) {
            return Err(LedgerError::Conflict(format!(
                "{} already exists",
                entity.entity
            )));
        }
        if let Some(code) = code {
            if !registry.codes.insert((kind, code.to_string())) {
                return Err(LedgerError::Conflict(format!(
                    "{} with code '{}' already exists",
                    kind, code
                )));
            }
        }

        registry.rows.insert(
            entity.entity,
            Arc::new(Mutex::new(Row {
                entity: entity.clone(),
                last_movement_utc: None,
            })),
        );
        Ok(entity)
    }

    async fn entity_log(&self, entity: &EntityRef) -> Vec<Movement> {
        self.log
            .read()
            .await
            .iter()
            .filter(|m| m.entity == *entity)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn register_franchise(&self, name: &str) -> LedgerResult<Franchise> {
        let mut registry = self.registry.write().await;
        if registry.franchises.values().any(|f| f.name == name) {
            return Err(LedgerError::Conflict(format!(
                "Franchise '{}' already exists",
                name
            )));
        }
        let franchise = Franchise {
            franchise_id: self.next_franchise_id.fetch_add(1, Ordering::SeqCst) + 1,
            name: name.to_string(),
            created_utc: Utc::now(),
        };
        registry
            .franchises
            .insert(franchise.franchise_id, franchise.clone());
        Ok(franchise)
    }

    async fn open_bank_account(&self, input: &NewBankAccount) -> LedgerResult<LedgerEntity> {
        self.open(input.franchise_id, Some(input.code.as_str()), |id| LedgerEntity {
            entity: EntityRef::bank_account(id),
            franchise_id: input.franchise_id,
            code: Some(input.code.clone()),
            name: Some(input.bank_name.clone()),
            responsible_id: Some(input.responsible_id),
            opening_balance: input.opening_balance,
            current_balance: input.opening_balance,
            created_utc: Utc::now(),
        })
        .await
    }

    async fn open_petty_cash(&self, input: &NewPettyCash) -> LedgerResult<LedgerEntity> {
        self.open(input.franchise_id, Some(input.code.as_str()), |id| LedgerEntity {
            entity: EntityRef::petty_cash(id),
            franchise_id: input.franchise_id,
            code: Some(input.code.clone()),
            name: Some(input.name.clone()),
            responsible_id: Some(input.responsible_id),
            opening_balance: input.opening_balance,
            current_balance: input.opening_balance,
            created_utc: Utc::now(),
        })
        .await
    }

    async fn open_stock(&self, input: &NewStockLine) -> LedgerResult<LedgerEntity> {
        let opening = Decimal::from(input.opening_quantity);
        self.open(input.franchise_id, None, |_| LedgerEntity {
            entity: EntityRef::stock(input.product_id, input.franchise_id),
            franchise_id: input.franchise_id,
            code: None,
            name: None,
            responsible_id: None,
            opening_balance: opening,
            current_balance: opening,
            created_utc: Utc::now(),
        })
        .await
    }

    async fn entity(&self, entity: &EntityRef) -> LedgerResult<Option<LedgerEntity>> {
        match self.row(entity).await {
            Some(row) => Ok(Some(row.lock().await.entity.clone())),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, draft), fields(entity = %draft.entity(), kind = %draft.kind()))]
    async fn apply(&self, draft: &MovementDraft) -> LedgerResult<Movement> {
        let entity = draft.entity();
        let row = self
            .row(&entity)
            .await
            .ok_or(LedgerError::NotFound(entity))?;

        let mut locked = row.lock().await;
        let balance_after = draft.next_balance(locked.entity.current_balance)?;
        let created_utc = match locked.last_movement_utc {
            Some(last) => Utc::now().max(last),
            None => Utc::now(),
        };

        let movement = Movement {
            movement_id: self.next_movement_id.fetch_add(1, Ordering::SeqCst) + 1,
            entity,
            kind: draft.kind(),
            income: draft.income(),
            expense: draft.expense(),
            balance_after,
            observation: draft.observation().map(str::to_string),
            reference_number: draft.reference_number().map(str::to_string),
            actor_id: draft.actor_id(),
            created_utc,
        };

        // Nothing below can fail, so the append and the balance update land together.
        self.log.write().await.push(movement.clone());
        locked.entity.current_balance = balance_after;
        locked.last_movement_utc = Some(created_utc);

        debug!(movement_id = movement.movement_id, %balance_after, "Movement applied");
        Ok(movement)
    }

    async fn movements(&self, filter: &MovementFilter) -> LedgerResult<Vec<Movement>> {
        if filter.is_unsatisfiable() {
            return Ok(Vec::new());
        }
        let mut movements: Vec<Movement> = self
            .log
            .read()
            .await
            .iter()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect();
        movements.sort_by(|a, b| {
            a.created_utc
                .cmp(&b.created_utc)
                .then(a.movement_id.cmp(&b.movement_id))
        });
        Ok(movements)
    }

    #[instrument(skip(self), fields(entity = %entity))]
    async fn reconcile(&self, entity: &EntityRef, repair: bool) -> LedgerResult<Reconciliation> {
        let row = self
            .row(entity)
            .await
            .ok_or(LedgerError::NotFound(*entity))?;
        let mut locked = row.lock().await;

        let log = self.entity_log(entity).await;
        let mut report = reconcile::reconcile(
            *entity,
            locked.entity.opening_balance,
            locked.entity.current_balance,
            &log,
        )?;
        if repair && report.cached_balance != report.derived_balance {
            locked.entity.current_balance = report.derived_balance;
            report.repaired = true;
        }
        Ok(report)
    }

    async fn health_check(&self) -> LedgerResult<()> {
        Ok(())
    }
}
