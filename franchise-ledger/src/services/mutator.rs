//! Balance mutation rules.
//!
//! A [`MovementDraft`] is the only input a store accepts for `apply`, and it
//! can only be built through [`MovementDraft::prepare`], so every delta is
//! checked before a store is touched. The store then calls
//! [`MovementDraft::next_balance`] with the balance it read under its row lock.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};
use crate::models::{Delta, EntityRef, LedgerKind, MovementKind, MovementMeta, StockDirection};

/// Largest magnitude a `NUMERIC(19, 2)` column holds.
pub fn max_money() -> Decimal {
    Decimal::from_i128_with_scale(9_999_999_999_999_999_999, 2)
}

/// Input limits enforced on every movement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerPolicy {
    pub max_observation_len: usize,
    pub max_reference_len: usize,
}

impl Default for LedgerPolicy {
    fn default() -> Self {
        Self {
            max_observation_len: 500,
            max_reference_len: 60,
        }
    }
}

/// A validated movement waiting for its `balance_after`.
#[derive(Debug, Clone, PartialEq)]
pub struct MovementDraft {
    entity: EntityRef,
    kind: MovementKind,
    income: Decimal,
    expense: Decimal,
    observation: Option<String>,
    reference_number: Option<String>,
    actor_id: Option<i64>,
}

impl MovementDraft {
    /// Check a delta and its metadata against the target entity.
    pub fn prepare(
        entity: EntityRef,
        delta: Delta,
        meta: MovementMeta,
        policy: &LedgerPolicy,
    ) -> LedgerResult<Self> {
        let ledger = entity.kind();

        let kind = match (ledger, delta) {
            (LedgerKind::BankAccount | LedgerKind::PettyCash, Delta::Monetary { income, expense }) => {
                check_monetary(income, expense)?;
                match meta.kind {
                    Some(kind) if kind.ledger() == ledger => kind,
                    Some(kind) => {
                        return Err(LedgerError::InvalidDelta(format!(
                            "Movement kind '{}' does not apply to {}",
                            kind, ledger
                        )))
                    }
                    None => {
                        return Err(LedgerError::InvalidDelta(format!(
                            "A movement kind is required for {} movements",
                            ledger
                        )))
                    }
                }
            }
            (LedgerKind::Inventory, Delta::Stock { direction, quantity }) => {
                if quantity <= 0 {
                    return Err(LedgerError::InvalidDelta(format!(
                        "Quantity must be positive, got {}",
                        quantity
                    )));
                }
                if meta.actor_id.is_none() {
                    return Err(LedgerError::InvalidDelta(
                        "Inventory movements require an acting user".to_string(),
                    ));
                }
                match meta.kind {
                    None => MovementKind::Stock(direction),
                    Some(MovementKind::Stock(given)) if given == direction => {
                        MovementKind::Stock(direction)
                    }
                    Some(kind) => {
                        return Err(LedgerError::InvalidDelta(format!(
                            "Movement kind '{}' contradicts direction '{}'",
                            kind,
                            direction.as_str()
                        )))
                    }
                }
            }
            (ledger, _) => {
                return Err(LedgerError::InvalidDelta(format!(
                    "Delta shape does not match a {} entity",
                    ledger
                )))
            }
        };

        if meta.reference_number.is_some() && ledger != LedgerKind::BankAccount {
            return Err(LedgerError::InvalidDelta(
                "Reference numbers are only recorded on bank movements".to_string(),
            ));
        }
        if let Some(reference) = &meta.reference_number {
            check_length("Reference number", reference, policy.max_reference_len)?;
        }
        if let Some(observation) = &meta.observation {
            check_length("Observation", observation, policy.max_observation_len)?;
        }

        let (income, expense) = delta.split();

        Ok(Self {
            entity,
            kind,
            income,
            expense,
            observation: meta.observation,
            reference_number: meta.reference_number,
            actor_id: meta.actor_id,
        })
    }

    /// Balance after applying this draft to `current`.
    ///
    /// Inventory stock may never drop below zero. Monetary balances stay within
    /// `NUMERIC(19, 2)` and stock counts within `i64`.
    pub fn next_balance(&self, current: Decimal) -> LedgerResult<Decimal> {
        let next = current
            .checked_add(self.income)
            .and_then(|sum| sum.checked_sub(self.expense))
            .ok_or_else(|| self.out_of_range(current))?;

        if self.entity.kind() == LedgerKind::Inventory {
            if self.kind == MovementKind::Stock(StockDirection::Exit) && next < Decimal::ZERO {
                return Err(LedgerError::InsufficientBalance {
                    entity: self.entity,
                    available: current,
                    requested: self.expense,
                });
            }
            if next > Decimal::from(i64::MAX) {
                return Err(self.out_of_range(current));
            }
        } else if next.abs() > max_money() {
            return Err(self.out_of_range(current));
        }

        Ok(next)
    }

    fn out_of_range(&self, current: Decimal) -> LedgerError {
        LedgerError::InvalidDelta(format!(
            "Movement (income {}, expense {}) takes the balance of {} ({}) out of range",
            self.income, self.expense, self.entity, current
        ))
    }

    pub fn entity(&self) -> EntityRef {
        self.entity
    }

    pub fn kind(&self) -> MovementKind {
        self.kind
    }

    pub fn income(&self) -> Decimal {
        self.income
    }

    pub fn expense(&self) -> Decimal {
        self.expense
    }

    pub fn observation(&self) -> Option<&str> {
        self.observation.as_deref()
    }

    pub fn reference_number(&self) -> Option<&str> {
        self.reference_number.as_deref()
    }

    pub fn actor_id(&self) -> Option<i64> {
        self.actor_id
    }
}

fn check_monetary(income: Decimal, expense: Decimal) -> LedgerResult<()> {
    if income < Decimal::ZERO || expense < Decimal::ZERO {
        return Err(LedgerError::InvalidDelta(format!(
            "Income and expense must be non-negative (income {}, expense {})",
            income, expense
        )));
    }
    if income.is_zero() && expense.is_zero() {
        return Err(LedgerError::InvalidDelta(
            "Either income or expense must be greater than zero".to_string(),
        ));
    }
    if income > max_money() || expense > max_money() {
        return Err(LedgerError::InvalidDelta(format!(
            "Amounts may not exceed {}",
            max_money()
        )));
    }
    if income.round_dp(2) != income || expense.round_dp(2) != expense {
        return Err(LedgerError::InvalidDelta(
            "Amounts must have at most 2 decimal places".to_string(),
        ));
    }
    Ok(())
}

fn check_length(field: &str, value: &str, max: usize) -> LedgerResult<()> {
    let len = value.chars().count();
    if len > max {
        return Err(LedgerError::InvalidDelta(format!(
            "{} is {} characters, limit is {}",
            field, len, max
        )));
    }
    Ok(())
}
