//! Rebuild of cached balances from the movement log.

use rust_decimal::Decimal;

use crate::error::{LedgerError, LedgerResult};
use crate::models::{EntityRef, Movement, Reconciliation};

/// Replay `movements` (in log order) from `opening`, returning the derived
/// balance and the first movement whose stored `balance_after` disagrees.
pub fn fold_log(opening: Decimal, movements: &[Movement]) -> LedgerResult<(Decimal, Option<i64>)> {
    let mut balance = opening;
    let mut first_divergence = None;
    for movement in movements {
        balance = balance
            .checked_add(movement.income)
            .and_then(|sum| sum.checked_sub(movement.expense))
            .ok_or_else(|| {
                LedgerError::Overflow(format!(
                    "folding movement {} of {}",
                    movement.movement_id, movement.entity
                ))
            })?;
        if first_divergence.is_none() && movement.balance_after != balance {
            first_divergence = Some(movement.movement_id);
        }
    }
    Ok((balance, first_divergence))
}

/// Compare an entity's cached balance against its folded log.
pub fn reconcile(
    entity: EntityRef,
    opening: Decimal,
    cached_balance: Decimal,
    movements: &[Movement],
) -> LedgerResult<Reconciliation> {
    let (derived_balance, first_divergence) = fold_log(opening, movements)?;
    Ok(Reconciliation {
        entity,
        cached_balance,
        derived_balance,
        movement_count: movements.len(),
        first_divergence,
        repaired: false,
    })
}
