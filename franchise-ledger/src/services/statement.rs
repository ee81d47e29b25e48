//! Statement construction.

use rust_decimal::Decimal;

use crate::error::{LedgerError, LedgerResult};
use crate::models::{
    DateRange, LedgerEntity, Movement, MovementKind, Statement, StatementLine, StatementTotals,
};

/// Build a statement from an already-filtered movement window.
///
/// The running balance starts at zero at the window start; stored
/// `balance_after` values are ignored so the result reflects exactly the
/// filtered subset.
pub fn build_statement(
    entity: Option<LedgerEntity>,
    range: DateRange,
    kind: Option<MovementKind>,
    mut movements: Vec<Movement>,
) -> LedgerResult<Statement> {
    movements.sort_by(|a, b| {
        a.created_utc
            .cmp(&b.created_utc)
            .then(a.movement_id.cmp(&b.movement_id))
    });

    let mut totals = StatementTotals::default();
    let mut running = Decimal::ZERO;
    let mut lines = Vec::with_capacity(movements.len());
    for movement in movements {
        let overflow = || {
            LedgerError::Overflow(format!(
                "statement line for movement {}",
                movement.movement_id
            ))
        };
        running = running
            .checked_add(movement.income)
            .and_then(|sum| sum.checked_sub(movement.expense))
            .ok_or_else(overflow)?;
        totals.total_income = totals
            .total_income
            .checked_add(movement.income)
            .ok_or_else(overflow)?;
        totals.total_expense = totals
            .total_expense
            .checked_add(movement.expense)
            .ok_or_else(overflow)?;
        lines.push(StatementLine {
            movement_id: movement.movement_id,
            created_utc: movement.created_utc,
            kind: movement.kind,
            income: movement.income,
            expense: movement.expense,
            running_balance: running,
            observation: movement.observation,
            reference_number: movement.reference_number,
        });
    }
    totals.final_balance = running;

    Ok(Statement {
        entity,
        range,
        kind,
        lines,
        totals,
    })
}

/// Statement for an entity that does not exist.
pub fn empty_statement(range: DateRange, kind: Option<MovementKind>) -> Statement {
    Statement {
        entity: None,
        range,
        kind,
        lines: Vec::new(),
        totals: StatementTotals::default(),
    }
}
