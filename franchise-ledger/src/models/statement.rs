//! Statement model: a recomputed running-balance view over a movement window.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::entity::LedgerEntity;
use super::movement::MovementKind;

/// Inclusive range of calendar days (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Single-day range.
    pub fn day(date: NaiveDate) -> Self {
        Self::new(date, date)
    }

    pub fn is_valid(&self) -> bool {
        self.start <= self.end
    }

    /// Half-open timestamp bounds `[start 00:00, end + 1 day 00:00)`.
    pub fn bounds(&self) -> (DateTime<Utc>, Option<DateTime<Utc>>) {
        let lower = self.start.and_time(NaiveTime::MIN).and_utc();
        let upper = self
            .end
            .succ_opt()
            .map(|next| next.and_time(NaiveTime::MIN).and_utc());
        (lower, upper)
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let day = at.date_naive();
        self.start <= day && day <= self.end
    }
}

/// One statement line with the running value at that point of the window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementLine {
    pub movement_id: i64,
    pub created_utc: DateTime<Utc>,
    pub kind: MovementKind,
    pub income: Decimal,
    pub expense: Decimal,
    pub running_balance: Decimal,
    pub observation: Option<String>,
    pub reference_number: Option<String>,
}

/// Aggregates over the emitted lines.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatementTotals {
    pub total_income: Decimal,
    pub total_expense: Decimal,
    pub final_balance: Decimal,
}

/// Statement for an entity over a date range.
///
/// `entity` is `None` when the entity does not exist; callers decide whether
/// to surface that as a not-found response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub entity: Option<LedgerEntity>,
    pub range: DateRange,
    pub kind: Option<MovementKind>,
    pub lines: Vec<StatementLine>,
    pub totals: StatementTotals,
}
