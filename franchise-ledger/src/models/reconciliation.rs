use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::entity::EntityRef;

/// Outcome of folding an entity's full movement log against its cached balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub entity: EntityRef,
    pub cached_balance: Decimal,
    pub derived_balance: Decimal,
    pub movement_count: usize,
    /// First movement whose stored `balance_after` disagrees with the fold.
    pub first_divergence: Option<i64>,
    pub repaired: bool,
}

impl Reconciliation {
    pub fn is_consistent(&self) -> bool {
        self.cached_balance == self.derived_balance && self.first_divergence.is_none()
    }
}
