//! Movement selection predicate.

use serde::{Deserialize, Serialize};

use super::entity::EntityRef;
use super::movement::{Movement, MovementKind};
use super::statement::DateRange;

/// Which movements a query should return. Composed up front and handed to a
/// store, which either evaluates [`MovementFilter::matches`] directly or
/// translates it into SQL.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovementFilter {
    pub entity: EntityRef,
    pub range: Option<DateRange>,
    pub kind: Option<MovementKind>,
}

impl MovementFilter {
    pub fn for_entity(entity: EntityRef) -> Self {
        Self {
            entity,
            range: None,
            kind: None,
        }
    }

    pub fn within(mut self, range: DateRange) -> Self {
        self.range = Some(range);
        self
    }

    pub fn of_kind(mut self, kind: Option<MovementKind>) -> Self {
        self.kind = kind;
        self
    }

    /// A kind from another ledger can never match this entity's movements.
    pub fn is_unsatisfiable(&self) -> bool {
        self.kind
            .is_some_and(|kind| kind.ledger() != self.entity.kind())
    }

    pub fn matches(&self, movement: &Movement) -> bool {
        movement.entity == self.entity
            && self
                .range
                .is_none_or(|range| range.contains(movement.created_utc))
            && self.kind.is_none_or(|kind| kind == movement.kind)
    }
}
