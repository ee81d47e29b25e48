//! Franchise access scoping.
//!
//! Every scoped ledger entry point resolves the caller to a
//! [`FranchiseScope`] through [`scope_for`] and checks the target entity's
//! franchise against it before touching the store.

use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Administrator,
    Coordinator,
    Volunteer,
}

/// Authenticated identity handed over by the request layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: i64,
    pub role: Role,
    pub franchise_id: Option<i64>,
}

impl Caller {
    pub fn administrator(user_id: i64) -> Self {
        Self {
            user_id,
            role: Role::Administrator,
            franchise_id: None,
        }
    }

    pub fn coordinator(user_id: i64, franchise_id: i64) -> Self {
        Self {
            user_id,
            role: Role::Coordinator,
            franchise_id: Some(franchise_id),
        }
    }

    pub fn volunteer(user_id: i64, franchise_id: i64) -> Self {
        Self {
            user_id,
            role: Role::Volunteer,
            franchise_id: Some(franchise_id),
        }
    }
}

/// Franchises whose ledgers a caller may read or mutate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FranchiseScope {
    All,
    Only(i64),
    Nothing,
}

impl FranchiseScope {
    pub fn permits(&self, franchise_id: i64) -> bool {
        match self {
            Self::All => true,
            Self::Only(own) => *own == franchise_id,
            Self::Nothing => false,
        }
    }

    pub fn ensure(&self, franchise_id: i64) -> LedgerResult<()> {
        if self.permits(franchise_id) {
            Ok(())
        } else {
            Err(LedgerError::OutOfScope { franchise_id })
        }
    }
}

/// Resolve a caller to the franchises they may touch.
///
/// A coordinator without a franchise assignment gets nothing. Volunteers never
/// operate on ledgers.
pub fn scope_for(caller: &Caller) -> FranchiseScope {
    match (caller.role, caller.franchise_id) {
        (Role::Administrator, _) => FranchiseScope::All,
        (Role::Coordinator, Some(franchise_id)) => FranchiseScope::Only(franchise_id),
        (Role::Coordinator, None) | (Role::Volunteer, _) => FranchiseScope::Nothing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_administrator_sees_everything() {
        let scope = scope_for(&Caller::administrator(1));
        assert_eq!(scope, FranchiseScope::All);
        assert!(scope.permits(7));
    }

    #[test]
    fn test_coordinator_limited_to_own_franchise() {
        let scope = scope_for(&Caller::coordinator(2, 3));
        assert!(scope.permits(3));
        assert!(matches!(
            scope.ensure(4),
            Err(LedgerError::OutOfScope { franchise_id: 4 })
        ));
    }

    #[test]
    fn test_unassigned_coordinator_and_volunteer_denied() {
        let unassigned = Caller {
            user_id: 5,
            role: Role::Coordinator,
            franchise_id: None,
        };
        assert_eq!(scope_for(&unassigned), FranchiseScope::Nothing);
        assert!(!scope_for(&Caller::volunteer(6, 3)).permits(3));
    }
}
