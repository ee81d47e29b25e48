//! Balance-bearing ledger entities and the inputs that open them.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::{Validate, ValidationError};

/// The three kinds of balance the ledger tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerKind {
    BankAccount,
    PettyCash,
    Inventory,
}

impl LedgerKind {
    /// Get string representation (metric labels, logs).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BankAccount => "bank_account",
            Self::PettyCash => "petty_cash",
            Self::Inventory => "inventory",
        }
    }

    /// Bank accounts and petty cash carry money; inventory carries units.
    pub fn is_monetary(&self) -> bool {
        !matches!(self, Self::Inventory)
    }
}

impl std::fmt::Display for LedgerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identity of a ledger entity.
///
/// Stock lines have no surrogate id; they are keyed by product and franchise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "ledger", rename_all = "snake_case")]
pub enum EntityRef {
    BankAccount { account_id: i64 },
    PettyCash { petty_cash_id: i64 },
    Stock { product_id: i64, franchise_id: i64 },
}

impl EntityRef {
    pub fn bank_account(account_id: i64) -> Self {
        Self::BankAccount { account_id }
    }

    pub fn petty_cash(petty_cash_id: i64) -> Self {
        Self::PettyCash { petty_cash_id }
    }

    pub fn stock(product_id: i64, franchise_id: i64) -> Self {
        Self::Stock {
            product_id,
            franchise_id,
        }
    }

    pub fn kind(&self) -> LedgerKind {
        match self {
            Self::BankAccount { .. } => LedgerKind::BankAccount,
            Self::PettyCash { .. } => LedgerKind::PettyCash,
            Self::Stock { .. } => LedgerKind::Inventory,
        }
    }
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BankAccount { account_id } => write!(f, "bank_account:{}", account_id),
            Self::PettyCash { petty_cash_id } => write!(f, "petty_cash:{}", petty_cash_id),
            Self::Stock {
                product_id,
                franchise_id,
            } => write!(f, "stock:{}@{}", product_id, franchise_id),
        }
    }
}

/// Tenant boundary owning ledger entities.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Franchise {
    pub franchise_id: i64,
    pub name: String,
    pub created_utc: DateTime<Utc>,
}

/// A balance-bearing entity with its cached current balance.
///
/// `current_balance` always equals the `balance_after` of the entity's latest
/// movement, or `opening_balance` when it has none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntity {
    pub entity: EntityRef,
    pub franchise_id: i64,
    pub code: Option<String>,
    pub name: Option<String>,
    pub responsible_id: Option<i64>,
    pub opening_balance: Decimal,
    pub current_balance: Decimal,
    pub created_utc: DateTime<Utc>,
}

impl LedgerEntity {
    pub fn kind(&self) -> LedgerKind {
        self.entity.kind()
    }
}

/// Input for registering a franchise.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewFranchise {
    #[validate(length(min = 1, max = 120, message = "Franchise name must be 1-120 characters"))]
    pub name: String,
}

/// Input for opening a bank account.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewBankAccount {
    pub franchise_id: i64,
    #[validate(length(min = 1, max = 40, message = "Account code must be 1-40 characters"))]
    pub code: String,
    #[validate(length(min = 1, max = 120, message = "Bank name must be 1-120 characters"))]
    pub bank_name: String,
    pub responsible_id: i64,
    #[validate(custom(function = "validate_money"))]
    pub opening_balance: Decimal,
}

/// Input for opening a petty cash box.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewPettyCash {
    pub franchise_id: i64,
    #[validate(length(min = 1, max = 40, message = "Petty cash code must be 1-40 characters"))]
    pub code: String,
    #[validate(length(min = 1, max = 120, message = "Petty cash name must be 1-120 characters"))]
    pub name: String,
    pub responsible_id: i64,
    #[validate(custom(function = "validate_money"))]
    pub opening_balance: Decimal,
}

/// Input for opening a product stock line in a franchise.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewStockLine {
    pub product_id: i64,
    pub franchise_id: i64,
    #[validate(range(min = 0, message = "Opening quantity cannot be negative"))]
    pub opening_quantity: i64,
}

/// Monetary values carry at most two decimal places.
pub fn validate_money(value: &Decimal) -> Result<(), ValidationError> {
    if value.scale() > 2 && value.round_dp(2) != *value {
        let mut err = ValidationError::new("money_precision");
        err.message = Some("Amount must have at most 2 decimal places".into());
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_entity_ref_kind_and_display() {
        assert_eq!(EntityRef::bank_account(3).kind(), LedgerKind::BankAccount);
        assert_eq!(EntityRef::petty_cash(4).to_string(), "petty_cash:4");
        assert_eq!(EntityRef::stock(7, 2).to_string(), "stock:7@2");
        assert!(!LedgerKind::Inventory.is_monetary());
    }

    #[test]
    fn test_money_precision() {
        assert!(validate_money(&dec!(10.25)).is_ok());
        assert!(validate_money(&dec!(10.2500)).is_ok());
        assert!(validate_money(&dec!(10.255)).is_err());
    }

    #[test]
    fn test_new_bank_account_validation() {
        let input = NewBankAccount {
            franchise_id: 1,
            code: String::new(),
            bank_name: "Banco Central".to_string(),
            responsible_id: 9,
            opening_balance: dec!(0),
        };
        let errors = input.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("code"));
    }

    #[test]
    fn test_negative_opening_stock_rejected() {
        let input = NewStockLine {
            product_id: 1,
            franchise_id: 1,
            opening_quantity: -1,
        };
        assert!(input.validate().is_err());
    }
}
