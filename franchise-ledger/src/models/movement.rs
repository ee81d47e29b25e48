//! Movement model: the append-only records that mutate ledger balances.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::entity::{EntityRef, LedgerKind};

/// Kinds of bank account movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BankMovementKind {
    Transfer,
    Deposit,
    Withdrawal,
    Check,
}

impl BankMovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transfer => "transfer",
            Self::Deposit => "deposit",
            Self::Withdrawal => "withdrawal",
            Self::Check => "check",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "transfer" => Some(Self::Transfer),
            "deposit" => Some(Self::Deposit),
            "withdrawal" => Some(Self::Withdrawal),
            "check" => Some(Self::Check),
            _ => None,
        }
    }
}

/// Kinds of petty cash movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CashMovementKind {
    Replenishment,
    Disbursement,
    Adjustment,
}

impl CashMovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Replenishment => "replenishment",
            Self::Disbursement => "disbursement",
            Self::Adjustment => "adjustment",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "replenishment" => Some(Self::Replenishment),
            "disbursement" => Some(Self::Disbursement),
            "adjustment" => Some(Self::Adjustment),
            _ => None,
        }
    }
}

/// Direction of an inventory movement (entrada / salida).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StockDirection {
    Entry,
    Exit,
}

impl StockDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::Exit => "exit",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "entry" => Some(Self::Entry),
            "exit" => Some(Self::Exit),
            _ => None,
        }
    }
}

/// Movement kind, scoped to the ledger it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "ledger", content = "kind", rename_all = "snake_case")]
pub enum MovementKind {
    Bank(BankMovementKind),
    Cash(CashMovementKind),
    Stock(StockDirection),
}

impl MovementKind {
    /// Ledger this kind is valid for.
    pub fn ledger(&self) -> LedgerKind {
        match self {
            Self::Bank(_) => LedgerKind::BankAccount,
            Self::Cash(_) => LedgerKind::PettyCash,
            Self::Stock(_) => LedgerKind::Inventory,
        }
    }

    /// Column value stored in the movement tables.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bank(kind) => kind.as_str(),
            Self::Cash(kind) => kind.as_str(),
            Self::Stock(direction) => direction.as_str(),
        }
    }

    /// Parse a stored column value for the given ledger.
    pub fn parse(ledger: LedgerKind, value: &str) -> Option<Self> {
        match ledger {
            LedgerKind::BankAccount => BankMovementKind::parse(value).map(Self::Bank),
            LedgerKind::PettyCash => CashMovementKind::parse(value).map(Self::Cash),
            LedgerKind::Inventory => StockDirection::parse(value).map(Self::Stock),
        }
    }
}

impl std::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Requested change to a balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Delta {
    /// Bank account or petty cash: income and expense, never both zero.
    Monetary { income: Decimal, expense: Decimal },
    /// Inventory: a positive quantity moved in the given direction.
    Stock {
        direction: StockDirection,
        quantity: i64,
    },
}

impl Delta {
    pub fn income(amount: Decimal) -> Self {
        Self::Monetary {
            income: amount,
            expense: Decimal::ZERO,
        }
    }

    pub fn expense(amount: Decimal) -> Self {
        Self::Monetary {
            income: Decimal::ZERO,
            expense: amount,
        }
    }

    pub fn entry(quantity: i64) -> Self {
        Self::Stock {
            direction: StockDirection::Entry,
            quantity,
        }
    }

    pub fn exit(quantity: i64) -> Self {
        Self::Stock {
            direction: StockDirection::Exit,
            quantity,
        }
    }

    /// Split into (income, expense) columns. Stock entries land in income,
    /// exits in expense.
    pub fn split(&self) -> (Decimal, Decimal) {
        match *self {
            Self::Monetary { income, expense } => (income, expense),
            Self::Stock {
                direction: StockDirection::Entry,
                quantity,
            } => (Decimal::from(quantity), Decimal::ZERO),
            Self::Stock {
                direction: StockDirection::Exit,
                quantity,
            } => (Decimal::ZERO, Decimal::from(quantity)),
        }
    }
}

/// Descriptive data recorded alongside a delta.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MovementMeta {
    /// Required for bank and petty cash movements. Inventory movements take
    /// their kind from the delta direction.
    pub kind: Option<MovementKind>,
    /// Bank movements only.
    pub reference_number: Option<String>,
    pub observation: Option<String>,
    /// Acting user; mandatory for inventory movements.
    pub actor_id: Option<i64>,
}

impl MovementMeta {
    pub fn bank(kind: BankMovementKind) -> Self {
        Self {
            kind: Some(MovementKind::Bank(kind)),
            ..Self::default()
        }
    }

    pub fn cash(kind: CashMovementKind) -> Self {
        Self {
            kind: Some(MovementKind::Cash(kind)),
            ..Self::default()
        }
    }

    pub fn stock(actor_id: i64) -> Self {
        Self {
            actor_id: Some(actor_id),
            ..Self::default()
        }
    }

    pub fn with_observation(mut self, observation: impl Into<String>) -> Self {
        self.observation = Some(observation.into());
        self
    }

    pub fn with_reference(mut self, reference_number: impl Into<String>) -> Self {
        self.reference_number = Some(reference_number.into());
        self
    }

    pub fn with_actor(mut self, actor_id: i64) -> Self {
        self.actor_id = Some(actor_id);
        self
    }
}

/// Persisted, immutable movement record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movement {
    pub movement_id: i64,
    pub entity: EntityRef,
    pub kind: MovementKind,
    pub income: Decimal,
    pub expense: Decimal,
    pub balance_after: Decimal,
    pub observation: Option<String>,
    pub reference_number: Option<String>,
    pub actor_id: Option<i64>,
    pub created_utc: DateTime<Utc>,
}
