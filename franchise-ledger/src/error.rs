//! Ledger error taxonomy.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use service_core::error::AppError;
use thiserror::Error;

use crate::models::EntityRef;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger entity not found: {0}")]
    NotFound(EntityRef),

    #[error("Franchise not found: {0}")]
    FranchiseNotFound(i64),

    #[error("Invalid delta: {0}")]
    InvalidDelta(String),

    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("Insufficient balance in {entity}: available {available}, requested {requested}")]
    InsufficientBalance {
        entity: EntityRef,
        available: Decimal,
        requested: Decimal,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// A stored sum left the representable range while folding movements.
    #[error("Arithmetic overflow: {0}")]
    Overflow(String),

    #[error("Franchise {franchise_id} is outside the caller's scope")]
    OutOfScope { franchise_id: i64 },

    /// The store could not complete the unit of work. Nothing is assumed
    /// about whether a commit reached the database.
    #[error("Transaction failure: {0}")]
    TransactionFailure(anyhow::Error),
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

impl LedgerError {
    /// Only store failures may succeed on a fresh attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransactionFailure(_))
    }

    /// Label for the errors metric.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::FranchiseNotFound(_) => "franchise_not_found",
            Self::InvalidDelta(_) => "invalid_delta",
            Self::InvalidRange { .. } => "invalid_range",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::Validation(_) => "validation_error",
            Self::Conflict(_) => "conflict",
            Self::Overflow(_) => "overflow",
            Self::OutOfScope { .. } => "out_of_scope",
            Self::TransactionFailure(_) => "db_error",
        }
    }

    pub(crate) fn store(context: &str, err: impl std::fmt::Display) -> Self {
        Self::TransactionFailure(anyhow::anyhow!("{}: {}", context, err))
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound(_) | LedgerError::FranchiseNotFound(_) => {
                AppError::NotFound(anyhow::anyhow!(err.to_string()))
            }
            LedgerError::InvalidDelta(_)
            | LedgerError::InvalidRange { .. }
            | LedgerError::InsufficientBalance { .. } => {
                AppError::BadRequest(anyhow::anyhow!(err.to_string()))
            }
            LedgerError::Validation(errors) => AppError::ValidationError(errors),
            LedgerError::Conflict(msg) => AppError::Conflict(anyhow::anyhow!(msg)),
            LedgerError::OutOfScope { .. } => {
                AppError::Forbidden(anyhow::anyhow!(err.to_string()))
            }
            LedgerError::Overflow(_) => {
                AppError::InternalError(anyhow::anyhow!(err.to_string()))
            }
            LedgerError::TransactionFailure(cause) => AppError::DatabaseError(cause),
        }
    }
}
