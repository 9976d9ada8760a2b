//! Error types for the points ledger.

use crate::ids::IdError;
use crate::points::PointType;

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors that can occur in ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// An account, balance or rule does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record that was looked up.
        entity: &'static str,
        /// The identifier that was not found.
        id: String,
    },

    /// The mutation would drive a point pool below zero.
    #[error("insufficient {pool} points: balance={balance}, required={required}")]
    InsufficientBalance {
        /// The pool that would go negative.
        pool: PointType,
        /// Current balance of that pool.
        balance: i64,
        /// Amount the mutation tried to take.
        required: i64,
    },

    /// Malformed rule or points configuration.
    #[error("validation error: {0}")]
    Validation(String),

    /// The underlying store failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// A record with the same key already exists.
    #[error("{entity} already exists: {id}")]
    AlreadyExists {
        /// Kind of record.
        entity: &'static str,
        /// The conflicting identifier.
        id: String,
    },

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}

impl LedgerError {
    /// Shorthand for a [`LedgerError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Shorthand for a [`LedgerError::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
