//! Ledger error model.

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type used across the ledger.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Error taxonomy of the ledger.
///
/// Every variant is reported synchronously at the point the contract is violated.
/// `Conflict` is the only one a plain retry can cure; the services re-run the unit a
/// bounded number of times before surfacing it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Malformed request shape (missing or invalid fields).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Solvency check failed at transfer or settlement time.
    #[error("insufficient balance: available {available}, required {required}")]
    InsufficientBalance { available: Decimal, required: Decimal },

    /// Actor is not authorized for the target transaction.
    #[error("permission denied")]
    PermissionDenied,

    /// Illegal state transition.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// An offline batch failed a structural, cryptographic or referential check.
    ///
    /// Deliberately carries no reason.
    #[error("ledger has been modified by unauthorized entities")]
    IntegrityViolation,

    /// A referenced transaction or participant does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The backing store refused the unit of work because of a concurrent writer.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Any other backing store failure.
    #[error("store error: {0}")]
    Store(String),

    /// The authority key could not produce a signature.
    #[error("signing failed: {0}")]
    Signing(String),
}

impl LedgerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn insufficient(available: Decimal, required: Decimal) -> Self {
        Self::InsufficientBalance {
            available,
            required,
        }
    }

    /// Whether retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn integrity_violation_message_does_not_leak_a_reason() {
        let msg = LedgerError::IntegrityViolation.to_string();
        assert_eq!(msg, "ledger has been modified by unauthorized entities");
    }

    #[test]
    fn only_conflicts_are_retryable() {
        assert!(LedgerError::conflict("serialization failure").is_retryable());
        assert!(!LedgerError::insufficient(dec!(1), dec!(2)).is_retryable());
        assert!(!LedgerError::PermissionDenied.is_retryable());
    }
}
