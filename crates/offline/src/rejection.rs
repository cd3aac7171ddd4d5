use thiserror::Error;

use ledgerpay_core::LedgerError;

/// Why an offline batch was refused.
///
/// This is for logs only. Callers always receive the same
/// [`LedgerError::IntegrityViolation`] so a forger learns nothing from the answer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("batch is empty")]
    EmptyBatch,

    #[error("entry {index}: shorter than the two signature segments")]
    Truncated { index: usize },

    #[error("entry {index}: public key trailer missing or repeated")]
    PublicKeyFraming { index: usize },

    #[error("entry {index}: payload rejected: {reason}")]
    Payload { index: usize, reason: String },

    #[error("entry {index}: caller is neither sender nor receiver")]
    NotAParty { index: usize },

    #[error("entry {index}: signed with the caller's own key")]
    OwnKey { index: usize },

    #[error("entry {index}: public key not certified by the authority")]
    UncertifiedKey { index: usize },

    #[error("entry {index}: payload signature does not verify")]
    BadSignature { index: usize },

    #[error("entry {index}: id reused with different content")]
    ConflictingDuplicate { index: usize },

    #[error("unknown counterparty")]
    UnknownCounterparty,

    #[error("entry {index}: key does not belong to the counterparty")]
    ForeignKey { index: usize },
}

impl From<Rejection> for LedgerError {
    fn from(_: Rejection) -> Self {
        LedgerError::IntegrityViolation
    }
}
