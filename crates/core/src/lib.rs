//! `ledgerpay-core` — shared primitives of the balance ledger.
//!
//! Pure types only: identifiers, amounts and the error taxonomy. No IO.

pub mod amount;
pub mod error;
pub mod id;

pub use amount::{Amount, MAX_AMOUNT};
pub use error::{LedgerError, LedgerResult};
pub use id::{ParticipantId, TransactionId};
