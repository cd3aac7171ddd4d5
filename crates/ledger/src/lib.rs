//! Ledger domain (append-only transaction log, derived balances).
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns.

pub mod balance;
pub mod command;
pub mod request;
pub mod transaction;

pub use balance::{balance_of, ensure_covers};
pub use command::{NewTransaction, PaymentCommand, RequestResponse};
pub use request::{Decision, authorize_settlement, next_state, settlement_transfer};
pub use transaction::{Origin, RequestState, Transaction, TransactionKind};
