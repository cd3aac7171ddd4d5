//! `ledgerpay-auth` — identity boundary consumed by the ledger.
//!
//! Authentication itself happens elsewhere; this crate only models who the caller is
//! and how participants are looked up.

pub mod directory;
pub mod principal;

pub use directory::{DirectoryError, InMemoryParticipantDirectory, ParticipantDirectory};
pub use principal::{Caller, Participant};
