//! Append-only transaction store boundary.
//!
//! Every operation that reads a balance and then writes runs inside one
//! [`LedgerUnit`], so the store's isolation is what keeps two concurrent settlements
//! from both passing a stale solvency check.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryLedgerStore;
pub use postgres::PostgresLedgerStore;
pub use r#trait::{LedgerStore, LedgerUnit, Page, StoreError};
