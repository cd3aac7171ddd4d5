//! Infrastructure layer: ledger store adapters, orchestration services, configuration
//! and wiring.

pub mod app;
pub mod config;
pub mod ledger_store;
pub mod reconciler;
pub mod retry;
pub mod service;

pub use app::{LedgerApp, SharedDirectory, SharedStore, StartupError};
pub use config::{AppConfig, ConfigError};
pub use ledger_store::{InMemoryLedgerStore, LedgerStore, LedgerUnit, Page, PostgresLedgerStore, StoreError};
pub use reconciler::{ReconciliationOutcome, Reconciler};
pub use retry::retry_on_conflict;
pub use service::{LedgerService, PaymentReceipt};
