//! Tracing/logging setup shared by every binary that hosts the ledger.

pub mod tracing;

pub use self::tracing::{LogConfig, LogFormat, ParseLogFormatError, init};
