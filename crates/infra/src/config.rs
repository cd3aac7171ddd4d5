//! Process configuration read from the environment.
//!
//! | variable | default |
//! |----------|---------|
//! | `LEDGER_DATABASE_URL` | unset: in-memory store |
//! | `LEDGER_DATABASE_MAX_CONNECTIONS` | `10` |
//! | `LEDGER_AUTHORITY_KEY_PATH` | unset: ephemeral authority key |
//! | `LEDGER_LOG_FORMAT` | `json` |
//! | `LEDGER_KEY_SCHEME` | `rsa-pss` |
//! | `LEDGER_PARTICIPANT_KEY_BITS` | `2048` |
//! | `LEDGER_AUTHORITY_KEY_BITS` | `2048` |
//!
//! The participant scheme and modulus size fix the author signature segment of offline
//! entries. The certificate segment always follows the loaded authority key;
//! `LEDGER_AUTHORITY_KEY_BITS` only sizes an ephemeral RSA authority key.

use std::path::PathBuf;

use thiserror::Error;

use ledgerpay_observability::{LogConfig, LogFormat};
use ledgerpay_signing::{DEFAULT_RSA_BITS, KeyScheme, MIN_RSA_BITS};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    /// PKCS#8 PEM file holding the authority's private key.
    pub authority_key_path: Option<PathBuf>,
    pub log: LogConfig,
    /// Scheme of participant keys, and of an ephemeral authority key.
    pub key_scheme: KeyScheme,
    pub participant_key_bits: usize,
    pub authority_key_bits: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            database_max_connections: 10,
            authority_key_path: None,
            log: LogConfig::default(),
            key_scheme: KeyScheme::default(),
            participant_key_bits: DEFAULT_RSA_BITS,
            authority_key_bits: DEFAULT_RSA_BITS,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let log_format = match var("LEDGER_LOG_FORMAT") {
            Some(raw) => raw.parse::<LogFormat>().map_err(|e| ConfigError::Invalid {
                name: "LEDGER_LOG_FORMAT",
                reason: e.to_string(),
            })?,
            None => defaults.log.format,
        };

        let key_scheme = match var("LEDGER_KEY_SCHEME") {
            Some(raw) => raw.parse::<KeyScheme>().map_err(|e| ConfigError::Invalid {
                name: "LEDGER_KEY_SCHEME",
                reason: e.to_string(),
            })?,
            None => defaults.key_scheme,
        };

        Ok(Self {
            database_url: var("LEDGER_DATABASE_URL"),
            database_max_connections: parse_or(
                "LEDGER_DATABASE_MAX_CONNECTIONS",
                var("LEDGER_DATABASE_MAX_CONNECTIONS"),
                defaults.database_max_connections,
            )?,
            authority_key_path: var("LEDGER_AUTHORITY_KEY_PATH").map(PathBuf::from),
            log: LogConfig {
                format: log_format,
                ..defaults.log
            },
            key_scheme,
            participant_key_bits: key_bits(
                "LEDGER_PARTICIPANT_KEY_BITS",
                var("LEDGER_PARTICIPANT_KEY_BITS"),
                defaults.participant_key_bits,
            )?,
            authority_key_bits: key_bits(
                "LEDGER_AUTHORITY_KEY_BITS",
                var("LEDGER_AUTHORITY_KEY_BITS"),
                defaults.authority_key_bits,
            )?,
        })
    }

    /// Size of the author signature segment of every offline entry.
    pub fn author_signature_len(&self) -> usize {
        self.key_scheme.signature_len(self.participant_key_bits)
    }
}

fn key_bits(name: &'static str, raw: Option<String>, default: usize) -> Result<usize, ConfigError> {
    let bits = parse_or(name, raw, default)?;
    if bits < MIN_RSA_BITS {
        return Err(ConfigError::Invalid {
            name,
            reason: format!("must be at least {MIN_RSA_BITS}"),
        });
    }
    Ok(bits)
}

fn parse_or<T>(name: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
    T::Err: std::fmt::Display,
{
    let Some(raw) = raw else {
        return Ok(default);
    };
    let value = raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })?;
    if value <= T::default() {
        return Err(ConfigError::Invalid {
            name,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}
