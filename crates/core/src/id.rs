//! Strongly-typed identifiers used across the ledger.
//!
//! Identifiers are opaque strings: online records get a UUIDv7, offline entries carry
//! whatever the authoring client chose, so no format beyond "non-empty, no surrounding
//! whitespace" is enforced.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LedgerError;

/// Identifier of a participant (account holder).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ParticipantId(String);

/// Identifier of a ledger transaction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TransactionId(String);

macro_rules! impl_opaque_id {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Create a fresh identifier.
            ///
            /// Uses UUIDv7 (time-ordered). Prefer passing IDs explicitly in tests
            /// for determinism.
            pub fn new() -> Self {
                Self(Uuid::now_v7().to_string())
            }

            /// Parse an externally supplied identifier.
            pub fn parse(value: impl Into<String>) -> Result<Self, LedgerError> {
                let value = value.into();
                if value.is_empty() {
                    return Err(LedgerError::validation(concat!($name, " must not be empty")));
                }
                if value.trim() != value {
                    return Err(LedgerError::validation(concat!(
                        $name,
                        " must not carry surrounding whitespace"
                    )));
                }
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $t {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $t {
            type Error = LedgerError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(value)
            }
        }

        impl From<$t> for String {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = LedgerError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }
    };
}

impl_opaque_id!(ParticipantId, "ParticipantId");
impl_opaque_id!(TransactionId, "TransactionId");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(TransactionId::new(), TransactionId::new());
    }

    #[test]
    fn empty_and_padded_ids_are_rejected() {
        assert!(ParticipantId::parse("").is_err());
        assert!(ParticipantId::parse(" alice").is_err());
        assert_eq!(ParticipantId::parse("alice").unwrap().as_str(), "alice");
    }

    #[test]
    fn deserialization_goes_through_validation() {
        let ok: TransactionId = serde_json::from_str("\"8a7c-1700000000\"").unwrap();
        assert_eq!(ok.as_str(), "8a7c-1700000000");
        assert!(serde_json::from_str::<TransactionId>("\"\"").is_err());
    }
}
