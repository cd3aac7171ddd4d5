//! `ledgerpay-signing` — the operating authority's signing service.
//!
//! The authority key pair is an explicitly constructed value: it is loaded (or generated)
//! once at startup and handed to [`SigningService`], which every other component receives
//! by handle. Nothing here reads ambient global state.

pub mod attestation;
pub mod keys;
pub mod service;

pub use attestation::{BalanceAttestation, attestation_message};
pub use keys::{
    DEFAULT_RSA_BITS, ED25519_SIGNATURE_LEN, KeyPair, KeyScheme, MIN_RSA_BITS,
    PUBLIC_KEY_PEM_TRAILER, ParseKeySchemeError, PublicKey, SigningError, decode_public_key_pem,
};
pub use service::SigningService;
