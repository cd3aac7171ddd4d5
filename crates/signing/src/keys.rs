//! Key material: generation, PEM import/export, raw sign/verify.
//!
//! Two schemes are supported. `RsaPss` is RSA-PSS over SHA-256 with MGF1-SHA-256 and the
//! longest salt the modulus allows; it is what offline clients sign with by default.
//! `Ed25519` keys are compact and fast to generate. Both travel as SubjectPublicKeyInfo
//! PEM, so the wire framing is the same for either.

use std::path::Path;
use std::str::FromStr;

use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
use ed25519_dalek::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use ed25519_dalek::{Signer, Verifier};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::signature::{RandomizedSigner, SignatureEncoding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Every PEM public key exported here ends with exactly this line.
pub const PUBLIC_KEY_PEM_TRAILER: &[u8] = b"-----END PUBLIC KEY-----\n";

pub const ED25519_SIGNATURE_LEN: usize = ed25519_dalek::SIGNATURE_LENGTH;

/// Modulus size of generated RSA keys unless told otherwise.
pub const DEFAULT_RSA_BITS: usize = 2048;

/// Smallest RSA modulus accepted for signing.
pub const MIN_RSA_BITS: usize = 1024;

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("failed to read key file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("key encoding failed: {0}")]
    Encoding(String),

    #[error("signing failed: {0}")]
    Signature(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown key scheme '{0}', expected 'rsa-pss' or 'ed25519'")]
pub struct ParseKeySchemeError(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KeyScheme {
    #[default]
    RsaPss,
    Ed25519,
}

impl KeyScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyScheme::RsaPss => "rsa-pss",
            KeyScheme::Ed25519 => "ed25519",
        }
    }

    /// Signature size for a key of `modulus_bits`. Ed25519 ignores the size.
    pub fn signature_len(&self, modulus_bits: usize) -> usize {
        match self {
            KeyScheme::RsaPss => modulus_bits.div_ceil(8),
            KeyScheme::Ed25519 => ED25519_SIGNATURE_LEN,
        }
    }
}

impl FromStr for KeyScheme {
    type Err = ParseKeySchemeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rsa-pss" | "rsa" => Ok(KeyScheme::RsaPss),
            "ed25519" => Ok(KeyScheme::Ed25519),
            other => Err(ParseKeySchemeError(other.to_string())),
        }
    }
}

/// Salt length used on both sides: the maximum for the modulus, `emLen - hLen - 2`.
fn pss_salt_len(modulus_bits: usize) -> usize {
    let em_len = modulus_bits.saturating_sub(1).div_ceil(8);
    em_len.saturating_sub(<Sha256 as Digest>::output_size() + 2)
}

enum Secret {
    Rsa(rsa::pss::SigningKey<Sha256>),
    Ed25519(ed25519_dalek::SigningKey),
}

/// A private key (authority or participant).
pub struct KeyPair {
    secret: Secret,
    public: PublicKey,
}

impl core::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

impl KeyPair {
    /// Fresh Ed25519 key pair from the OS RNG.
    pub fn generate() -> Self {
        let mut rng = rand::rngs::OsRng;
        Self::from_ed25519(ed25519_dalek::SigningKey::generate(&mut rng))
    }

    /// Fresh RSA key pair with a `bits`-bit modulus.
    pub fn generate_rsa(bits: usize) -> Result<Self, SigningError> {
        if bits < MIN_RSA_BITS {
            return Err(SigningError::InvalidPrivateKey(format!(
                "RSA modulus of {bits} bits is below {MIN_RSA_BITS}"
            )));
        }
        let mut rng = rand::rngs::OsRng;
        let key = RsaPrivateKey::new(&mut rng, bits)
            .map_err(|e| SigningError::InvalidPrivateKey(e.to_string()))?;
        Self::from_rsa(key)
    }

    pub fn generate_for(scheme: KeyScheme, rsa_bits: usize) -> Result<Self, SigningError> {
        match scheme {
            KeyScheme::RsaPss => Self::generate_rsa(rsa_bits),
            KeyScheme::Ed25519 => Ok(Self::generate()),
        }
    }

    /// Parse a PEM private key: PKCS#8 (RSA or Ed25519) or a PKCS#1 RSA key.
    pub fn from_pem(pem: &str) -> Result<Self, SigningError> {
        let pem = pem.trim();
        if let Ok(key) = RsaPrivateKey::from_pkcs8_pem(pem) {
            return Self::from_rsa(key);
        }
        if let Ok(key) = ed25519_dalek::SigningKey::from_pkcs8_pem(pem) {
            return Ok(Self::from_ed25519(key));
        }
        let key = RsaPrivateKey::from_pkcs1_pem(pem)
            .map_err(|e| SigningError::InvalidPrivateKey(e.to_string()))?;
        Self::from_rsa(key)
    }

    /// Load a PEM private key from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SigningError> {
        let path = path.as_ref();
        let pem = std::fs::read_to_string(path).map_err(|e| SigningError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_pem(&pem)
    }

    fn from_rsa(key: RsaPrivateKey) -> Result<Self, SigningError> {
        let bits = key.n().bits();
        if bits < MIN_RSA_BITS {
            return Err(SigningError::InvalidPrivateKey(format!(
                "RSA modulus of {bits} bits is below {MIN_RSA_BITS}"
            )));
        }
        let public = PublicKey::Rsa(key.to_public_key());
        let signing = rsa::pss::SigningKey::<Sha256>::new_with_salt_len(key, pss_salt_len(bits));
        Ok(Self {
            secret: Secret::Rsa(signing),
            public,
        })
    }

    fn from_ed25519(key: ed25519_dalek::SigningKey) -> Self {
        Self {
            public: PublicKey::Ed25519(key.verifying_key()),
            secret: Secret::Ed25519(key),
        }
    }

    pub fn scheme(&self) -> KeyScheme {
        self.public.scheme()
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Size in bytes of every signature this key produces.
    pub fn signature_len(&self) -> usize {
        self.public.signature_len()
    }

    pub fn to_pkcs8_pem(&self) -> Result<String, SigningError> {
        let pem = match &self.secret {
            Secret::Rsa(key) => key.to_pkcs8_pem(LineEnding::LF),
            Secret::Ed25519(key) => key.to_pkcs8_pem(LineEnding::LF),
        }
        .map_err(|e| SigningError::Encoding(e.to_string()))?;
        Ok(pem.as_str().to_owned())
    }

    /// SubjectPublicKeyInfo PEM of the public half, LF line endings.
    pub fn public_key_pem(&self) -> Result<String, SigningError> {
        self.public.to_pem()
    }

    /// Raw signature over `data`.
    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>, SigningError> {
        match &self.secret {
            Secret::Rsa(key) => {
                let mut rng = rand::rngs::OsRng;
                let signature = key
                    .try_sign_with_rng(&mut rng, data)
                    .map_err(|e| SigningError::Signature(e.to_string()))?;
                Ok(signature.to_vec())
            }
            Secret::Ed25519(key) => Ok(key.sign(data).to_bytes().to_vec()),
        }
    }
}

/// A participant's or the authority's public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    Rsa(RsaPublicKey),
    Ed25519(ed25519_dalek::VerifyingKey),
}

impl PublicKey {
    /// Decode a SubjectPublicKeyInfo PEM; surrounding whitespace is ignored.
    pub fn from_pem(pem: &[u8]) -> Result<Self, SigningError> {
        let text = core::str::from_utf8(pem)
            .map_err(|e| SigningError::InvalidPublicKey(e.to_string()))?
            .trim();
        if let Ok(key) = RsaPublicKey::from_public_key_pem(text) {
            return Ok(PublicKey::Rsa(key));
        }
        ed25519_dalek::VerifyingKey::from_public_key_pem(text)
            .map(PublicKey::Ed25519)
            .map_err(|e| SigningError::InvalidPublicKey(e.to_string()))
    }

    pub fn scheme(&self) -> KeyScheme {
        match self {
            PublicKey::Rsa(_) => KeyScheme::RsaPss,
            PublicKey::Ed25519(_) => KeyScheme::Ed25519,
        }
    }

    pub fn signature_len(&self) -> usize {
        match self {
            PublicKey::Rsa(key) => key.size(),
            PublicKey::Ed25519(_) => ED25519_SIGNATURE_LEN,
        }
    }

    pub fn to_pem(&self) -> Result<String, SigningError> {
        match self {
            PublicKey::Rsa(key) => key.to_public_key_pem(LineEnding::LF),
            PublicKey::Ed25519(key) => key.to_public_key_pem(LineEnding::LF),
        }
        .map_err(|e| SigningError::Encoding(e.to_string()))
    }

    /// Whether `signature` is this key's signature over `data`. Never errors.
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> bool {
        match self {
            PublicKey::Rsa(key) => {
                let Ok(signature) = rsa::pss::Signature::try_from(signature) else {
                    return false;
                };
                let salt_len = pss_salt_len(key.n().bits());
                rsa::pss::VerifyingKey::<Sha256>::new_with_salt_len(key.clone(), salt_len)
                    .verify(data, &signature)
                    .is_ok()
            }
            PublicKey::Ed25519(key) => match ed25519_dalek::Signature::from_slice(signature) {
                Ok(signature) => key.verify(data, &signature).is_ok(),
                Err(_) => false,
            },
        }
    }
}

/// Decode a PEM public key of either scheme.
pub fn decode_public_key_pem(pem: &[u8]) -> Result<PublicKey, SigningError> {
    PublicKey::from_pem(pem)
}
