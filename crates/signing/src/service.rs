//! Signing service: sign / verify / attest.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use ledgerpay_core::LedgerError;

use crate::attestation::{BalanceAttestation, attestation_message, quote_amount, quote_time};
use crate::keys::{KeyPair, KeyScheme, PublicKey, SigningError, decode_public_key_pem};

impl From<SigningError> for LedgerError {
    fn from(value: SigningError) -> Self {
        LedgerError::Signing(value.to_string())
    }
}

/// Cheap-to-clone handle over the authority key pair.
#[derive(Debug, Clone)]
pub struct SigningService {
    authority: Arc<KeyPair>,
    authority_public_key_pem: Arc<str>,
}

impl SigningService {
    pub fn new(authority: KeyPair) -> Result<Self, SigningError> {
        let pem = authority.public_key_pem()?;
        tracing::info!(
            scheme = authority.scheme().as_str(),
            signature_len = authority.signature_len(),
            "authority key ready"
        );
        Ok(Self {
            authority: Arc::new(authority),
            authority_public_key_pem: Arc::from(pem),
        })
    }

    /// The authority's public key, as published to participants.
    pub fn authority_public_key_pem(&self) -> &str {
        &self.authority_public_key_pem
    }

    pub fn authority_public_key(&self) -> &PublicKey {
        self.authority.public_key()
    }

    pub fn scheme(&self) -> KeyScheme {
        self.authority.scheme()
    }

    /// Size of every authority signature; fixes the certificate segment of offline entries.
    pub fn signature_len(&self) -> usize {
        self.authority.signature_len()
    }

    /// Sign with the authority key.
    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>, SigningError> {
        self.authority.sign(data)
    }

    /// Sign with a supplied key instead of the authority key.
    pub fn sign_with(&self, data: &[u8], key: &KeyPair) -> Result<Vec<u8>, SigningError> {
        key.sign(data)
    }

    /// Verify against the authority key. Never errors; a mismatch is `false`.
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> bool {
        self.authority.public_key().verify(data, signature)
    }

    /// Verify against a supplied public key.
    pub fn verify_with(&self, data: &[u8], signature: &[u8], key: &PublicKey) -> bool {
        key.verify(data, signature)
    }

    /// Verify against a PEM-encoded public key; an undecodable key is a mismatch.
    pub fn verify_with_pem(&self, data: &[u8], signature: &[u8], public_key_pem: &[u8]) -> bool {
        match decode_public_key_pem(public_key_pem) {
            Ok(key) => key.verify(data, signature),
            Err(_) => false,
        }
    }

    /// Certify a participant's public key: the authority signs the exact PEM bytes.
    ///
    /// The result is the `public_key_signature` segment of an offline ledger entry.
    pub fn certify_key(&self, public_key_pem: &[u8]) -> Result<Vec<u8>, SigningError> {
        self.sign(public_key_pem)
    }

    /// Quote `amount` at the current instant.
    pub fn attest_balance(&self, amount: Decimal) -> Result<BalanceAttestation, SigningError> {
        self.attest_balance_at(amount, Utc::now())
    }

    pub fn attest_balance_at(
        &self,
        amount: Decimal,
        at: DateTime<Utc>,
    ) -> Result<BalanceAttestation, SigningError> {
        let amount = quote_amount(amount);
        let timestamp = quote_time(at);
        let signature = self.sign(&attestation_message(amount, timestamp))?;
        tracing::debug!(%amount, %timestamp, "balance attested");
        Ok(BalanceAttestation {
            amount,
            timestamp,
            signature: BASE64.encode(signature),
        })
    }

    /// An attestation holding more precision than was signed does not verify.
    pub fn verify_attestation(&self, attestation: &BalanceAttestation) -> bool {
        if quote_amount(attestation.amount) != attestation.amount {
            return false;
        }
        let Ok(signature) = BASE64.decode(&attestation.signature) else {
            return false;
        };
        self.verify(
            &attestation_message(attestation.amount, attestation.timestamp),
            &signature,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::MIN_RSA_BITS;
    use rust_decimal_macros::dec;

    fn service() -> SigningService {
        SigningService::new(KeyPair::generate()).unwrap()
    }

    #[test]
    fn authority_signature_verifies_and_tampering_does_not() {
        let svc = service();
        let sig = svc.sign(b"payload").unwrap();
        assert!(svc.verify(b"payload", &sig));
        assert!(!svc.verify(b"payloaD", &sig));

        let mut bad = sig.clone();
        bad[0] ^= 0x01;
        assert!(!svc.verify(b"payload", &bad));
    }

    #[test]
    fn verify_never_panics_on_wrong_length() {
        let svc = service();
        assert!(!svc.verify(b"payload", &[]));
        assert!(!svc.verify(b"payload", &[0u8; 3]));
    }

    #[test]
    fn supplied_key_signs_and_verifies_via_pem() {
        let svc = service();
        let participant = KeyPair::generate();
        let pem = participant.public_key_pem().unwrap();

        let sig = svc.sign_with(b"entry", &participant).unwrap();
        assert!(svc.verify_with_pem(b"entry", &sig, pem.as_bytes()));
        assert!(svc.verify_with(b"entry", &sig, participant.public_key()));
        // not the authority's signature
        assert!(!svc.verify(b"entry", &sig));
        assert!(!svc.verify_with_pem(b"entry", &sig, b"garbage"));
    }

    #[test]
    fn certified_key_verifies_under_authority() {
        let svc = service();
        let pem = KeyPair::generate().public_key_pem().unwrap();
        let cert = svc.certify_key(pem.as_bytes()).unwrap();
        assert!(svc.verify(pem.as_bytes(), &cert));
    }

    #[test]
    fn rsa_authority_certifies_and_attests() {
        let svc = SigningService::new(KeyPair::generate_rsa(MIN_RSA_BITS).unwrap()).unwrap();
        assert_eq!(svc.scheme(), KeyScheme::RsaPss);
        assert_eq!(svc.signature_len(), 128);

        let participant = KeyPair::generate();
        let pem = participant.public_key_pem().unwrap();
        let cert = svc.certify_key(pem.as_bytes()).unwrap();
        assert_eq!(cert.len(), svc.signature_len());
        assert!(svc.verify(pem.as_bytes(), &cert));

        let att = svc.attest_balance(dec!(12.5)).unwrap();
        assert!(svc.verify_attestation(&att));
    }

    #[test]
    fn attestation_round_trips_through_json() {
        let svc = service();
        let att = svc.attest_balance(dec!(700)).unwrap();
        assert!(svc.verify_attestation(&att));

        let json = serde_json::to_string(&att).unwrap();
        let back: BalanceAttestation = serde_json::from_str(&json).unwrap();
        assert!(svc.verify_attestation(&back));
    }

    #[test]
    fn altered_attestation_is_rejected() {
        let svc = service();
        let mut att = svc.attest_balance(dec!(50)).unwrap();
        att.amount = dec!(5000);
        assert!(!svc.verify_attestation(&att));

        let mut stale = svc.attest_balance(dec!(50)).unwrap();
        stale.timestamp = stale.timestamp - chrono::Duration::seconds(60);
        assert!(!svc.verify_attestation(&stale));
    }

    #[test]
    fn attested_amount_is_the_signed_amount() {
        let svc = service();
        let att = svc.attest_balance(dec!(1.004)).unwrap();
        assert_eq!(att.amount, dec!(1.00));
        assert!(svc.verify_attestation(&att));

        // renders to the same signed text but claims a different value
        let mut edited = att.clone();
        edited.amount = dec!(1.001);
        assert!(!svc.verify_attestation(&edited));
    }

    #[test]
    fn other_authority_cannot_forge_attestation() {
        let att = service().attest_balance(dec!(1)).unwrap();
        assert!(!service().verify_attestation(&att));
    }

    #[test]
    fn signing_errors_map_to_ledger_errors() {
        let err: LedgerError = SigningError::Signature("rng".into()).into();
        assert_eq!(err, LedgerError::Signing("signing failed: rng".into()));
        assert!(!err.is_retryable());
    }
}
