//! Per-entry verification chain.
//!
//! Checks run in a fixed order and the first failure stops the batch:
//!
//! 1. the caller is the entry's sender or receiver
//! 2. the embedded key is not the caller's own on-file key
//! 3. the authority certified the embedded key
//! 4. the embedded key signed the payload bytes

use ledgerpay_auth::Caller;
use ledgerpay_core::ParticipantId;
use ledgerpay_signing::{SigningService, decode_public_key_pem};

use crate::frame::OfflineEntry;
use crate::rejection::Rejection;

pub struct EntryVerifier<'a> {
    signing: &'a SigningService,
    caller: &'a Caller,
}

impl<'a> EntryVerifier<'a> {
    pub fn new(signing: &'a SigningService, caller: &'a Caller) -> Self {
        Self { signing, caller }
    }

    pub fn verify(&self, entry: &OfflineEntry) -> Result<(), Rejection> {
        let index = entry.index;

        if !entry.payload.involves(self.caller.participant_id()) {
            return Err(Rejection::NotAParty { index });
        }

        if same_public_key(&entry.public_key, self.caller.public_key_pem().as_bytes()) {
            return Err(Rejection::OwnKey { index });
        }

        if !self.signing.verify(&entry.public_key, &entry.public_key_signature) {
            return Err(Rejection::UncertifiedKey { index });
        }

        if !self
            .signing
            .verify_with_pem(&entry.raw_data, &entry.signature, &entry.public_key)
        {
            return Err(Rejection::BadSignature { index });
        }

        Ok(())
    }

    /// The participant on the other side of `entry` from the caller.
    pub fn counterparty<'e>(&self, entry: &'e OfflineEntry) -> &'e ParticipantId {
        if self.caller.is(&entry.payload.receiver_id) {
            &entry.payload.sender_id
        } else {
            &entry.payload.receiver_id
        }
    }
}

/// Two PEM blobs name the same key if their bytes match or they decode to the same key.
pub fn same_public_key(a: &[u8], b: &[u8]) -> bool {
    if a == b {
        return true;
    }
    match (decode_public_key_pem(a), decode_public_key_pem(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FrameLayout, OfflinePayload, author_entry, encode_batch, parse_batch};
    use chrono::Utc;
    use ledgerpay_core::{Amount, TransactionId};
    use ledgerpay_signing::{ED25519_SIGNATURE_LEN as SIGNATURE_LEN, KeyPair, MIN_RSA_BITS};
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    struct Party {
        id: ParticipantId,
        keys: KeyPair,
        cert: Vec<u8>,
    }

    impl Party {
        fn new(name: &str, authority: &SigningService) -> Self {
            Self::with_keys(name, KeyPair::generate(), authority)
        }

        fn with_keys(name: &str, keys: KeyPair, authority: &SigningService) -> Self {
            let cert = authority.certify_key(keys.public_key_pem().unwrap().as_bytes()).unwrap();
            Self {
                id: ParticipantId::parse(name).unwrap(),
                keys,
                cert,
            }
        }

        fn caller(&self) -> Caller {
            Caller::new(self.id.clone(), self.keys.public_key_pem().unwrap())
        }
    }

    fn payload(from: &Party, to: &Party) -> OfflinePayload {
        OfflinePayload {
            id: TransactionId::new(),
            sender_id: from.id.clone(),
            receiver_id: to.id.clone(),
            amount: Amount::new(dec!(12.5)).unwrap(),
            timestamp: Utc::now(),
        }
    }

    fn ed25519_layout() -> FrameLayout {
        FrameLayout::new(SIGNATURE_LEN, SIGNATURE_LEN)
    }

    fn parse_one(bytes: &[u8]) -> OfflineEntry {
        parse_batch(bytes, ed25519_layout()).unwrap().remove(0)
    }

    #[test]
    fn counterparty_signed_entry_verifies_for_either_side() {
        let authority = SigningService::new(KeyPair::generate()).unwrap();
        let alice = Party::new("alice", &authority);
        let bob = Party::new("bob", &authority);

        // bob keeps the entry alice signed, and vice versa
        let signed_by_alice = parse_one(&author_entry(&payload(&alice, &bob), &alice.keys, &alice.cert).unwrap());
        let signed_by_bob = parse_one(&author_entry(&payload(&alice, &bob), &bob.keys, &bob.cert).unwrap());

        let bob_caller = bob.caller();
        let verifier = EntryVerifier::new(&authority, &bob_caller);
        assert_eq!(verifier.verify(&signed_by_alice), Ok(()));
        assert_eq!(verifier.counterparty(&signed_by_alice), &alice.id);

        let alice_caller = alice.caller();
        let verifier = EntryVerifier::new(&authority, &alice_caller);
        assert_eq!(verifier.verify(&signed_by_bob), Ok(()));
        assert_eq!(verifier.counterparty(&signed_by_bob), &bob.id);
    }

    #[test]
    fn outsiders_cannot_submit() {
        let authority = SigningService::new(KeyPair::generate()).unwrap();
        let (alice, bob, eve) = (
            Party::new("alice", &authority),
            Party::new("bob", &authority),
            Party::new("eve", &authority),
        );
        let entry = parse_one(&author_entry(&payload(&alice, &bob), &alice.keys, &alice.cert).unwrap());
        let eve_caller = eve.caller();
        assert_eq!(
            EntryVerifier::new(&authority, &eve_caller).verify(&entry),
            Err(Rejection::NotAParty { index: 0 })
        );
    }

    #[test]
    fn own_key_cannot_impersonate_counterparty() {
        let authority = SigningService::new(KeyPair::generate()).unwrap();
        let (alice, bob) = (Party::new("alice", &authority), Party::new("bob", &authority));
        // bob signs "alice pays bob" himself
        let entry = parse_one(&author_entry(&payload(&alice, &bob), &bob.keys, &bob.cert).unwrap());
        let bob_caller = bob.caller();
        assert_eq!(
            EntryVerifier::new(&authority, &bob_caller).verify(&entry),
            Err(Rejection::OwnKey { index: 0 })
        );
    }

    #[test]
    fn self_issued_certificate_is_rejected() {
        let authority = SigningService::new(KeyPair::generate()).unwrap();
        let rogue_authority = SigningService::new(KeyPair::generate()).unwrap();
        let (alice, bob) = (Party::new("alice", &rogue_authority), Party::new("bob", &authority));
        let entry = parse_one(&author_entry(&payload(&alice, &bob), &alice.keys, &alice.cert).unwrap());
        let bob_caller = bob.caller();
        assert_eq!(
            EntryVerifier::new(&authority, &bob_caller).verify(&entry),
            Err(Rejection::UncertifiedKey { index: 0 })
        );
    }

    #[test]
    fn rsa_pss_entries_verify_with_modulus_sized_segments() {
        let authority = SigningService::new(KeyPair::generate_rsa(MIN_RSA_BITS).unwrap()).unwrap();
        let alice = Party::with_keys("alice", KeyPair::generate_rsa(MIN_RSA_BITS).unwrap(), &authority);
        let bob = Party::new("bob", &authority);

        let layout = FrameLayout::for_authority(&authority, alice.keys.signature_len());
        assert_eq!(layout, FrameLayout::new(128, 128));

        let bytes = author_entry(&payload(&alice, &bob), &alice.keys, &alice.cert).unwrap();
        let entry = parse_batch(&bytes, layout).unwrap().remove(0);
        let bob_caller = bob.caller();
        assert_eq!(EntryVerifier::new(&authority, &bob_caller).verify(&entry), Ok(()));

        // the same bytes framed as Ed25519 segments fall apart
        let misframed = parse_batch(&bytes, ed25519_layout())
            .and_then(|entries| entries.iter().try_for_each(|e| EntryVerifier::new(&authority, &bob_caller).verify(e)));
        assert!(misframed.is_err());
    }

    #[test]
    fn same_public_key_ignores_trailing_whitespace() {
        let pem = KeyPair::generate().public_key_pem().unwrap();
        let padded = format!("{pem}\n\n");
        assert!(same_public_key(pem.as_bytes(), padded.as_bytes()));
        let other = KeyPair::generate().public_key_pem().unwrap();
        assert!(!same_public_key(pem.as_bytes(), other.as_bytes()));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            ..ProptestConfig::default()
        })]

        /// Flipping any bit of a signature, the key certificate or the payload breaks
        /// verification (or parsing) of the whole batch.
        #[test]
        fn any_bit_flip_is_detected(segment in 0usize..3, offset in any::<prop::sample::Index>(), bit in 0u8..8) {
            let authority = SigningService::new(KeyPair::generate()).unwrap();
            let (alice, bob) = (Party::new("alice", &authority), Party::new("bob", &authority));
            let good = author_entry(&payload(&alice, &bob), &alice.keys, &alice.cert).unwrap();
            let pem_len = alice.keys.public_key_pem().unwrap().len();

            let (start, len) = match segment {
                0 => (0, SIGNATURE_LEN),
                1 => (SIGNATURE_LEN, SIGNATURE_LEN),
                _ => (2 * SIGNATURE_LEN + pem_len, good.len() - 2 * SIGNATURE_LEN - pem_len),
            };
            let mut tampered = good.clone();
            tampered[start + offset.index(len)] ^= 1 << bit;

            let batch = encode_batch([tampered]);
            let bob_caller = bob.caller();
            let verifier = EntryVerifier::new(&authority, &bob_caller);
            let outcome = parse_batch(&batch, ed25519_layout())
                .and_then(|entries| entries.iter().try_for_each(|e| verifier.verify(e)));
            prop_assert!(outcome.is_err());
        }
    }
}
