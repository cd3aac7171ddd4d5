//! Shared fixtures: an in-memory ledger with real keys. Ed25519 unless a test brings its
//! own authority.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{SubsecRound, Utc};
use rust_decimal::Decimal;

use ledgerpay_auth::{Caller, InMemoryParticipantDirectory, Participant};
use ledgerpay_core::{Amount, ParticipantId, TransactionId};
use ledgerpay_infra::{InMemoryLedgerStore, LedgerService, Reconciler};
use ledgerpay_ledger::NewTransaction;
use ledgerpay_offline::{FrameLayout, OfflinePayload, author_entry};
use ledgerpay_signing::{ED25519_SIGNATURE_LEN, KeyPair, SigningService};

pub type Directory = Arc<InMemoryParticipantDirectory>;

pub struct Member {
    pub caller: Caller,
    pub keys: KeyPair,
    /// Authority signature over `keys`' public key.
    pub certificate: Vec<u8>,
}

impl Member {
    pub fn id(&self) -> &ParticipantId {
        self.caller.participant_id()
    }
}

pub struct World {
    pub authority: SigningService,
    pub directory: Directory,
    pub store: InMemoryLedgerStore,
    pub ledger: LedgerService<InMemoryLedgerStore, Directory>,
    pub reconciler: Reconciler<InMemoryLedgerStore, Directory>,
}

impl World {
    pub fn new() -> Self {
        Self::with_authority(KeyPair::generate(), ED25519_SIGNATURE_LEN)
    }

    /// A ledger certified by `authority`, accepting author signatures of the given size.
    pub fn with_authority(authority: KeyPair, author_signature_len: usize) -> Self {
        let authority = SigningService::new(authority).unwrap();
        let layout = FrameLayout::for_authority(&authority, author_signature_len);
        let directory: Directory = Arc::new(InMemoryParticipantDirectory::new());
        let store = InMemoryLedgerStore::new();
        Self {
            ledger: LedgerService::new(store.clone(), Arc::clone(&directory), authority.clone()),
            reconciler: Reconciler::new(
                store.clone(),
                Arc::clone(&directory),
                authority.clone(),
                layout,
            ),
            authority,
            directory,
            store,
        }
    }

    /// Register a participant with a freshly certified key.
    pub fn join(&self, name: &str) -> Member {
        let keys = KeyPair::generate();
        let pem = keys.public_key_pem().unwrap();
        Member {
            certificate: self.authority.certify_key(pem.as_bytes()).unwrap(),
            caller: self.register(name, &pem),
            keys,
        }
    }

    /// Put `name` on file with an existing public key.
    pub fn register(&self, name: &str, public_key_pem: &str) -> Caller {
        let id = ParticipantId::parse(name).unwrap();
        self.directory
            .register(Participant::new(id.clone(), public_key_pem.to_string()))
            .unwrap();
        Caller::new(id, public_key_pem.to_string())
    }

    pub async fn recharge(&self, member: &Member, value: Decimal) {
        self.ledger
            .create_transaction(NewTransaction::recharge(amount(value)), &member.caller)
            .await
            .unwrap();
    }

    pub async fn balance(&self, member: &Member) -> Decimal {
        self.ledger.balance(member.id()).await.unwrap()
    }
}

pub fn amount(value: Decimal) -> Amount {
    Amount::new(value).unwrap()
}

pub fn payment(id: &TransactionId, from: &Member, to: &Member, value: Decimal) -> OfflinePayload {
    OfflinePayload {
        id: id.clone(),
        sender_id: from.id().clone(),
        receiver_id: to.id().clone(),
        amount: amount(value),
        // the wire form carries microseconds
        timestamp: Utc::now().trunc_subsecs(6),
    }
}

/// One wire entry for `payload`, signed by `author`.
pub fn signed(payload: &OfflinePayload, author: &Member) -> Vec<u8> {
    author_entry(payload, &author.keys, &author.certificate).unwrap()
}
