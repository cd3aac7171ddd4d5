use serde::{Deserialize, Serialize};

use ledgerpay_core::ParticipantId;

/// A participant as known to the identity store.
///
/// `public_key_pem` is the participant's on-file public key (SubjectPublicKeyInfo PEM),
/// the one the authority certified for offline signing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub public_key_pem: String,
}

impl Participant {
    pub fn new(id: ParticipantId, public_key_pem: impl Into<String>) -> Self {
        Self {
            id,
            public_key_pem: public_key_pem.into(),
        }
    }
}

/// The authenticated caller of a ledger operation.
///
/// Supplied by the auth layer after token validation; immutable for the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    participant_id: ParticipantId,
    public_key_pem: String,
}

impl Caller {
    pub fn new(participant_id: ParticipantId, public_key_pem: impl Into<String>) -> Self {
        Self {
            participant_id,
            public_key_pem: public_key_pem.into(),
        }
    }

    pub fn participant_id(&self) -> &ParticipantId {
        &self.participant_id
    }

    /// The caller's own on-file public key.
    pub fn public_key_pem(&self) -> &str {
        &self.public_key_pem
    }

    pub fn is(&self, participant: &ParticipantId) -> bool {
        &self.participant_id == participant
    }
}

impl From<&Participant> for Caller {
    fn from(value: &Participant) -> Self {
        Self::new(value.id.clone(), value.public_key_pem.clone())
    }
}
