use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ledgerpay_core::{Amount, ParticipantId, TransactionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Recharge,
    Transfer,
    Request,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Recharge => "RECHARGE",
            TransactionKind::Transfer => "TRANSFER",
            TransactionKind::Request => "REQUEST",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "RECHARGE" => Some(TransactionKind::Recharge),
            "TRANSFER" => Some(TransactionKind::Transfer),
            "REQUEST" => Some(TransactionKind::Request),
            _ => None,
        }
    }
}

/// Lifecycle of a `REQUEST`. `Approved` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestState {
    Pending,
    Approved,
    Rejected,
}

impl RequestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestState::Pending => "PENDING",
            RequestState::Approved => "APPROVED",
            RequestState::Rejected => "REJECTED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(RequestState::Pending),
            "APPROVED" => Some(RequestState::Approved),
            "REJECTED" => Some(RequestState::Rejected),
            _ => None,
        }
    }
}

/// Provenance of a record. Audit only; never affects settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Origin {
    Online,
    Offline,
}

impl Origin {
    pub fn is_offline(&self) -> bool {
        matches!(self, Origin::Offline)
    }
}

/// The sole entity of record.
///
/// Once stored a transaction is never deleted; `request_state` is the only field that
/// changes, and only while it is `Pending`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub kind: TransactionKind,
    /// Absent for `RECHARGE`. For a `REQUEST` this is the requester.
    pub sender_id: Option<ParticipantId>,
    /// Always present. For a `REQUEST` this is the payer asked for funds.
    pub receiver_id: ParticipantId,
    pub amount: Amount,
    /// Server time for online records; client-supplied (untrusted) for offline ones.
    pub timestamp: DateTime<Utc>,
    /// Server-assigned insertion time, non-decreasing across inserts.
    pub recorded_at: DateTime<Utc>,
    pub request_state: Option<RequestState>,
    pub origin: Origin,
}

impl Transaction {
    pub fn recharge(receiver: ParticipantId, amount: Amount, now: DateTime<Utc>) -> Self {
        Self::online(TransactionKind::Recharge, None, receiver, amount, now)
    }

    pub fn transfer(
        sender: ParticipantId,
        receiver: ParticipantId,
        amount: Amount,
        now: DateTime<Utc>,
    ) -> Self {
        Self::online(TransactionKind::Transfer, Some(sender), receiver, amount, now)
    }

    /// `requester` asks `payer` for `amount`.
    pub fn request(
        requester: ParticipantId,
        payer: ParticipantId,
        amount: Amount,
        now: DateTime<Utc>,
    ) -> Self {
        let mut tx = Self::online(TransactionKind::Request, Some(requester), payer, amount, now);
        tx.request_state = Some(RequestState::Pending);
        tx
    }

    /// A settled transfer replayed from an offline ledger.
    pub fn offline_transfer(
        id: TransactionId,
        sender: ParticipantId,
        receiver: ParticipantId,
        amount: Amount,
        client_timestamp: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            kind: TransactionKind::Transfer,
            sender_id: Some(sender),
            receiver_id: receiver,
            amount,
            timestamp: client_timestamp,
            recorded_at: now,
            request_state: None,
            origin: Origin::Offline,
        }
    }

    fn online(
        kind: TransactionKind,
        sender: Option<ParticipantId>,
        receiver: ParticipantId,
        amount: Amount,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            kind,
            sender_id: sender,
            receiver_id: receiver,
            amount,
            timestamp: now,
            recorded_at: now,
            request_state: None,
            origin: Origin::Online,
        }
    }

    pub fn involves(&self, participant: &ParticipantId) -> bool {
        &self.receiver_id == participant || self.sender_id.as_ref() == Some(participant)
    }

    /// `REQUEST` rows never move funds themselves, whatever their state.
    pub fn affects_balance(&self) -> bool {
        self.kind != TransactionKind::Request
    }

    pub fn is_pending_request(&self) -> bool {
        self.kind == TransactionKind::Request && self.request_state == Some(RequestState::Pending)
    }
}
