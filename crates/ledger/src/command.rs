//! Online payment commands.
//!
//! A payment call is either a new transaction or a response to a pending request. The
//! caller states which one explicitly through the `operation` tag.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ledgerpay_core::{Amount, LedgerError, ParticipantId, TransactionId};

use crate::{Decision, Transaction, TransactionKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum PaymentCommand {
    Create(NewTransaction),
    Respond(RequestResponse),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub kind: TransactionKind,
    #[serde(default)]
    pub receiver_id: Option<ParticipantId>,
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestResponse {
    pub id: TransactionId,
    pub decision: Decision,
}

impl NewTransaction {
    pub fn recharge(amount: Amount) -> Self {
        Self {
            kind: TransactionKind::Recharge,
            receiver_id: None,
            amount,
        }
    }

    pub fn transfer(receiver: ParticipantId, amount: Amount) -> Self {
        Self {
            kind: TransactionKind::Transfer,
            receiver_id: Some(receiver),
            amount,
        }
    }

    pub fn request(payer: ParticipantId, amount: Amount) -> Self {
        Self {
            kind: TransactionKind::Request,
            receiver_id: Some(payer),
            amount,
        }
    }

    /// Shape the record `actor` is asking for. Existence and solvency are checked by
    /// the caller against the store.
    pub fn into_transaction(
        self,
        actor: &ParticipantId,
        now: DateTime<Utc>,
    ) -> Result<Transaction, LedgerError> {
        match self.kind {
            TransactionKind::Recharge => match self.receiver_id {
                Some(receiver) if &receiver != actor => Err(LedgerError::PermissionDenied),
                _ => Ok(Transaction::recharge(actor.clone(), self.amount, now)),
            },
            kind => {
                let receiver = self.receiver_id.ok_or_else(|| {
                    LedgerError::validation(format!("receiver_id is required for {}", kind.as_str()))
                })?;
                if &receiver == actor {
                    return Err(LedgerError::validation("receiver must differ from sender"));
                }
                Ok(match kind {
                    TransactionKind::Request => {
                        Transaction::request(actor.clone(), receiver, self.amount, now)
                    }
                    _ => Transaction::transfer(actor.clone(), receiver, self.amount, now),
                })
            }
        }
    }
}
