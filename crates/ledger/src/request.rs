//! Request-for-funds state machine.
//!
//! ```text
//! PENDING ──approve──▶ APPROVED
//!    └─────reject───▶ REJECTED
//! ```
//! Each request leaves `PENDING` exactly once. The funds of an approval move through a
//! separate settling `TRANSFER` (payer → requester) written in the same unit of work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ledgerpay_core::{LedgerError, ParticipantId};

use crate::{RequestState, Transaction, TransactionKind};

/// The payer's answer to a request. Only terminal states can be chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Approved,
    Rejected,
}

impl From<Decision> for RequestState {
    fn from(value: Decision) -> Self {
        match value {
            Decision::Approved => RequestState::Approved,
            Decision::Rejected => RequestState::Rejected,
        }
    }
}

/// Only the payer may settle, and only a request.
pub fn authorize_settlement(request: &Transaction, actor: &ParticipantId) -> Result<(), LedgerError> {
    if &request.receiver_id != actor {
        return Err(LedgerError::PermissionDenied);
    }
    if request.kind != TransactionKind::Request {
        return Err(LedgerError::invalid_state(format!(
            "{} is a {}, not a request",
            request.id,
            request.kind.as_str()
        )));
    }
    Ok(())
}

/// Compute the state a decision leads to.
pub fn next_state(current: Option<RequestState>, decision: Decision) -> Result<RequestState, LedgerError> {
    match current {
        Some(RequestState::Pending) => Ok(decision.into()),
        Some(state) => Err(LedgerError::invalid_state(format!(
            "request already {}",
            state.as_str()
        ))),
        None => Err(LedgerError::invalid_state("request has no state")),
    }
}

/// The transfer that carries an approved request's funds from payer to requester.
pub fn settlement_transfer(request: &Transaction, now: DateTime<Utc>) -> Result<Transaction, LedgerError> {
    let requester = request
        .sender_id
        .clone()
        .ok_or_else(|| LedgerError::invalid_state("request has no requester"))?;
    Ok(Transaction::transfer(
        request.receiver_id.clone(),
        requester,
        request.amount,
        now,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerpay_core::Amount;
    use rust_decimal_macros::dec;

    fn pid(s: &str) -> ParticipantId {
        ParticipantId::parse(s).unwrap()
    }

    fn pending() -> Transaction {
        Transaction::request(pid("alice"), pid("bob"), Amount::new(dec!(50)).unwrap(), Utc::now())
    }

    #[test]
    fn only_the_payer_may_settle() {
        let req = pending();
        assert!(authorize_settlement(&req, &pid("bob")).is_ok());
        assert_eq!(
            authorize_settlement(&req, &pid("alice")),
            Err(LedgerError::PermissionDenied)
        );
    }

    #[test]
    fn transfers_cannot_be_settled() {
        let tx = Transaction::transfer(pid("alice"), pid("bob"), Amount::new(dec!(1)).unwrap(), Utc::now());
        assert!(matches!(
            authorize_settlement(&tx, &pid("bob")),
            Err(LedgerError::InvalidState(_))
        ));
    }

    #[test]
    fn pending_moves_to_terminal_exactly_once() {
        assert_eq!(
            next_state(Some(RequestState::Pending), Decision::Approved),
            Ok(RequestState::Approved)
        );
        assert_eq!(
            next_state(Some(RequestState::Pending), Decision::Rejected),
            Ok(RequestState::Rejected)
        );
        for terminal in [RequestState::Approved, RequestState::Rejected] {
            for decision in [Decision::Approved, Decision::Rejected] {
                assert!(matches!(
                    next_state(Some(terminal), decision),
                    Err(LedgerError::InvalidState(_))
                ));
            }
        }
    }

    #[test]
    fn settlement_moves_funds_from_payer_to_requester() {
        let req = pending();
        let transfer = settlement_transfer(&req, Utc::now()).unwrap();
        assert_eq!(transfer.kind, TransactionKind::Transfer);
        assert_eq!(transfer.sender_id, Some(pid("bob")));
        assert_eq!(transfer.receiver_id, pid("alice"));
        assert_eq!(transfer.amount, req.amount);
        assert_ne!(transfer.id, req.id);
    }
}
