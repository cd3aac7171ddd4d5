//! Online ledger operations.
//!
//! `LedgerService` is the orchestration layer between an (external) request handler and
//! the store. Each operation follows the same shape:
//!
//! ```text
//! command ─▶ pure shaping/authorization (ledgerpay-ledger)
//!         ─▶ open unit ─▶ read log ─▶ decide ─▶ write ─▶ re-derive touched balances ─▶ commit
//!         ─▶ receipt with a signed balance quote
//! ```
//!
//! Any error between `begin` and `commit` drops the unit, which discards its writes. A
//! unit that lost a serialization race is run again, a bounded number of times.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use ledgerpay_auth::{Caller, ParticipantDirectory};
use ledgerpay_core::{LedgerError, LedgerResult, ParticipantId, TransactionId};
use ledgerpay_ledger::{
    Decision, NewTransaction, PaymentCommand, RequestResponse, Transaction, TransactionKind,
    authorize_settlement, ensure_covers, next_state, settlement_transfer,
};
use ledgerpay_signing::{BalanceAttestation, SigningService};

use crate::ledger_store::{LedgerStore, Page};
use crate::retry::retry_on_conflict;

/// Result of a successful online payment call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    /// The created record, or the settled request with its new state.
    pub transaction: Transaction,
    /// The transfer that moved the funds of an approved request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settlement: Option<Transaction>,
    /// The actor's balance right after the commit.
    pub balance: BalanceAttestation,
}

/// Reusable entry point for online ledger operations.
///
/// Generic over the store and the identity directory so tests run against the
/// in-memory implementations and production against Postgres.
#[derive(Debug, Clone)]
pub struct LedgerService<S, D> {
    store: S,
    directory: D,
    signing: SigningService,
}

impl<S, D> LedgerService<S, D> {
    pub fn new(store: S, directory: D, signing: SigningService) -> Self {
        Self {
            store,
            directory,
            signing,
        }
    }

    pub fn signing(&self) -> &SigningService {
        &self.signing
    }

    /// PEM public key clients use to check attestations and key certificates.
    pub fn authority_public_key_pem(&self) -> &str {
        self.signing.authority_public_key_pem()
    }

    /// Attest an arbitrary amount at the current instant.
    pub fn sign_balance(&self, amount: Decimal) -> LedgerResult<BalanceAttestation> {
        Ok(self.signing.attest_balance(amount)?)
    }
}

impl<S, D> LedgerService<S, D>
where
    S: LedgerStore,
    D: ParticipantDirectory,
{
    /// Dispatch a payment command on its declared operation.
    pub async fn handle(&self, command: PaymentCommand, caller: &Caller) -> LedgerResult<PaymentReceipt> {
        match command {
            PaymentCommand::Create(new) => self.create_transaction(new, caller).await,
            PaymentCommand::Respond(response) => self.settle_request(response, caller).await,
        }
    }

    /// Record a recharge, a transfer or a new request on behalf of `caller`.
    ///
    /// - transfers are checked against the caller's balance inside the unit
    /// - a request is refused while the same (requester, payer) pair has one pending
    #[instrument(
        skip(self, new, caller),
        fields(actor = %caller.participant_id(), kind = new.kind.as_str()),
        err
    )]
    pub async fn create_transaction(
        &self,
        new: NewTransaction,
        caller: &Caller,
    ) -> LedgerResult<PaymentReceipt> {
        let actor = caller.participant_id();
        let transaction = new.into_transaction(actor, Utc::now())?;

        if transaction.kind != TransactionKind::Recharge {
            self.require_participant(&transaction.receiver_id).await?;
        }

        let (stored, balance) =
            retry_on_conflict("create_transaction", || self.append(&transaction, actor)).await?;

        info!(
            transaction_id = %stored.id,
            kind = stored.kind.as_str(),
            amount = %stored.amount.value(),
            "transaction committed"
        );

        Ok(PaymentReceipt {
            transaction: stored,
            settlement: None,
            balance: self.signing.attest_balance(balance)?,
        })
    }

    /// One attempt at writing `transaction`: checks, insert and commit in a single unit.
    async fn append(
        &self,
        transaction: &Transaction,
        actor: &ParticipantId,
    ) -> LedgerResult<(Transaction, Decimal)> {
        let mut unit = self.store.begin().await?;
        match transaction.kind {
            TransactionKind::Transfer => {
                let available = unit.balance(actor).await?;
                ensure_covers(available, transaction.amount)?;
            }
            TransactionKind::Request => {
                if unit.has_pending_request(actor, &transaction.receiver_id).await? {
                    return Err(LedgerError::invalid_state(format!(
                        "a request to {} is already pending",
                        transaction.receiver_id
                    )));
                }
            }
            TransactionKind::Recharge => {}
        }

        let stored = unit.insert(transaction.clone()).await?;
        if stored.kind == TransactionKind::Transfer {
            unit.balance(&stored.receiver_id).await?;
        }
        let balance = unit.balance(actor).await?;
        unit.commit().await?;
        Ok((stored, balance))
    }

    /// Approve or reject a pending request. Only the payer may answer.
    ///
    /// Approval re-checks the payer's balance at this instant; on shortfall nothing is
    /// written and the request stays pending. The state change and the settling
    /// transfer commit together.
    #[instrument(
        skip(self, response, caller),
        fields(actor = %caller.participant_id(), request_id = %response.id),
        err
    )]
    pub async fn settle_request(
        &self,
        response: RequestResponse,
        caller: &Caller,
    ) -> LedgerResult<PaymentReceipt> {
        let actor = caller.participant_id();
        let (request, settlement, balance) =
            retry_on_conflict("settle_request", || self.settle_once(&response, actor)).await?;

        if let Some(state) = request.request_state {
            info!(state = state.as_str(), "request settled");
        }

        Ok(PaymentReceipt {
            transaction: request,
            settlement,
            balance: self.signing.attest_balance(balance)?,
        })
    }

    async fn settle_once(
        &self,
        response: &RequestResponse,
        actor: &ParticipantId,
    ) -> LedgerResult<(Transaction, Option<Transaction>, Decimal)> {
        let mut unit = self.store.begin().await?;

        let mut request = unit
            .get(&response.id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("transaction {}", response.id)))?;
        authorize_settlement(&request, actor)?;
        let state = next_state(request.request_state, response.decision)?;

        let settlement = match response.decision {
            Decision::Approved => {
                let available = unit.balance(actor).await?;
                ensure_covers(available, request.amount)?;
                let transfer = unit.insert(settlement_transfer(&request, Utc::now())?).await?;
                unit.balance(&transfer.receiver_id).await?;
                Some(transfer)
            }
            Decision::Rejected => None,
        };
        unit.set_request_state(&request.id, state).await?;
        let balance = unit.balance(actor).await?;
        unit.commit().await?;

        request.request_state = Some(state);
        Ok((request, settlement, balance))
    }

    /// Current balance of `participant`, recomputed from the log.
    #[instrument(skip(self), fields(participant = %participant), err)]
    pub async fn balance(&self, participant: &ParticipantId) -> LedgerResult<Decimal> {
        let mut unit = self.store.begin().await?;
        unit.balance(participant).await
    }

    /// Current balance of the caller, signed by the authority.
    pub async fn attested_balance(&self, caller: &Caller) -> LedgerResult<BalanceAttestation> {
        let balance = self.balance(caller.participant_id()).await?;
        Ok(self.signing.attest_balance(balance)?)
    }

    /// The caller's records, most recent first.
    #[instrument(skip(self, caller), fields(actor = %caller.participant_id()), err)]
    pub async fn list_transactions(&self, caller: &Caller, page: Page) -> LedgerResult<Vec<Transaction>> {
        let mut unit = self.store.begin().await?;
        Ok(unit.list(caller.participant_id(), page).await?)
    }

    /// One record, visible only to its sender and receiver.
    ///
    /// Records of other participants look exactly like missing ones.
    #[instrument(skip(self, caller), fields(actor = %caller.participant_id(), transaction_id = %id), err)]
    pub async fn get_transaction(&self, id: &TransactionId, caller: &Caller) -> LedgerResult<Transaction> {
        let mut unit = self.store.begin().await?;
        unit.get(id)
            .await?
            .filter(|tx| tx.involves(caller.participant_id()))
            .ok_or_else(|| LedgerError::not_found(format!("transaction {id}")))
    }

    async fn require_participant(&self, id: &ParticipantId) -> LedgerResult<()> {
        match self.directory.get_participant(id).await? {
            Some(_) => Ok(()),
            None => Err(LedgerError::not_found(format!("participant {id}"))),
        }
    }
}
