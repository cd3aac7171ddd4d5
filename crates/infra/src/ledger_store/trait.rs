use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use ledgerpay_core::{LedgerError, ParticipantId, TransactionId};
use ledgerpay_ledger::{RequestState, Transaction, balance_of};

/// Ledger store operation error.
///
/// These are infrastructure errors (isolation, storage, decoding) as opposed to the
/// ledger's own validation and state errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The unit lost a race with a concurrent writer (serialization failure, deadlock,
    /// concurrent insert of the same id). Retrying the whole operation may succeed.
    #[error("concurrent modification: {0}")]
    Conflict(String),

    /// An insert reused an id already present in the log.
    #[error("transaction {0} already exists")]
    Duplicate(TransactionId),

    /// A state update targeted a row that is not a pending request.
    #[error("transaction {0} is not a pending request")]
    NotPending(TransactionId),

    /// A stored row could not be decoded back into a transaction.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for LedgerError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(msg) => LedgerError::Conflict(msg),
            StoreError::Duplicate(id) => LedgerError::Conflict(format!("transaction {id} already exists")),
            StoreError::NotPending(id) => {
                LedgerError::invalid_state(format!("transaction {id} is not a pending request"))
            }
            other => LedgerError::Store(other.to_string()),
        }
    }
}

/// Offset pagination for listings. `limit == 0` means no limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

impl Page {
    pub fn new(limit: usize, offset: usize) -> Self {
        Self { limit, offset }
    }

    pub fn all() -> Self {
        Self::default()
    }
}

/// Append-only store of transaction records.
///
/// A store only hands out units of work; all reads and writes go through a
/// [`LedgerUnit`] so that a balance check and the write it guards observe one snapshot.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Open a unit of work.
    async fn begin(&self) -> Result<Box<dyn LedgerUnit>, StoreError>;
}

#[async_trait]
impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    async fn begin(&self) -> Result<Box<dyn LedgerUnit>, StoreError> {
        (**self).begin().await
    }
}

/// One atomic unit of work against the log.
///
/// Nothing written through a unit is visible to other units until [`commit`] succeeds.
/// Dropping a unit without committing discards every write made through it.
///
/// [`commit`]: LedgerUnit::commit
#[async_trait]
pub trait LedgerUnit: Send {
    /// Every record where `participant` is sender or receiver, oldest first.
    async fn transactions_for(
        &mut self,
        participant: &ParticipantId,
    ) -> Result<Vec<Transaction>, StoreError>;

    async fn get(&mut self, id: &TransactionId) -> Result<Option<Transaction>, StoreError>;

    /// The subset of `ids` already present in the log.
    async fn existing_ids(
        &mut self,
        ids: &[TransactionId],
    ) -> Result<HashSet<TransactionId>, StoreError>;

    /// Whether `requester` already has a pending request addressed to `payer`.
    async fn has_pending_request(
        &mut self,
        requester: &ParticipantId,
        payer: &ParticipantId,
    ) -> Result<bool, StoreError>;

    /// `participant`'s records, most recent first.
    async fn list(
        &mut self,
        participant: &ParticipantId,
        page: Page,
    ) -> Result<Vec<Transaction>, StoreError>;

    /// Append a record and return its stored form.
    ///
    /// The store assigns `recorded_at` from its own clock, never earlier than any record
    /// before it. Online records take that same instant as their `timestamp`; offline
    /// ones keep the client's.
    async fn insert(&mut self, transaction: Transaction) -> Result<Transaction, StoreError>;

    /// Move a pending request to `state`. Fails with [`StoreError::NotPending`] otherwise.
    async fn set_request_state(
        &mut self,
        id: &TransactionId,
        state: RequestState,
    ) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    /// Balance of `participant` as seen by this unit, writes included.
    async fn balance(&mut self, participant: &ParticipantId) -> Result<Decimal, LedgerError> {
        let transactions = self.transactions_for(participant).await?;
        balance_of(participant, &transactions)
    }
}
