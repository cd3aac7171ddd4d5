use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use ledgerpay_core::{ParticipantId, TransactionId};
use ledgerpay_ledger::{RequestState, Transaction};

use super::r#trait::{LedgerStore, LedgerUnit, Page, StoreError};

#[derive(Debug, Clone, Default)]
struct LedgerState {
    /// Insertion order.
    rows: Vec<Transaction>,
    by_id: HashMap<TransactionId, usize>,
    last_recorded_at: Option<DateTime<Utc>>,
}

/// In-memory append-only ledger.
///
/// Intended for tests/dev. One async mutex admits a single unit at a time, so units are
/// serializable by construction. A unit works on a copy of the log and publishes it on
/// commit.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedgerStore {
    state: Arc<Mutex<LedgerState>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed records.
    pub async fn len(&self) -> usize {
        self.state.lock().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerUnit>, StoreError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryUnit { guard, working }))
    }
}

struct InMemoryUnit {
    guard: OwnedMutexGuard<LedgerState>,
    working: LedgerState,
}

impl InMemoryUnit {
    fn involving<'a>(
        &'a self,
        participant: &'a ParticipantId,
    ) -> impl DoubleEndedIterator<Item = &'a Transaction> + 'a {
        self.working.rows.iter().filter(move |tx| tx.involves(participant))
    }
}

#[async_trait]
impl LedgerUnit for InMemoryUnit {
    async fn transactions_for(
        &mut self,
        participant: &ParticipantId,
    ) -> Result<Vec<Transaction>, StoreError> {
        Ok(self.involving(participant).cloned().collect())
    }

    async fn get(&mut self, id: &TransactionId) -> Result<Option<Transaction>, StoreError> {
        Ok(self.working.by_id.get(id).map(|&idx| self.working.rows[idx].clone()))
    }

    async fn existing_ids(
        &mut self,
        ids: &[TransactionId],
    ) -> Result<HashSet<TransactionId>, StoreError> {
        Ok(ids
            .iter()
            .filter(|id| self.working.by_id.contains_key(*id))
            .cloned()
            .collect())
    }

    async fn has_pending_request(
        &mut self,
        requester: &ParticipantId,
        payer: &ParticipantId,
    ) -> Result<bool, StoreError> {
        Ok(self.working.rows.iter().any(|tx| {
            tx.is_pending_request()
                && tx.sender_id.as_ref() == Some(requester)
                && &tx.receiver_id == payer
        }))
    }

    async fn list(
        &mut self,
        participant: &ParticipantId,
        page: Page,
    ) -> Result<Vec<Transaction>, StoreError> {
        let newest_first = self.involving(participant).rev().skip(page.offset).cloned();
        Ok(match page.limit {
            0 => newest_first.collect(),
            limit => newest_first.take(limit).collect(),
        })
    }

    async fn insert(&mut self, mut transaction: Transaction) -> Result<Transaction, StoreError> {
        if self.working.by_id.contains_key(&transaction.id) {
            return Err(StoreError::Duplicate(transaction.id));
        }

        let now = Utc::now();
        let recorded_at = match self.working.last_recorded_at {
            Some(last) if last > now => last,
            _ => now,
        };
        transaction.recorded_at = recorded_at;
        if !transaction.origin.is_offline() {
            transaction.timestamp = recorded_at;
        }
        self.working.last_recorded_at = Some(recorded_at);

        self.working
            .by_id
            .insert(transaction.id.clone(), self.working.rows.len());
        self.working.rows.push(transaction.clone());
        Ok(transaction)
    }

    async fn set_request_state(
        &mut self,
        id: &TransactionId,
        state: RequestState,
    ) -> Result<(), StoreError> {
        let idx = *self
            .working
            .by_id
            .get(id)
            .ok_or_else(|| StoreError::NotPending(id.clone()))?;
        let row = &mut self.working.rows[idx];
        if !row.is_pending_request() {
            return Err(StoreError::NotPending(id.clone()));
        }
        row.request_state = Some(state);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let InMemoryUnit { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
