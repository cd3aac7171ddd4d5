//! Offline batch admission.
//!
//! ```text
//! bytes ─▶ parse_batch ─▶ verify every entry ─▶ resolve counterparties
//!       ─▶ collapse in-batch duplicates ─▶ open unit ─▶ drop ids already in the log
//!       ─▶ insert the rest ─▶ no sender below zero, every receiver summable ─▶ commit
//! ```
//!
//! Every check runs before the first write and any failure rejects the whole batch.
//! Callers only ever see [`LedgerError::IntegrityViolation`] for a bad batch; the
//! concrete [`Rejection`] goes to the log.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use ledgerpay_auth::{Caller, ParticipantDirectory};
use ledgerpay_core::{LedgerError, LedgerResult, ParticipantId, TransactionId};
use ledgerpay_offline::{
    EntryVerifier, FrameLayout, OfflineEntry, OfflinePayload, Rejection, parse_batch, same_public_key,
};
use ledgerpay_signing::{BalanceAttestation, SigningService};

use crate::ledger_store::LedgerStore;
use crate::retry::retry_on_conflict;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationOutcome {
    /// Entries written by this call. Zero when the whole batch was already known.
    pub admitted_count: usize,
    /// Entries skipped because their id was already in the log or repeated in the batch.
    pub duplicates: usize,
    /// The caller's balance after the merge.
    pub balance: BalanceAttestation,
}

#[derive(Debug, Clone)]
pub struct Reconciler<S, D> {
    store: S,
    directory: D,
    signing: SigningService,
    layout: FrameLayout,
}

impl<S, D> Reconciler<S, D> {
    pub fn new(store: S, directory: D, signing: SigningService, layout: FrameLayout) -> Self {
        Self {
            store,
            directory,
            signing,
            layout,
        }
    }

    pub fn layout(&self) -> FrameLayout {
        self.layout
    }
}

impl<S, D> Reconciler<S, D>
where
    S: LedgerStore,
    D: ParticipantDirectory,
{
    /// Admit the new entries of `batch` on behalf of `caller`, all or nothing.
    #[instrument(
        skip(self, batch, caller),
        fields(actor = %caller.participant_id(), bytes = batch.len()),
        err
    )]
    pub async fn reconcile(&self, batch: &[u8], caller: &Caller) -> LedgerResult<ReconciliationOutcome> {
        let entries = parse_batch(batch, self.layout).map_err(|r| reject(caller, r))?;

        let verifier = EntryVerifier::new(&self.signing, caller);
        for entry in &entries {
            verifier.verify(entry).map_err(|r| reject(caller, r))?;
        }
        self.check_counterparties(&verifier, &entries)
            .await?
            .map_err(|r| reject(caller, r))?;
        let unique = unique_payloads(&entries).map_err(|r| reject(caller, r))?;

        let (admitted_count, balance) =
            retry_on_conflict("reconcile", || self.merge(&unique, caller)).await?;

        let outcome = ReconciliationOutcome {
            admitted_count,
            duplicates: entries.len() - admitted_count,
            balance: self.signing.attest_balance(balance)?,
        };
        info!(
            admitted = outcome.admitted_count,
            duplicates = outcome.duplicates,
            "offline batch admitted"
        );
        Ok(outcome)
    }

    /// One attempt at writing the verified payloads the log does not hold yet.
    /// Returns how many were written and the caller's resulting balance.
    async fn merge(&self, unique: &[&OfflinePayload], caller: &Caller) -> LedgerResult<(usize, Decimal)> {
        let ids: Vec<TransactionId> = unique.iter().map(|p| p.id.clone()).collect();
        let mut unit = self.store.begin().await?;
        let existing = unit.existing_ids(&ids).await?;
        let fresh: Vec<&OfflinePayload> = unique
            .iter()
            .copied()
            .filter(|p| !existing.contains(&p.id))
            .collect();

        let senders: BTreeSet<&ParticipantId> = fresh.iter().map(|p| &p.sender_id).collect();
        let mut before = BTreeMap::new();
        for sender in senders {
            before.insert(sender, unit.balance(sender).await?);
        }

        let now = Utc::now();
        for payload in &fresh {
            unit.insert((*payload).clone().into_transaction(now)).await?;
        }

        for (sender, available) in before {
            let after = unit.balance(sender).await?;
            if after < Decimal::ZERO {
                warn!(
                    actor = %caller.participant_id(),
                    sender = %sender,
                    %available,
                    %after,
                    "offline batch would overdraw sender"
                );
                return Err(LedgerError::insufficient(available, available - after));
            }
        }
        let receivers: BTreeSet<&ParticipantId> = fresh.iter().map(|p| &p.receiver_id).collect();
        for receiver in receivers {
            unit.balance(receiver).await?;
        }

        let balance = unit.balance(caller.participant_id()).await?;
        unit.commit().await?;
        Ok((fresh.len(), balance))
    }

    /// Every counterparty must exist and must have signed with their on-file key.
    ///
    /// The outer result carries directory failures, the inner one batch rejections.
    async fn check_counterparties(
        &self,
        verifier: &EntryVerifier<'_>,
        entries: &[OfflineEntry],
    ) -> LedgerResult<Result<(), Rejection>> {
        let wanted: BTreeSet<&ParticipantId> = entries.iter().map(|e| verifier.counterparty(e)).collect();
        let wanted: Vec<ParticipantId> = wanted.into_iter().cloned().collect();

        let on_file: HashMap<ParticipantId, String> = self
            .directory
            .list_participants(&wanted)
            .await?
            .into_iter()
            .map(|p| (p.id, p.public_key_pem))
            .collect();

        for entry in entries {
            let Some(pem) = on_file.get(verifier.counterparty(entry)) else {
                return Ok(Err(Rejection::UnknownCounterparty));
            };
            if !same_public_key(&entry.public_key, pem.as_bytes()) {
                return Ok(Err(Rejection::ForeignKey { index: entry.index }));
            }
        }
        Ok(Ok(()))
    }
}

/// Collapse repeated ids, keeping the first occurrence. A repeated id must carry the
/// same payload.
fn unique_payloads(entries: &[OfflineEntry]) -> Result<Vec<&OfflinePayload>, Rejection> {
    let mut seen: HashMap<&TransactionId, &OfflinePayload> = HashMap::with_capacity(entries.len());
    let mut unique = Vec::with_capacity(entries.len());
    for entry in entries {
        match seen.get(&entry.payload.id) {
            Some(first) if **first != entry.payload => {
                return Err(Rejection::ConflictingDuplicate { index: entry.index });
            }
            Some(_) => {}
            None => {
                seen.insert(&entry.payload.id, &entry.payload);
                unique.push(&entry.payload);
            }
        }
    }
    Ok(unique)
}

fn reject(caller: &Caller, rejection: Rejection) -> LedgerError {
    warn!(
        actor = %caller.participant_id(),
        reason = %rejection,
        "offline batch rejected"
    );
    rejection.into()
}
