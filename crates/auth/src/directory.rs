//! Participant lookup contract.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use thiserror::Error;

use ledgerpay_core::{LedgerError, ParticipantId};

use crate::Participant;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

impl From<DirectoryError> for LedgerError {
    fn from(value: DirectoryError) -> Self {
        LedgerError::Store(value.to_string())
    }
}

/// Read-only view of the identity store.
#[async_trait]
pub trait ParticipantDirectory: Send + Sync {
    async fn get_participant(
        &self,
        id: &ParticipantId,
    ) -> Result<Option<Participant>, DirectoryError>;

    /// Resolve a set of ids; unknown ids are simply absent from the result.
    async fn list_participants(
        &self,
        ids: &[ParticipantId],
    ) -> Result<Vec<Participant>, DirectoryError>;
}

#[async_trait]
impl<D> ParticipantDirectory for std::sync::Arc<D>
where
    D: ParticipantDirectory + ?Sized,
{
    async fn get_participant(
        &self,
        id: &ParticipantId,
    ) -> Result<Option<Participant>, DirectoryError> {
        (**self).get_participant(id).await
    }

    async fn list_participants(
        &self,
        ids: &[ParticipantId],
    ) -> Result<Vec<Participant>, DirectoryError> {
        (**self).list_participants(ids).await
    }
}

/// In-memory participant directory.
///
/// Intended for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryParticipantDirectory {
    participants: RwLock<HashMap<ParticipantId, Participant>>,
}

impl InMemoryParticipantDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, participant: Participant) -> Result<(), DirectoryError> {
        let mut participants = self
            .participants
            .write()
            .map_err(|_| DirectoryError::Unavailable("lock poisoned".to_string()))?;
        tracing::debug!(participant_id = %participant.id, "participant registered");
        participants.insert(participant.id.clone(), participant);
        Ok(())
    }
}

#[async_trait]
impl ParticipantDirectory for InMemoryParticipantDirectory {
    async fn get_participant(
        &self,
        id: &ParticipantId,
    ) -> Result<Option<Participant>, DirectoryError> {
        let participants = self
            .participants
            .read()
            .map_err(|_| DirectoryError::Unavailable("lock poisoned".to_string()))?;
        Ok(participants.get(id).cloned())
    }

    async fn list_participants(
        &self,
        ids: &[ParticipantId],
    ) -> Result<Vec<Participant>, DirectoryError> {
        let participants = self
            .participants
            .read()
            .map_err(|_| DirectoryError::Unavailable("lock poisoned".to_string()))?;
        let mut seen = std::collections::HashSet::new();
        Ok(ids
            .iter()
            .filter(|id| seen.insert(*id))
            .filter_map(|id| participants.get(id).cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(s: &str) -> ParticipantId {
        ParticipantId::parse(s).unwrap()
    }

    #[tokio::test]
    async fn list_skips_unknown_and_duplicate_ids() {
        let dir = InMemoryParticipantDirectory::new();
        dir.register(Participant::new(pid("alice"), "pem-a")).unwrap();
        dir.register(Participant::new(pid("bob"), "pem-b")).unwrap();

        let found = dir
            .list_participants(&[pid("alice"), pid("mallory"), pid("alice")])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, pid("alice"));
    }

    #[tokio::test]
    async fn get_returns_none_for_unknown() {
        let dir = InMemoryParticipantDirectory::new();
        assert!(dir.get_participant(&pid("nobody")).await.unwrap().is_none());
    }
}
