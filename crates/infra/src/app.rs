//! Service wiring.
//!
//! The identity directory belongs to the (external) auth layer and is passed in; the
//! store and the authority key are chosen from [`AppConfig`].

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use ledgerpay_auth::{Caller, ParticipantDirectory};
use ledgerpay_core::LedgerResult;
use ledgerpay_offline::FrameLayout;
use ledgerpay_signing::{KeyPair, SigningError, SigningService};

use crate::config::{AppConfig, ConfigError};
use crate::ledger_store::{InMemoryLedgerStore, LedgerStore, PostgresLedgerStore, StoreError};
use crate::reconciler::{ReconciliationOutcome, Reconciler};
use crate::service::LedgerService;

pub type SharedStore = Arc<dyn LedgerStore>;
pub type SharedDirectory = Arc<dyn ParticipantDirectory>;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("authority key: {0}")]
    Signing(#[from] SigningError),
    #[error("ledger store: {0}")]
    Store(#[from] StoreError),
}

/// Everything a request handler needs, built once at startup and cloned per handler.
#[derive(Clone)]
pub struct LedgerApp {
    pub ledger: LedgerService<SharedStore, SharedDirectory>,
    pub reconciler: Reconciler<SharedStore, SharedDirectory>,
}

impl LedgerApp {
    /// The offline frame layout pairs the configured participant segment with the
    /// authority key's own signature size.
    pub fn new(store: SharedStore, directory: SharedDirectory, signing: SigningService, config: &AppConfig) -> Self {
        let layout = FrameLayout::for_authority(&signing, config.author_signature_len());
        info!(
            author_signature_len = layout.author_signature_len,
            authority_signature_len = layout.authority_signature_len,
            "offline frame layout"
        );
        Self {
            ledger: LedgerService::new(Arc::clone(&store), Arc::clone(&directory), signing.clone()),
            reconciler: Reconciler::new(store, directory, signing, layout),
        }
    }

    /// Read [`AppConfig`] from the environment, then [`LedgerApp::from_config`].
    pub async fn from_env(directory: SharedDirectory) -> Result<Self, StartupError> {
        let config = AppConfig::from_env()?;
        Self::from_config(&config, directory).await
    }

    /// Install logging, load the authority key and open the configured store.
    pub async fn from_config(config: &AppConfig, directory: SharedDirectory) -> Result<Self, StartupError> {
        ledgerpay_observability::init(&config.log);

        let signing = SigningService::new(load_authority(config)?)?;

        let store: SharedStore = match &config.database_url {
            Some(url) => {
                info!(max_connections = config.database_max_connections, "using postgres ledger store");
                Arc::new(PostgresLedgerStore::connect(url, config.database_max_connections).await?)
            }
            None => {
                warn!("LEDGER_DATABASE_URL not set, using in-memory ledger store");
                Arc::new(InMemoryLedgerStore::new())
            }
        };

        Ok(Self::new(store, directory, signing, config))
    }

    /// Admit an offline batch for `caller`.
    pub async fn reconcile_offline_batch(
        &self,
        batch: &[u8],
        caller: &Caller,
    ) -> LedgerResult<ReconciliationOutcome> {
        self.reconciler.reconcile(batch, caller).await
    }
}

fn load_authority(config: &AppConfig) -> Result<KeyPair, SigningError> {
    match &config.authority_key_path {
        Some(path) => {
            info!(path = %path.display(), "loading authority key");
            KeyPair::load(path)
        }
        None => {
            warn!(
                scheme = config.key_scheme.as_str(),
                "LEDGER_AUTHORITY_KEY_PATH not set, generating an ephemeral authority key; \
                 issued key certificates will not survive a restart"
            );
            KeyPair::generate_for(config.key_scheme, config.authority_key_bits)
        }
    }
}
