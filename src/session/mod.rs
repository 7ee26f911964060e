//! Trading session orchestration
//!
//! One linear pass per `initialize()` call: check deployment, establish
//! credentials, establish approvals, persist. Steps that are already
//! satisfied are skipped so a repeat pass costs zero signatures. The pass is
//! single-flight per orchestrator; a second call while one is running is
//! rejected instead of queued, so the wallet never sees overlapping prompts.

pub mod approvals;
pub mod credentials;
pub mod deployment;
pub mod store;

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::chain::reader::ChainReader;
use crate::chain::{derive_safe_address, ContractConfig};
use crate::error::CoreError;
use crate::relay::RelayService;
use crate::signer::WalletSigner;
use crate::types::{SessionStep, TradingSession};

use self::approvals::ApprovalManager;
use self::credentials::{CredentialEndpoint, CredentialManager};
use self::deployment::DeploymentManager;
use self::store::SessionStore;

/// Builds the relay client for a pass. Construction failure aborts the pass
/// before any step runs.
pub type RelayFactory = Box<dyn Fn() -> Result<Arc<dyn RelayService>> + Send + Sync>;

pub struct SessionOrchestrator {
    signer: Arc<dyn WalletSigner>,
    reader: Arc<dyn ChainReader>,
    store: Arc<dyn SessionStore>,
    credential_endpoint: Arc<dyn CredentialEndpoint>,
    relay_factory: RelayFactory,
    contracts: ContractConfig,
    step: Mutex<SessionStep>,
    relay: Mutex<Option<Arc<dyn RelayService>>>,
}

impl SessionOrchestrator {
    pub fn new(
        signer: Arc<dyn WalletSigner>,
        reader: Arc<dyn ChainReader>,
        store: Arc<dyn SessionStore>,
        credential_endpoint: Arc<dyn CredentialEndpoint>,
        relay_factory: RelayFactory,
        contracts: ContractConfig,
    ) -> Self {
        Self {
            signer,
            reader,
            store,
            credential_endpoint,
            relay_factory,
            contracts,
            step: Mutex::new(SessionStep::Idle),
            relay: Mutex::new(None),
        }
    }

    /// Current step of the state machine, for status observability.
    pub fn current_step(&self) -> SessionStep {
        *self.step.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_step(&self, step: SessionStep) {
        *self.step.lock().unwrap_or_else(|e| e.into_inner()) = step;
    }

    /// Claim the state machine for a pass; rejects if one is in flight.
    fn begin(&self) -> Result<()> {
        let mut step = self.step.lock().unwrap_or_else(|e| e.into_inner());
        if step.is_in_flight() {
            return Err(CoreError::Busy(step.to_string()).into());
        }
        *step = SessionStep::Checking;
        Ok(())
    }

    /// Run one orchestration pass. Safe to re-invoke after a failure: only
    /// the unmet steps run, so a no-op pass costs zero signatures.
    pub async fn initialize(&self) -> Result<TradingSession> {
        self.begin()?;
        match self.run_pass().await {
            Ok(session) => {
                self.set_step(SessionStep::Complete);
                info!(eoa = %format!("{:#x}", session.eoa_address), "trading session complete");
                Ok(session)
            }
            Err(err) => {
                // No partial session was written; the previous one, if any,
                // is still intact for the retry.
                self.set_step(SessionStep::Idle);
                Err(err)
            }
        }
    }

    async fn run_pass(&self) -> Result<TradingSession> {
        let eoa = self.signer.address();
        let safe = derive_safe_address(eoa, &self.contracts);
        let persisted = self
            .store
            .load(eoa)
            .await
            .context("failed loading persisted session")?;

        let relay = (self.relay_factory)().context("relay client initialization failed")?;
        *self.relay.lock().unwrap_or_else(|e| e.into_inner()) = Some(relay.clone());

        // Deployment status is always re-verified live; the persisted flag is
        // never trusted on its own.
        let deployment = DeploymentManager::new(relay.clone(), self.reader.clone());
        if !deployment.is_deployed(safe).await {
            self.set_step(SessionStep::Deploying);
            deployment.deploy(safe).await?;
        }

        let credentials = match persisted.as_ref().and_then(|s| s.valid_credentials()) {
            Some(existing) => existing.clone(),
            None => {
                self.set_step(SessionStep::Credentials);
                CredentialManager::new(self.credential_endpoint.clone())
                    .get_or_create()
                    .await?
            }
        };

        self.set_step(SessionStep::Approvals);
        let has_approvals = ApprovalManager::new(self.reader.clone(), relay, self.contracts)
            .ensure_approval(safe)
            .await?;

        let mut session = TradingSession::new(eoa, safe);
        session.is_safe_deployed = true;
        session.has_api_credentials = credentials.is_valid();
        session.api_credentials = Some(credentials);
        session.has_approvals = has_approvals;

        self.store
            .save(&session)
            .await
            .context("failed persisting session")?;
        Ok(session)
    }

    /// Load the persisted session for the bound EOA without running a pass.
    pub async fn current_session(&self) -> Result<Option<TradingSession>> {
        self.store.load(self.signer.address()).await
    }

    /// Relay handle from the last pass, for post-session actions (redeem).
    pub fn relay_handle(&self) -> Option<Arc<dyn RelayService>> {
        self.relay
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Tear down the session: drop the persisted record and the relay
    /// handle, reset to idle. No network calls; never fails.
    pub async fn end_session(&self) {
        let eoa = self.signer.address();
        if let Err(err) = self.store.clear(eoa).await {
            warn!(%err, "failed clearing persisted session");
        }
        *self.relay.lock().unwrap_or_else(|e| e.into_inner()) = None;
        self.set_step(SessionStep::Idle);
        info!(eoa = %format!("{:#x}", eoa), "trading session ended");
    }
}
