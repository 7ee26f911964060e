//! Application wiring
//!
//! Assembles the concrete clients behind the trait seams into a ready
//! application: local signer, RPC reader, file-backed session store, relay
//! and CLOB clients, all bound to one wallet.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use crate::cache::ViewCache;
use crate::chain::reader::{ChainReader, RpcReader};
use crate::chain::{contract_config, derive_safe_address};
use crate::clob::ClobClient;
use crate::config::AppConfig;
use crate::execution::OrderExecutor;
use crate::positions::{DataApiClient, PositionManager};
use crate::relay::{HttpRelayClient, RelayService};
use crate::session::store::FileSessionStore;
use crate::session::SessionOrchestrator;
use crate::signer::{LocalSigner, WalletSigner};

/// Initialize tracing from `RUST_LOG`, defaulting to `info`.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

/// Fully-wired application for one wallet.
pub struct App {
    pub config: AppConfig,
    pub orchestrator: Arc<SessionOrchestrator>,
    pub executor: Arc<OrderExecutor>,
    pub positions: Arc<PositionManager>,
    pub cache: Arc<ViewCache>,
}

impl App {
    /// Wire the application from config plus the `PRIVATE_KEY` environment
    /// variable. No network calls; those start with the first
    /// `initialize()` pass.
    pub fn bootstrap(config: AppConfig) -> Result<Self> {
        config.validate_env()?;
        let private_key =
            std::env::var("PRIVATE_KEY").context("PRIVATE_KEY is not set")?;

        let contracts = contract_config(config.chain.chain_id)?;
        let signer: Arc<dyn WalletSigner> =
            Arc::new(LocalSigner::new(&private_key, contracts.chain_id)?);
        let safe = derive_safe_address(signer.address(), &contracts);

        let reader: Arc<dyn ChainReader> = Arc::new(RpcReader::new(&config.chain.rpc_url)?);
        let store = Arc::new(FileSessionStore::new(&config.session.data_dir));
        let clob = Arc::new(ClobClient::new(
            &config.venue.clob_url,
            signer.clone(),
            contracts,
            safe,
        )?);
        let relay: Arc<dyn RelayService> = Arc::new(HttpRelayClient::new(
            &config.venue.relay_url,
            signer.clone(),
            contracts,
        )?);

        let relay_for_factory = relay.clone();
        let orchestrator = Arc::new(SessionOrchestrator::new(
            signer,
            reader,
            store,
            clob.clone(),
            Box::new(move || Ok(relay_for_factory.clone())),
            contracts,
        ));

        let cache = Arc::new(ViewCache::new());
        let executor = Arc::new(OrderExecutor::new(clob, cache.clone()));
        let source = Arc::new(DataApiClient::new(&config.venue.data_api_url)?);
        let positions = Arc::new(PositionManager::new(
            source,
            executor.clone(),
            relay,
            cache.clone(),
            contracts,
            safe,
        ));

        Ok(Self {
            config,
            orchestrator,
            executor,
            positions,
            cache,
        })
    }
}
