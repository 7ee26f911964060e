//! Proxy wallet deployment
//!
//! Deployment status is checked relay-first with an RPC bytecode fallback;
//! both sources failing reads as not-deployed rather than an error, since the
//! deploy path itself is idempotent.

use std::sync::Arc;

use anyhow::Result;
use ethers::types::Address;
use tracing::{info, warn};

use crate::chain::reader::ChainReader;
use crate::relay::{DeployOutcome, RelayService};

pub struct DeploymentManager {
    relay: Arc<dyn RelayService>,
    reader: Arc<dyn ChainReader>,
}

impl DeploymentManager {
    pub fn new(relay: Arc<dyn RelayService>, reader: Arc<dyn ChainReader>) -> Self {
        Self { relay, reader }
    }

    /// Whether the proxy has on-chain code. Never fails; an unreachable relay
    /// falls back to an RPC bytecode read, and an unreachable RPC reads as
    /// not-deployed.
    pub async fn is_deployed(&self, safe: Address) -> bool {
        match self.relay.get_deployed(safe).await {
            Ok(deployed) => deployed,
            Err(err) => {
                warn!(%err, "relay deployment query failed, falling back to RPC");
                match self.reader.code_size(safe).await {
                    Ok(size) => size > 0,
                    Err(err) => {
                        warn!(%err, "RPC bytecode read failed, treating proxy as not deployed");
                        false
                    }
                }
            }
        }
    }

    /// Deploy the proxy through the relay. One signature. A relay that
    /// answers "already deployed" is success, not an error.
    pub async fn deploy(&self, safe: Address) -> Result<DeployOutcome> {
        let outcome = self.relay.deploy().await?;
        match &outcome {
            DeployOutcome::Deployed(hash) => {
                info!(safe = %format!("{:#x}", safe), tx = %format!("{:#x}", hash), "proxy deployed")
            }
            DeployOutcome::AlreadyDeployed => {
                info!(safe = %format!("{:#x}", safe), "proxy already deployed")
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::reader::MockChainReader;
    use crate::relay::MockRelayService;
    use anyhow::anyhow;
    use ethers::types::H256;

    #[tokio::test]
    async fn relay_answer_wins_over_rpc() {
        let mut relay = MockRelayService::new();
        relay.expect_get_deployed().returning(|_| Ok(true));
        let mut reader = MockChainReader::new();
        reader.expect_code_size().never();

        let mgr = DeploymentManager::new(Arc::new(relay), Arc::new(reader));
        assert!(mgr.is_deployed(Address::random()).await);
    }

    #[tokio::test]
    async fn falls_back_to_bytecode_when_relay_unreachable() {
        let mut relay = MockRelayService::new();
        relay
            .expect_get_deployed()
            .returning(|_| Err(anyhow!("relay down")));
        let mut reader = MockChainReader::new();
        reader.expect_code_size().returning(|_| Ok(1234));

        let mgr = DeploymentManager::new(Arc::new(relay), Arc::new(reader));
        assert!(mgr.is_deployed(Address::random()).await);
    }

    #[tokio::test]
    async fn both_sources_down_reads_as_not_deployed() {
        let mut relay = MockRelayService::new();
        relay
            .expect_get_deployed()
            .returning(|_| Err(anyhow!("relay down")));
        let mut reader = MockChainReader::new();
        reader
            .expect_code_size()
            .returning(|_| Err(anyhow!("rpc down")));

        let mgr = DeploymentManager::new(Arc::new(relay), Arc::new(reader));
        assert!(!mgr.is_deployed(Address::random()).await);
    }

    #[tokio::test]
    async fn relay_already_deployed_answer_is_success() {
        let mut relay = MockRelayService::new();
        relay
            .expect_deploy()
            .times(1)
            .returning(|| Ok(DeployOutcome::AlreadyDeployed));
        let reader = MockChainReader::new();

        let mgr = DeploymentManager::new(Arc::new(relay), Arc::new(reader));
        let outcome = mgr.deploy(Address::random()).await.unwrap();
        assert_eq!(outcome, DeployOutcome::AlreadyDeployed);
    }

    #[tokio::test]
    async fn deploy_returns_the_mined_outcome() {
        let mut relay = MockRelayService::new();
        relay
            .expect_deploy()
            .times(1)
            .returning(|| Ok(DeployOutcome::Deployed(H256::random())));
        let reader = MockChainReader::new();

        let mgr = DeploymentManager::new(Arc::new(relay), Arc::new(reader));
        let outcome = mgr.deploy(Address::random()).await.unwrap();
        assert!(matches!(outcome, DeployOutcome::Deployed(_)));
    }
}
