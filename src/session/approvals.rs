//! Collateral approvals
//!
//! Orders settle from the proxy wallet, so the settlement contract needs a
//! collateral allowance from it. The check compares against a large fixed
//! threshold rather than the exact maximum, so a prior partial approval that
//! is still effectively unlimited passes without a redundant signature.

use std::sync::Arc;

use anyhow::Result;
use ethers::abi::AbiEncode;
use ethers::types::{Address, U256};
use tracing::{info, warn};

use crate::chain::reader::ChainReader;
use crate::chain::{ApproveCall, ContractConfig};
use crate::relay::{RelayService, SafeTransaction};

/// 1M USDC in 6-decimal units. Anything above this is "effectively unlimited".
const APPROVAL_THRESHOLD: u64 = 1_000_000_000_000;

pub struct ApprovalManager {
    reader: Arc<dyn ChainReader>,
    relay: Arc<dyn RelayService>,
    contracts: ContractConfig,
}

impl ApprovalManager {
    pub fn new(
        reader: Arc<dyn ChainReader>,
        relay: Arc<dyn RelayService>,
        contracts: ContractConfig,
    ) -> Self {
        Self {
            reader,
            relay,
            contracts,
        }
    }

    /// Whether the proxy's collateral allowance to the settlement contract
    /// clears the threshold. An RPC failure reads as no approval.
    pub async fn check_approval(&self, safe: Address) -> bool {
        match self
            .reader
            .allowance(self.contracts.collateral, safe, self.contracts.settlement)
            .await
        {
            Ok(allowance) => allowance >= U256::from(APPROVAL_THRESHOLD),
            Err(err) => {
                warn!(%err, "allowance read failed, treating as unapproved");
                false
            }
        }
    }

    /// Grant an unlimited allowance through the relay unless one is already
    /// in place. One signature on the approval path, zero when skipped.
    pub async fn ensure_approval(&self, safe: Address) -> Result<bool> {
        if self.check_approval(safe).await {
            return Ok(true);
        }

        let call = ApproveCall {
            spender: self.contracts.settlement,
            value: U256::MAX,
        };
        let tx = SafeTransaction {
            to: self.contracts.collateral,
            value: U256::zero(),
            data: call.encode().into(),
        };

        self.relay
            .execute(vec![tx], "collateral approval")
            .await?;
        info!(safe = %format!("{:#x}", safe), "collateral approval granted");
        Ok(true)
    }
}
