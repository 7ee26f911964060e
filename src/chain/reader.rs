//! On-chain RPC reads
//!
//! Direct bytecode and allowance reads, used only as fallbacks or
//! verification: deployment status when the relay is unreachable, and the
//! collateral allowance check before approvals.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::{Address, U256};

use super::Erc20;

/// Read-only chain access. Kept behind a trait so orchestration can be tested
/// without an RPC endpoint.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Byte length of the code deployed at `address` (0 = no contract).
    async fn code_size(&self, address: Address) -> Result<usize>;

    /// ERC-20 allowance granted by `owner` to `spender` on `token`.
    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256>;
}

/// `ChainReader` backed by a JSON-RPC endpoint.
pub struct RpcReader {
    provider: Arc<Provider<Http>>,
}

impl RpcReader {
    pub fn new(rpc_url: &str) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .with_context(|| format!("invalid RPC url '{}'", rpc_url))?;
        Ok(Self {
            provider: Arc::new(provider),
        })
    }
}

#[async_trait]
impl ChainReader for RpcReader {
    async fn code_size(&self, address: Address) -> Result<usize> {
        let code = self
            .provider
            .get_code(address, None)
            .await
            .context("failed to read bytecode via RPC")?;
        Ok(code.len())
    }

    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256> {
        let erc20 = Erc20::new(token, self.provider.clone());
        erc20
            .allowance(owner, spender)
            .call()
            .await
            .context("failed to read ERC-20 allowance via RPC")
    }
}
