//! Wallet signer seam
//!
//! Every call that produces a signature suspends until the underlying wallet
//! resolves it; there is no cancellation of an in-flight signature request.
//! The orchestrator serializes prompts by running its steps sequentially.

use anyhow::{Context, Result};
use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip712::TypedData;
use ethers::types::Address;

/// A wallet capable of producing EIP-712 signatures on demand.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WalletSigner: Send + Sync {
    fn address(&self) -> Address;

    /// Prompts for exactly one signature. Returns the 65-byte signature as a
    /// 0x-prefixed hex string.
    async fn sign_typed_data(&self, typed: &TypedData) -> Result<String>;
}

/// `WalletSigner` backed by an in-process private key.
pub struct LocalSigner {
    wallet: LocalWallet,
}

impl LocalSigner {
    pub fn new(private_key: &str, chain_id: u64) -> Result<Self> {
        let wallet: LocalWallet = private_key
            .parse()
            .context("invalid private key for local signer")?;
        Ok(Self {
            wallet: wallet.with_chain_id(chain_id),
        })
    }
}

#[async_trait]
impl WalletSigner for LocalSigner {
    fn address(&self) -> Address {
        self.wallet.address()
    }

    async fn sign_typed_data(&self, typed: &TypedData) -> Result<String> {
        let signature = self
            .wallet
            .sign_typed_data(typed)
            .await
            .context("failed to sign typed data")?;
        let sig = signature.to_string();
        Ok(if sig.starts_with("0x") {
            sig
        } else {
            format!("0x{}", sig)
        })
    }
}
