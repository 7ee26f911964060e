//! Chain configuration and deterministic proxy-wallet derivation
//!
//! The proxy (Safe) wallet address is a pure function of the EOA address and
//! the chain's factory constants: CREATE2 with a salt derived from the EOA.
//! No network call is involved; an unknown chain id is a fatal configuration
//! error and is never retried.

pub mod reader;

pub use reader::*;

use anyhow::{Context, Result};
use ethers::contract::abigen;
use ethers::types::Address;
use ethers::utils::{get_create2_address_from_hash, keccak256};

use crate::error::CoreError;

abigen!(
    Erc20,
    r#"[
        function allowance(address owner, address spender) external view returns (uint256)
        function approve(address spender, uint256 value) external returns (bool)
    ]"#
);

abigen!(
    ConditionalTokens,
    r#"[
        function redeemPositions(address collateralToken, bytes32 parentCollectionId, bytes32 conditionId, uint256[] indexSets)
    ]"#
);

/// Per-chain contract constants.
#[derive(Debug, Clone, Copy)]
pub struct ContractConfig {
    pub chain_id: u64,
    /// Safe proxy factory used for deterministic wallet derivation.
    pub safe_factory: Address,
    /// keccak256 of the Safe proxy creation code deployed by the factory.
    pub safe_init_code_hash: [u8; 32],
    /// Collateral token (USDC).
    pub collateral: Address,
    /// Conditional tokens settlement contract (approval spender, redeem target).
    pub settlement: Address,
    /// CTF Exchange (EIP-712 order domain).
    pub exchange: Address,
    /// Negative-risk CTF Exchange (order domain for neg-risk markets).
    pub neg_risk_exchange: Address,
}

const POLYGON_CHAIN_ID: u64 = 137;

const POLYGON_SAFE_INIT_CODE_HASH: &str =
    "56e3081a3d1bb38ed4eed1a39f7729c3cc77c7825747f2198973a45a49e0c0a1";

fn addr(raw: &str) -> Result<Address> {
    raw.parse()
        .with_context(|| format!("invalid contract address constant '{}'", raw))
}

/// Resolve the contract config for a chain id.
///
/// Only Polygon mainnet is configured; anything else is a fatal
/// configuration error.
pub fn contract_config(chain_id: u64) -> Result<ContractConfig> {
    match chain_id {
        POLYGON_CHAIN_ID => {
            let mut init_code_hash = [0u8; 32];
            hex::decode_to_slice(POLYGON_SAFE_INIT_CODE_HASH, &mut init_code_hash)
                .context("invalid Safe init code hash constant")?;
            Ok(ContractConfig {
                chain_id,
                safe_factory: addr("0xaacFeEa03eb1561C4e67d661e40682Bd20E3541b")?,
                safe_init_code_hash: init_code_hash,
                collateral: addr("0x2791Bca1f2de4661ED88A30C99A7a9449Aa84174")?,
                settlement: addr("0x4D97DCd97eC945f40cF65F87097ACe5EA0476045")?,
                exchange: addr("0x4bFb41d5B3570DeFd03C39a9A4D8dE6Bd8B8982E")?,
                neg_risk_exchange: addr("0xC5d563A36AE78145C45a50134d48A1215220f80a")?,
            })
        }
        other => Err(CoreError::config(format!(
            "no contract config for chain id {}",
            other
        ))
        .into()),
    }
}

/// Derive the proxy (Safe) wallet address for an EOA.
///
/// CREATE2 over the chain's Safe factory with salt = keccak256 of the
/// left-padded EOA address. Pure and deterministic.
pub fn derive_safe_address(eoa: Address, config: &ContractConfig) -> Address {
    let mut padded = [0u8; 32];
    padded[12..].copy_from_slice(eoa.as_bytes());
    let salt = keccak256(padded);
    get_create2_address_from_hash(config.safe_factory, salt, config.safe_init_code_hash)
}

/// Lower-cased hex rendering used for session keys and persisted addresses.
pub fn to_lower_hex(address: Address) -> String {
    format!("{:#x}", address)
}
