//! EIP-712 and HMAC signing for the CLOB
//!
//! Builds the typed-data payloads for L1 auth and order placement, and the
//! L2 HMAC signature for authenticated REST requests. Actual ECDSA signing
//! happens behind the wallet seam so the callers stay testable.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use base64::{engine::general_purpose, Engine as _};
use ethers::types::transaction::eip712::{EIP712Domain, Eip712DomainType, TypedData, Types};
use ethers::types::{Address, U256};
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

use crate::types::Side;

use super::types::SignableOrder;

const CTF_EXCHANGE_DOMAIN: &str = "Polymarket CTF Exchange";
const CLOB_AUTH_DOMAIN: &str = "ClobAuthDomain";
const DOMAIN_VERSION: &str = "1";
const CLOB_AUTH_MESSAGE: &str = "This message attests that I control the given wallet";

fn field(name: &str, r#type: &str) -> Eip712DomainType {
    Eip712DomainType {
        name: name.to_string(),
        r#type: r#type.to_string(),
    }
}

/// Typed data for the `/auth/*` endpoints (L1 auth).
pub fn l1_auth_typed_data(address: Address, chain_id: u64, timestamp: i64, nonce: u64) -> TypedData {
    let domain = EIP712Domain {
        name: Some(CLOB_AUTH_DOMAIN.to_string()),
        version: Some(DOMAIN_VERSION.to_string()),
        chain_id: Some(chain_id.into()),
        verifying_contract: None,
        salt: None,
    };

    let mut types: Types = BTreeMap::new();
    types.insert(
        "ClobAuth".to_string(),
        vec![
            field("address", "address"),
            field("timestamp", "string"),
            field("nonce", "uint256"),
            field("message", "string"),
        ],
    );

    let mut message = BTreeMap::<String, Value>::new();
    message.insert(
        "address".to_string(),
        Value::String(format!("{:#x}", address)),
    );
    message.insert(
        "timestamp".to_string(),
        Value::String(timestamp.to_string()),
    );
    message.insert("nonce".to_string(), Value::String(nonce.to_string()));
    message.insert(
        "message".to_string(),
        Value::String(CLOB_AUTH_MESSAGE.to_string()),
    );

    TypedData {
        domain,
        types,
        primary_type: "ClobAuth".to_string(),
        message,
    }
}

/// Typed data for order placement.
///
/// The verifying contract is the standard or negative-risk exchange; the
/// caller picks it per market.
pub fn order_typed_data(
    order: &SignableOrder,
    chain_id: u64,
    verifying_contract: Address,
) -> Result<TypedData> {
    let token_id = U256::from_dec_str(&order.token_id)
        .with_context(|| format!("Invalid token_id '{}' for order signing", order.token_id))?;

    let domain = EIP712Domain {
        name: Some(CTF_EXCHANGE_DOMAIN.to_string()),
        version: Some(DOMAIN_VERSION.to_string()),
        chain_id: Some(chain_id.into()),
        verifying_contract: Some(verifying_contract),
        salt: None,
    };

    let mut types: Types = BTreeMap::new();
    types.insert(
        "Order".to_string(),
        vec![
            field("salt", "uint256"),
            field("maker", "address"),
            field("signer", "address"),
            field("taker", "address"),
            field("tokenId", "uint256"),
            field("makerAmount", "uint256"),
            field("takerAmount", "uint256"),
            field("expiration", "uint256"),
            field("nonce", "uint256"),
            field("feeRateBps", "uint256"),
            field("side", "uint8"),
            field("signatureType", "uint8"),
        ],
    );

    let mut message = BTreeMap::<String, Value>::new();
    message.insert("salt".to_string(), Value::String(order.salt.to_string()));
    message.insert(
        "maker".to_string(),
        Value::String(format!("{:#x}", order.maker)),
    );
    message.insert(
        "signer".to_string(),
        Value::String(format!("{:#x}", order.signer)),
    );
    message.insert(
        "taker".to_string(),
        Value::String(format!("{:#x}", order.taker)),
    );
    message.insert("tokenId".to_string(), Value::String(token_id.to_string()));
    message.insert(
        "makerAmount".to_string(),
        Value::String(order.maker_amount.to_string()),
    );
    message.insert(
        "takerAmount".to_string(),
        Value::String(order.taker_amount.to_string()),
    );
    message.insert(
        "expiration".to_string(),
        Value::String(order.expiration.to_string()),
    );
    message.insert("nonce".to_string(), Value::String(order.nonce.to_string()));
    message.insert(
        "feeRateBps".to_string(),
        Value::String(order.fee_rate_bps.to_string()),
    );
    message.insert(
        "side".to_string(),
        Value::from(match order.side {
            Side::Buy => 0_u8,
            Side::Sell => 1_u8,
        }),
    );
    message.insert(
        "signatureType".to_string(),
        Value::from(order.signature_type),
    );

    Ok(TypedData {
        domain,
        types,
        primary_type: "Order".to_string(),
        message,
    })
}

/// L2 HMAC signature for authenticated CLOB REST requests.
pub fn l2_signature(
    api_secret: &str,
    timestamp: i64,
    method: &str,
    request_path: &str,
    body: Option<&str>,
) -> Result<String> {
    let secret_bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(api_secret)
        .or_else(|_| general_purpose::URL_SAFE.decode(api_secret))
        .context("Failed decoding API secret as url-safe base64")?;

    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(&secret_bytes).context("Failed to initialize HMAC")?;
    let payload = format!(
        "{}{}{}{}",
        timestamp,
        method.to_uppercase(),
        request_path,
        body.unwrap_or("")
    );
    mac.update(payload.as_bytes());
    Ok(general_purpose::URL_SAFE.encode(mac.finalize().into_bytes()))
}
