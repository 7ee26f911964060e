//! CLOB REST API client
//!
//! HTTP layer for the venue: public price reads, L1-authenticated credential
//! endpoints, and L2-authenticated order management.
//! Endpoints documented at: https://docs.polymarket.com/developers/CLOB

use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use ethers::types::Address;
use reqwest::{
    header::{HeaderMap, HeaderValue, CONTENT_TYPE},
    Client,
};
use serde_json::Value;
use tracing::debug;

use crate::chain::to_lower_hex;
use crate::signer::WalletSigner;
use crate::types::{ApiCredentials, OpenOrder, Side};

use super::signing::{l1_auth_typed_data, l2_signature};
use super::types::{PriceResponse, SignableOrder};

/// REST client for the CLOB API.
pub struct RestClient {
    client: Client,
    base_url: String,
}

impl RestClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .default_headers(headers)
            .build()
            .context("failed to build CLOB HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn build_l1_headers(&self, signer: &dyn WalletSigner, chain_id: u64) -> Result<HeaderMap> {
        let timestamp = Utc::now().timestamp();
        let nonce = rand::random::<u64>();
        let typed = l1_auth_typed_data(signer.address(), chain_id, timestamp, nonce);
        let signature = signer
            .sign_typed_data(&typed)
            .await
            .context("L1 auth signature failed")?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "POLY_ADDRESS",
            HeaderValue::from_str(&to_lower_hex(signer.address()))
                .context("invalid POLY_ADDRESS header value")?,
        );
        headers.insert(
            "POLY_SIGNATURE",
            HeaderValue::from_str(&signature).context("invalid POLY_SIGNATURE header value")?,
        );
        headers.insert(
            "POLY_TIMESTAMP",
            HeaderValue::from_str(&timestamp.to_string())
                .context("invalid POLY_TIMESTAMP header value")?,
        );
        headers.insert(
            "POLY_NONCE",
            HeaderValue::from_str(&nonce.to_string())
                .context("invalid POLY_NONCE header value")?,
        );
        Ok(headers)
    }

    fn build_l2_headers(
        &self,
        address: Address,
        credentials: &ApiCredentials,
        method: &str,
        request_path: &str,
        body: &str,
    ) -> Result<HeaderMap> {
        let timestamp = Utc::now().timestamp();
        let signature = l2_signature(
            &credentials.secret,
            timestamp,
            method,
            request_path,
            if body.is_empty() { None } else { Some(body) },
        )?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "POLY_ADDRESS",
            HeaderValue::from_str(&to_lower_hex(address))
                .context("invalid POLY_ADDRESS header value")?,
        );
        headers.insert(
            "POLY_SIGNATURE",
            HeaderValue::from_str(&signature).context("invalid POLY_SIGNATURE header value")?,
        );
        headers.insert(
            "POLY_TIMESTAMP",
            HeaderValue::from_str(&timestamp.to_string())
                .context("invalid POLY_TIMESTAMP header value")?,
        );
        headers.insert(
            "POLY_API_KEY",
            HeaderValue::from_str(&credentials.key).context("invalid POLY_API_KEY header value")?,
        );
        headers.insert(
            "POLY_PASSPHRASE",
            HeaderValue::from_str(&credentials.passphrase)
                .context("invalid POLY_PASSPHRASE header value")?,
        );
        Ok(headers)
    }

    fn extract_credentials(raw: &Value) -> Result<ApiCredentials> {
        fn pick(value: &Value, candidates: &[&str]) -> Option<String> {
            for key in candidates {
                if let Some(v) = value.get(*key).and_then(|v| v.as_str()) {
                    if !v.trim().is_empty() {
                        return Some(v.to_string());
                    }
                }
            }
            None
        }

        let data = raw.get("data").unwrap_or(raw);
        let key = pick(data, &["apiKey", "api_key", "key", "id"])
            .context("missing api key in auth response")?;
        let secret = pick(data, &["secret", "apiSecret", "api_secret"])
            .context("missing api secret in auth response")?;
        let passphrase = pick(data, &["passphrase", "apiPassphrase", "api_passphrase"])
            .context("missing passphrase in auth response")?;
        Ok(ApiCredentials {
            key,
            secret,
            passphrase,
        })
    }

    /// Derive existing credentials for this wallet.
    /// Endpoint: GET /auth/derive-api-key
    pub async fn derive_api_key(
        &self,
        signer: &dyn WalletSigner,
        chain_id: u64,
    ) -> Result<ApiCredentials> {
        let headers = self.build_l1_headers(signer, chain_id).await?;
        let url = format!("{}/auth/derive-api-key", self.base_url);
        let response = self
            .client
            .get(&url)
            .headers(headers)
            .send()
            .await
            .context("failed GET /auth/derive-api-key")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("derive-api-key failed: {} [{}]", status, body);
        }

        let raw: Value = response
            .json()
            .await
            .context("failed parsing /auth/derive-api-key response")?;
        Self::extract_credentials(&raw)
    }

    /// Create fresh credentials for this wallet.
    /// Endpoint: POST /auth/api-key
    pub async fn create_api_key(
        &self,
        signer: &dyn WalletSigner,
        chain_id: u64,
    ) -> Result<ApiCredentials> {
        let headers = self.build_l1_headers(signer, chain_id).await?;
        let url = format!("{}/auth/api-key", self.base_url);
        let response = self
            .client
            .post(&url)
            .headers(headers)
            .body("{}")
            .send()
            .await
            .context("failed POST /auth/api-key")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("create-api-key failed: {} [{}]", status, body);
        }

        let raw: Value = response
            .json()
            .await
            .context("failed parsing /auth/api-key response")?;
        Self::extract_credentials(&raw)
    }

    /// Best price for a token and side.
    /// Endpoint: GET /price?token_id={id}&side={BUY|SELL}
    pub async fn get_price(&self, token_id: &str, side: Side) -> Result<f64> {
        let url = format!(
            "{}/price?token_id={}&side={}",
            self.base_url, token_id, side
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("failed to fetch price")?;

        if !response.status().is_success() {
            bail!("failed to get price: {}", response.status());
        }

        let resp: PriceResponse = response
            .json()
            .await
            .context("failed to parse price response")?;

        resp.price.parse().context("failed to parse price value")
    }

    /// Submit a signed order.
    /// Endpoint: POST /order
    pub async fn post_order(
        &self,
        order: &SignableOrder,
        signature: &str,
        address: Address,
        credentials: &ApiCredentials,
    ) -> Result<String> {
        let request_path = "/order";
        let url = format!("{}{}", self.base_url, request_path);

        let payload = serde_json::json!({
            "order": {
                "salt": order.salt.to_string(),
                "maker": to_lower_hex(order.maker),
                "signer": to_lower_hex(order.signer),
                "taker": to_lower_hex(order.taker),
                "tokenId": order.token_id,
                "makerAmount": order.maker_amount.to_string(),
                "takerAmount": order.taker_amount.to_string(),
                "expiration": order.expiration.to_string(),
                "nonce": order.nonce.to_string(),
                "feeRateBps": order.fee_rate_bps.to_string(),
                "side": order.side.to_string(),
                "signatureType": order.signature_type,
                "signature": signature
            },
            "owner": credentials.key,
            "orderType": "GTC"
        });

        let body =
            serde_json::to_string(&payload).context("failed to serialize order payload")?;
        let headers = self.build_l2_headers(address, credentials, "POST", request_path, &body)?;

        debug!(token_id = %order.token_id, side = %order.side, "posting order");

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .context("failed to post order")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            bail!("order rejected: {} - {}", status, text);
        }

        let raw: Value = response
            .json()
            .await
            .context("failed to parse order response")?;

        if let Some(id) = raw
            .get("orderID")
            .and_then(|v| v.as_str())
            .or_else(|| raw.get("orderId").and_then(|v| v.as_str()))
            .or_else(|| raw.get("order_id").and_then(|v| v.as_str()))
            .or_else(|| raw.get("id").and_then(|v| v.as_str()))
        {
            return Ok(id.to_string());
        }

        bail!("missing order id in order response: {}", raw)
    }

    /// Cancel a resting order.
    /// Endpoint: DELETE /order
    pub async fn cancel_order(
        &self,
        order_id: &str,
        address: Address,
        credentials: &ApiCredentials,
    ) -> Result<bool> {
        let request_path = "/order";
        let url = format!("{}{}", self.base_url, request_path);

        let body = serde_json::to_string(&serde_json::json!({ "orderID": order_id }))
            .context("failed to serialize cancel payload")?;
        let headers = self.build_l2_headers(address, credentials, "DELETE", request_path, &body)?;

        let response = self
            .client
            .delete(&url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .context("failed to cancel order")?;

        Ok(response.status().is_success())
    }

    /// Open orders for the authenticated wallet.
    /// Endpoint: GET /data/orders
    pub async fn get_open_orders(
        &self,
        address: Address,
        credentials: &ApiCredentials,
    ) -> Result<Vec<OpenOrder>> {
        let request_path = "/data/orders";
        let url = format!("{}{}", self.base_url, request_path);
        let headers = self.build_l2_headers(address, credentials, "GET", request_path, "")?;

        let response = self
            .client
            .get(&url)
            .headers(headers)
            .send()
            .await
            .context("failed to fetch open orders")?;

        if !response.status().is_success() {
            bail!("failed to get open orders: {}", response.status());
        }

        let orders: Vec<OpenOrder> = response
            .json()
            .await
            .context("failed to parse open orders response")?;

        Ok(orders)
    }
}
