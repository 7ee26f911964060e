//! CLOB venue integration
//!
//! EIP-712 order signing, L1/L2 request auth, and the REST surface of the
//! exchange. `ClobClient` is the concrete venue; orchestration talks to it
//! through the `Venue` and `CredentialEndpoint` seams.

pub mod rest;
pub mod signing;
pub mod types;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use ethers::types::Address;

use crate::chain::ContractConfig;
use crate::session::credentials::CredentialEndpoint;
use crate::signer::WalletSigner;
use crate::types::{ApiCredentials, OpenOrder, Side};

use self::rest::RestClient;
use self::types::{NewOrder, SignableOrder};

/// Order-management surface of the exchange.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Venue: Send + Sync {
    /// Current best price for a token and side.
    async fn best_price(&self, token_id: &str, side: Side) -> Result<f64>;

    /// Sign and submit an order, returning the venue order id.
    async fn place_order(&self, order: &NewOrder, credentials: &ApiCredentials)
        -> Result<String>;

    async fn cancel_order(&self, order_id: &str, credentials: &ApiCredentials) -> Result<bool>;

    async fn open_orders(&self, credentials: &ApiCredentials) -> Result<Vec<OpenOrder>>;
}

/// Concrete CLOB venue bound to one wallet pair (EOA signer, Safe funder).
pub struct ClobClient {
    rest: RestClient,
    signer: Arc<dyn WalletSigner>,
    contracts: ContractConfig,
    /// Funding wallet; orders settle against this address.
    funder: Address,
}

impl ClobClient {
    pub fn new(
        base_url: &str,
        signer: Arc<dyn WalletSigner>,
        contracts: ContractConfig,
        funder: Address,
    ) -> Result<Self> {
        Ok(Self {
            rest: RestClient::new(base_url)?,
            signer,
            contracts,
            funder,
        })
    }

    fn exchange_for(&self, neg_risk: bool) -> Address {
        if neg_risk {
            self.contracts.neg_risk_exchange
        } else {
            self.contracts.exchange
        }
    }
}

#[async_trait]
impl Venue for ClobClient {
    async fn best_price(&self, token_id: &str, side: Side) -> Result<f64> {
        self.rest.get_price(token_id, side).await
    }

    async fn place_order(
        &self,
        order: &NewOrder,
        credentials: &ApiCredentials,
    ) -> Result<String> {
        let signable = SignableOrder::from_new_order(order, self.funder, self.signer.address());
        let typed = signing::order_typed_data(
            &signable,
            self.contracts.chain_id,
            self.exchange_for(order.neg_risk),
        )?;
        let signature = self
            .signer
            .sign_typed_data(&typed)
            .await
            .context("order signature failed")?;

        self.rest
            .post_order(&signable, &signature, self.signer.address(), credentials)
            .await
    }

    async fn cancel_order(&self, order_id: &str, credentials: &ApiCredentials) -> Result<bool> {
        self.rest
            .cancel_order(order_id, self.signer.address(), credentials)
            .await
    }

    async fn open_orders(&self, credentials: &ApiCredentials) -> Result<Vec<OpenOrder>> {
        let orders = self
            .rest
            .get_open_orders(self.signer.address(), credentials)
            .await?;
        let funder = crate::chain::to_lower_hex(self.funder);
        Ok(orders
            .into_iter()
            .filter(|o| o.is_live())
            .filter(|o| {
                o.maker_address.is_empty() || o.maker_address.eq_ignore_ascii_case(&funder)
            })
            .collect())
    }
}

#[async_trait]
impl CredentialEndpoint for ClobClient {
    async fn derive_credentials(&self) -> Result<ApiCredentials> {
        self.rest
            .derive_api_key(self.signer.as_ref(), self.contracts.chain_id)
            .await
    }

    async fn create_credentials(&self) -> Result<ApiCredentials> {
        self.rest
            .create_api_key(self.signer.as_ref(), self.contracts.chain_id)
            .await
    }
}
