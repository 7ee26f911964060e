//! Gasless relay client
//!
//! Submits Safe deployments and meta-transactions to the relay service and
//! waits for them to land. The relay pays gas; the wallet only signs.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use ethers::types::transaction::eip712::{EIP712Domain, Eip712DomainType, TypedData, Types};
use ethers::types::{Address, Bytes, H256, U256};
use reqwest::{
    header::{HeaderMap, HeaderValue, CONTENT_TYPE},
    Client,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::chain::{to_lower_hex, ContractConfig};
use crate::signer::WalletSigner;

const POLL_INTERVAL: Duration = Duration::from_secs(2);
const POLL_ATTEMPTS: usize = 60;

const RELAY_DOMAIN: &str = "Polymarket Contract Proxy";
const RELAY_DOMAIN_VERSION: &str = "1";

/// One call inside a relayed batch.
#[derive(Debug, Clone)]
pub struct SafeTransaction {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

/// Result of a deployment request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    /// Relay accepted and mined the deployment.
    Deployed(H256),
    /// The proxy already existed; nothing was submitted.
    AlreadyDeployed,
}

/// Gasless execution surface. Deployment status, proxy deployment, and
/// batched meta-transactions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RelayService: Send + Sync {
    /// Whether the relay reports the proxy as deployed.
    async fn get_deployed(&self, safe: Address) -> Result<bool>;

    /// Deploy the proxy wallet for the bound EOA. Costs one signature unless
    /// the relay reports the proxy as already deployed.
    async fn deploy(&self) -> Result<DeployOutcome>;

    /// Sign and relay a batch of calls through the proxy. Costs one
    /// signature. Resolves once the relay reports the transaction mined.
    async fn execute(&self, txs: Vec<SafeTransaction>, description: &str) -> Result<H256>;
}

#[derive(Debug, Deserialize)]
struct RelayTaskResponse {
    #[serde(rename = "transactionID")]
    transaction_id: String,
}

/// Outcome of a `/submit` call before task polling.
enum SubmitOutcome {
    Task(String),
    AlreadyDeployed,
}

/// The relay rejects a deployment for an existing proxy with a descriptive
/// body instead of a dedicated status code.
fn is_already_deployed_response(body: &str) -> bool {
    let body = body.to_ascii_lowercase();
    body.contains("already deployed") || body.contains("already exists")
}

#[derive(Debug, Deserialize)]
struct RelayTaskState {
    state: String,
    #[serde(rename = "transactionHash")]
    transaction_hash: Option<String>,
}

/// `RelayService` backed by the HTTP relay.
pub struct HttpRelayClient {
    client: Client,
    base_url: String,
    signer: Arc<dyn WalletSigner>,
    contracts: ContractConfig,
}

impl HttpRelayClient {
    pub fn new(
        base_url: &str,
        signer: Arc<dyn WalletSigner>,
        contracts: ContractConfig,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .default_headers(headers)
            .build()
            .context("failed to build relay HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            signer,
            contracts,
        })
    }

    /// Typed data the relay verifies before executing a batch.
    fn batch_typed_data(&self, txs: &[SafeTransaction]) -> TypedData {
        let domain = EIP712Domain {
            name: Some(RELAY_DOMAIN.to_string()),
            version: Some(RELAY_DOMAIN_VERSION.to_string()),
            chain_id: Some(self.contracts.chain_id.into()),
            verifying_contract: Some(self.contracts.safe_factory),
            salt: None,
        };

        let mut types: Types = BTreeMap::new();
        types.insert(
            "Transaction".to_string(),
            vec![
                Eip712DomainType {
                    name: "to".to_string(),
                    r#type: "address".to_string(),
                },
                Eip712DomainType {
                    name: "value".to_string(),
                    r#type: "uint256".to_string(),
                },
                Eip712DomainType {
                    name: "data".to_string(),
                    r#type: "bytes".to_string(),
                },
            ],
        );
        types.insert(
            "TransactionBatch".to_string(),
            vec![Eip712DomainType {
                name: "transactions".to_string(),
                r#type: "Transaction[]".to_string(),
            }],
        );

        let transactions: Vec<Value> = txs
            .iter()
            .map(|tx| {
                serde_json::json!({
                    "to": to_lower_hex(tx.to),
                    "value": tx.value.to_string(),
                    "data": format!("{}", tx.data),
                })
            })
            .collect();

        let mut message = BTreeMap::<String, Value>::new();
        message.insert("transactions".to_string(), Value::Array(transactions));

        TypedData {
            domain,
            types,
            primary_type: "TransactionBatch".to_string(),
            message,
        }
    }

    async fn submit(&self, path: &str, payload: &Value) -> Result<SubmitOutcome> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .with_context(|| format!("failed POST {}", path))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            if is_already_deployed_response(&body) {
                return Ok(SubmitOutcome::AlreadyDeployed);
            }
            bail!("relay rejected {}: {} [{}]", path, status, body);
        }

        let task: RelayTaskResponse = response
            .json()
            .await
            .with_context(|| format!("failed parsing {} response", path))?;
        Ok(SubmitOutcome::Task(task.transaction_id))
    }

    /// Poll the relay until the task is mined or fails.
    async fn wait_for_task(&self, transaction_id: &str) -> Result<H256> {
        let url = format!(
            "{}/transaction?id={}",
            self.base_url, transaction_id
        );

        for _ in 0..POLL_ATTEMPTS {
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .context("failed to poll relay task")?;

            if response.status().is_success() {
                let state: RelayTaskState = response
                    .json()
                    .await
                    .context("failed parsing relay task state")?;
                debug!(transaction_id, state = %state.state, "relay task state");

                match state.state.as_str() {
                    "STATE_EXECUTED" | "STATE_MINED" | "STATE_CONFIRMED" => {
                        let hash = state
                            .transaction_hash
                            .context("mined relay task missing transaction hash")?;
                        return hash
                            .parse()
                            .context("invalid transaction hash from relay");
                    }
                    "STATE_FAILED" => bail!("relay task {} failed", transaction_id),
                    _ => {}
                }
            }

            tokio::time::sleep(POLL_INTERVAL).await;
        }

        bail!("relay task {} did not complete in time", transaction_id)
    }
}

#[async_trait]
impl RelayService for HttpRelayClient {
    async fn get_deployed(&self, safe: Address) -> Result<bool> {
        let url = format!("{}/deployed?address={}", self.base_url, to_lower_hex(safe));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("failed GET /deployed")?;

        if !response.status().is_success() {
            bail!("relay deployed query failed: {}", response.status());
        }

        let raw: Value = response
            .json()
            .await
            .context("failed parsing /deployed response")?;
        raw.get("deployed")
            .and_then(|v| v.as_bool())
            .context("missing deployed flag in relay response")
    }

    async fn deploy(&self) -> Result<DeployOutcome> {
        // An empty batch signed by the EOA triggers proxy creation.
        let typed = self.batch_typed_data(&[]);
        let signature = self
            .signer
            .sign_typed_data(&typed)
            .await
            .context("deployment signature failed")?;

        let payload = serde_json::json!({
            "from": to_lower_hex(self.signer.address()),
            "signature": signature,
            "data": [],
            "type": "SAFE-CREATE",
        });

        match self.submit("/submit", &payload).await? {
            SubmitOutcome::AlreadyDeployed => {
                info!("relay reported the proxy as already deployed");
                Ok(DeployOutcome::AlreadyDeployed)
            }
            SubmitOutcome::Task(transaction_id) => {
                let hash = self.wait_for_task(&transaction_id).await?;
                info!(tx = %format!("{:#x}", hash), "proxy wallet deployed");
                Ok(DeployOutcome::Deployed(hash))
            }
        }
    }

    async fn execute(&self, txs: Vec<SafeTransaction>, description: &str) -> Result<H256> {
        let typed = self.batch_typed_data(&txs);
        let signature = self
            .signer
            .sign_typed_data(&typed)
            .await
            .with_context(|| format!("signature failed for {}", description))?;

        let data: Vec<Value> = txs
            .iter()
            .map(|tx| {
                serde_json::json!({
                    "to": to_lower_hex(tx.to),
                    "value": tx.value.to_string(),
                    "data": format!("{}", tx.data),
                })
            })
            .collect();

        let payload = serde_json::json!({
            "from": to_lower_hex(self.signer.address()),
            "signature": signature,
            "data": data,
            "type": "SAFE",
        });

        let transaction_id = match self.submit("/submit", &payload).await? {
            SubmitOutcome::Task(transaction_id) => transaction_id,
            SubmitOutcome::AlreadyDeployed => {
                bail!("unexpected already-deployed relay answer for {}", description)
            }
        };
        let hash = self.wait_for_task(&transaction_id).await?;
        info!(tx = %format!("{:#x}", hash), description, "relayed batch mined");
        Ok(hash)
    }
}
