//! Position lifecycle
//!
//! Dust filtering, market sells, redemption of resolved markets, and the
//! bounded polling loop that watches for a just-submitted sell or redemption
//! to be reflected by the venue.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use ethers::abi::AbiEncode;
use ethers::types::{Address, H256, U256};
use reqwest::Client;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::ViewCache;
use crate::chain::{to_lower_hex, ContractConfig, RedeemPositionsCall};
use crate::error::CoreError;
use crate::execution::OrderExecutor;
use crate::relay::{RelayService, SafeTransaction};
use crate::types::{ApiCredentials, OrderIntent, Position, Side};

/// Positions below this size are hidden from every view.
pub const DUST_THRESHOLD: f64 = 0.01;

const POLL_INTERVAL: Duration = Duration::from_secs(2);
const POLL_DURATION: Duration = Duration::from_secs(30);

const POSITIONS_MAX_AGE: Duration = Duration::from_secs(10);

/// Read side of the venue's position data.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PositionSource: Send + Sync {
    async fn positions(&self, proxy: Address) -> Result<Vec<Position>>;
}

/// `PositionSource` backed by the venue Data API.
pub struct DataApiClient {
    client: Client,
    base_url: String,
}

impl DataApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build data API client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PositionSource for DataApiClient {
    async fn positions(&self, proxy: Address) -> Result<Vec<Position>> {
        let url = format!(
            "{}/positions?user={}&sizeThreshold={}&limit=500",
            self.base_url,
            to_lower_hex(proxy),
            DUST_THRESHOLD
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("failed to fetch positions")?;

        if !response.status().is_success() {
            bail!("failed to get positions: {}", response.status());
        }

        response
            .json()
            .await
            .context("failed to parse positions response")
    }
}

/// Hide dust. Size below the threshold always hides a position; the strict
/// variant additionally hides positions whose market value is dust even when
/// the share count is not.
pub fn filter_dust(positions: Vec<Position>, strict_value_filter: bool) -> Vec<Position> {
    positions
        .into_iter()
        .filter(|p| p.size >= DUST_THRESHOLD)
        .filter(|p| !strict_value_filter || p.current_value >= DUST_THRESHOLD)
        .collect()
}

pub struct PositionManager {
    source: Arc<dyn PositionSource>,
    executor: Arc<OrderExecutor>,
    relay: Arc<dyn RelayService>,
    cache: Arc<ViewCache>,
    contracts: ContractConfig,
    proxy: Address,
    /// asset -> size at the moment the sell/redeem was submitted.
    pending: Arc<Mutex<HashMap<String, f64>>>,
    polls: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl PositionManager {
    pub fn new(
        source: Arc<dyn PositionSource>,
        executor: Arc<OrderExecutor>,
        relay: Arc<dyn RelayService>,
        cache: Arc<ViewCache>,
        contracts: ContractConfig,
        proxy: Address,
    ) -> Self {
        Self {
            source,
            executor,
            relay,
            cache,
            contracts,
            proxy,
            pending: Arc::new(Mutex::new(HashMap::new())),
            polls: Mutex::new(HashMap::new()),
        }
    }

    /// Current positions with dust filtered out, served from cache when
    /// fresh. Filtered-out positions are not sellable through this manager.
    pub async fn positions(&self, strict_value_filter: bool) -> Result<Vec<Position>> {
        let raw = match self.cache.positions(POSITIONS_MAX_AGE) {
            Some(cached) => cached,
            None => {
                let fetched = self.source.positions(self.proxy).await?;
                self.cache.put_positions(fetched.clone());
                fetched
            }
        };
        Ok(filter_dust(raw, strict_value_filter))
    }

    /// Assets awaiting sell/redeem confirmation.
    pub fn pending_assets(&self) -> Vec<String> {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    /// Market-sell the full position, then poll until the venue reflects the
    /// size decrease or the window closes.
    pub async fn market_sell(
        &self,
        position: &Position,
        credentials: &ApiCredentials,
    ) -> Result<String> {
        if position.size < DUST_THRESHOLD {
            return Err(CoreError::validation(format!(
                "position {} is dust and cannot be sold",
                position.asset
            ))
            .into());
        }

        let intent = OrderIntent::market(
            position.asset.clone(),
            position.size,
            Side::Sell,
            position.negative_risk,
        );
        let order_id = self.executor.submit(&intent, credentials).await?;

        self.track(position.asset.clone(), position.size);
        self.cache.invalidate_positions();
        info!(asset = %position.asset, size = position.size, order_id, "position sell submitted");
        Ok(order_id)
    }

    /// Redeem a resolved position through the relay.
    ///
    /// Binary-outcome assumption: empty parent collection, index set
    /// `1 << outcomeIndex`.
    pub async fn redeem(&self, position: &Position) -> Result<H256> {
        if !position.redeemable {
            return Err(CoreError::validation(format!(
                "position {} is not redeemable",
                position.asset
            ))
            .into());
        }
        let condition_id: H256 = position
            .condition_id
            .parse()
            .map_err(|_| {
                CoreError::validation(format!(
                    "invalid condition id '{}'",
                    position.condition_id
                ))
            })?;
        let index_set = U256::one() << position.outcome_index;

        let call = RedeemPositionsCall {
            collateral_token: self.contracts.collateral,
            parent_collection_id: [0u8; 32],
            condition_id: condition_id.into(),
            index_sets: vec![index_set],
        };
        let tx = SafeTransaction {
            to: self.contracts.settlement,
            value: U256::zero(),
            data: call.encode().into(),
        };

        let hash = self.relay.execute(vec![tx], "position redemption").await?;

        self.track(position.asset.clone(), position.size);
        self.cache.invalidate_positions();
        self.cache.invalidate_balance();
        info!(asset = %position.asset, tx = %format!("{:#x}", hash), "position redeemed");
        Ok(hash)
    }

    /// Record the pending entry and start (or restart) the bounded polling
    /// loop for the asset. A new loop supersedes any previous one.
    fn track(&self, asset: String, original_size: f64) {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(asset.clone(), original_size);

        let source = self.source.clone();
        let cache = self.cache.clone();
        let pending = self.pending.clone();
        let proxy = self.proxy;
        let poll_asset = asset.clone();

        let handle = tokio::spawn(async move {
            let deadline = tokio::time::Instant::now() + POLL_DURATION;
            loop {
                tokio::time::sleep(POLL_INTERVAL).await;
                cache.invalidate_positions();

                match source.positions(proxy).await {
                    Ok(positions) => {
                        cache.put_positions(positions.clone());
                        let observed = positions
                            .iter()
                            .find(|p| p.asset == poll_asset)
                            .map(|p| p.size)
                            .unwrap_or(0.0);
                        let original = pending
                            .lock()
                            .unwrap_or_else(|e| e.into_inner())
                            .get(&poll_asset)
                            .copied();
                        match original {
                            Some(original) if observed < original => {
                                debug!(asset = %poll_asset, observed, original, "position change confirmed");
                                pending
                                    .lock()
                                    .unwrap_or_else(|e| e.into_inner())
                                    .remove(&poll_asset);
                                break;
                            }
                            // Entry gone: a teardown or supersession cleared it.
                            None => break,
                            _ => {}
                        }
                    }
                    Err(err) => warn!(%err, asset = %poll_asset, "position poll fetch failed"),
                }

                if tokio::time::Instant::now() >= deadline {
                    debug!(asset = %poll_asset, "verification window elapsed");
                    pending
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .remove(&poll_asset);
                    break;
                }
            }
        });

        let mut polls = self.polls.lock().unwrap_or_else(|e| e.into_inner());
        polls.retain(|_, handle| !handle.is_finished());
        if let Some(previous) = polls.insert(asset, handle) {
            previous.abort();
        }
    }

    /// Number of polling loops still running. Finished handles are pruned.
    pub fn active_polls(&self) -> usize {
        let mut polls = self.polls.lock().unwrap_or_else(|e| e.into_inner());
        polls.retain(|_, handle| !handle.is_finished());
        polls.len()
    }

    /// Abort all polling loops and drop pending entries.
    pub fn teardown(&self) {
        let mut polls = self.polls.lock().unwrap_or_else(|e| e.into_inner());
        for (_, handle) in polls.drain() {
            handle.abort();
        }
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

impl Drop for PositionManager {
    fn drop(&mut self) {
        self.teardown();
    }
}
