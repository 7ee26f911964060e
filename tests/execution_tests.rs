//! Order execution and position lifecycle against a scripted venue.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ethers::abi::AbiDecode;
use ethers::types::{Address, H256, U256};

use polytrader::cache::ViewCache;
use polytrader::chain::{contract_config, RedeemPositionsCall};
use polytrader::clob::types::NewOrder;
use polytrader::clob::Venue;
use polytrader::execution::OrderExecutor;
use polytrader::positions::{PositionManager, PositionSource, DUST_THRESHOLD};
use polytrader::relay::{DeployOutcome, RelayService, SafeTransaction};
use polytrader::types::{ApiCredentials, OpenOrder, OrderIntent, Position, Side};

fn creds() -> ApiCredentials {
    ApiCredentials {
        key: "key".to_string(),
        secret: "secret".to_string(),
        passphrase: "pass".to_string(),
    }
}

#[derive(Default)]
struct FakeVenue {
    best_price: Mutex<Option<f64>>,
    posted: Mutex<Vec<NewOrder>>,
}

#[async_trait]
impl Venue for FakeVenue {
    async fn best_price(&self, _token_id: &str, _side: Side) -> Result<f64> {
        self.best_price
            .lock()
            .unwrap()
            .ok_or_else(|| anyhow!("price unavailable"))
    }

    async fn place_order(
        &self,
        order: &NewOrder,
        _credentials: &ApiCredentials,
    ) -> Result<String> {
        self.posted.lock().unwrap().push(order.clone());
        Ok(format!("order-{}", self.posted.lock().unwrap().len()))
    }

    async fn cancel_order(&self, _order_id: &str, _credentials: &ApiCredentials) -> Result<bool> {
        Ok(true)
    }

    async fn open_orders(&self, _credentials: &ApiCredentials) -> Result<Vec<OpenOrder>> {
        Ok(vec![])
    }
}

/// Position feed whose reported size drops after a set number of fetches.
struct ShrinkingSource {
    asset: String,
    initial_size: f64,
    final_size: f64,
    calls_before_shrink: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl PositionSource for ShrinkingSource {
    async fn positions(&self, _proxy: Address) -> Result<Vec<Position>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let size = if call < self.calls_before_shrink {
            self.initial_size
        } else {
            self.final_size
        };
        Ok(vec![Position {
            asset: self.asset.clone(),
            size,
            current_value: size * 0.5,
            ..Position::default()
        }])
    }
}

#[derive(Default)]
struct RecordingRelay {
    batches: Mutex<Vec<Vec<SafeTransaction>>>,
}

#[async_trait]
impl RelayService for RecordingRelay {
    async fn get_deployed(&self, _safe: Address) -> Result<bool> {
        Ok(true)
    }

    async fn deploy(&self) -> Result<DeployOutcome> {
        Ok(DeployOutcome::AlreadyDeployed)
    }

    async fn execute(&self, txs: Vec<SafeTransaction>, _description: &str) -> Result<H256> {
        self.batches.lock().unwrap().push(txs);
        Ok(H256::random())
    }
}

fn manager_with(
    source: Arc<dyn PositionSource>,
    venue: Arc<FakeVenue>,
    relay: Arc<RecordingRelay>,
) -> (PositionManager, Arc<ViewCache>) {
    let cache = Arc::new(ViewCache::new());
    let executor = Arc::new(OrderExecutor::new(venue, cache.clone()));
    let manager = PositionManager::new(
        source,
        executor,
        relay,
        cache.clone(),
        contract_config(137).unwrap(),
        Address::random(),
    );
    (manager, cache)
}

#[tokio::test]
async fn market_buy_prices_aggressively_from_the_book() {
    let venue = Arc::new(FakeVenue::default());
    *venue.best_price.lock().unwrap() = Some(0.50);

    let executor = OrderExecutor::new(venue.clone(), Arc::new(ViewCache::new()));
    executor
        .submit(&OrderIntent::market("77", 10.0, Side::Buy, true), &creds())
        .await
        .unwrap();

    let posted = venue.posted.lock().unwrap();
    assert_eq!(posted.len(), 1);
    assert!((posted[0].price - 0.525).abs() < 1e-9);
    assert_eq!(posted[0].side, Side::Buy);
    assert!(posted[0].neg_risk);
}

#[tokio::test]
async fn price_outage_falls_back_to_extreme_prices() {
    let venue = Arc::new(FakeVenue::default());

    let executor = OrderExecutor::new(venue.clone(), Arc::new(ViewCache::new()));
    executor
        .submit(&OrderIntent::market("77", 10.0, Side::Buy, false), &creds())
        .await
        .unwrap();
    executor
        .submit(&OrderIntent::market("77", 10.0, Side::Sell, false), &creds())
        .await
        .unwrap();

    let posted = venue.posted.lock().unwrap();
    assert_eq!(posted[0].price, 0.99);
    assert_eq!(posted[1].price, 0.01);
}

#[tokio::test]
async fn limit_order_passes_the_explicit_price_through() {
    let venue = Arc::new(FakeVenue::default());
    *venue.best_price.lock().unwrap() = Some(0.50);

    let executor = OrderExecutor::new(venue.clone(), Arc::new(ViewCache::new()));
    executor
        .submit(
            &OrderIntent::limit("77", 3.0, 0.42, Side::Sell, false),
            &creds(),
        )
        .await
        .unwrap();

    let posted = venue.posted.lock().unwrap();
    assert_eq!(posted[0].price, 0.42);
}

#[tokio::test(start_paused = true)]
async fn sell_polling_clears_pending_once_size_drops() {
    let venue = Arc::new(FakeVenue::default());
    *venue.best_price.lock().unwrap() = Some(0.60);
    let source = Arc::new(ShrinkingSource {
        asset: "asset-1".to_string(),
        initial_size: 100.0,
        final_size: 0.0,
        calls_before_shrink: 2,
        calls: AtomicUsize::new(0),
    });
    let (manager, _cache) = manager_with(source, venue.clone(), Arc::new(RecordingRelay::default()));

    let position = Position {
        asset: "asset-1".to_string(),
        size: 100.0,
        ..Position::default()
    };
    manager.market_sell(&position, &creds()).await.unwrap();
    assert_eq!(manager.pending_assets(), vec!["asset-1".to_string()]);

    // Full-position SELL went out.
    {
        let posted = venue.posted.lock().unwrap();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].side, Side::Sell);
        assert_eq!(posted[0].size, 100.0);
    }

    for _ in 0..60 {
        if manager.pending_assets().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    assert!(manager.pending_assets().is_empty());
}

#[tokio::test(start_paused = true)]
async fn sell_polling_gives_up_after_the_window() {
    let venue = Arc::new(FakeVenue::default());
    *venue.best_price.lock().unwrap() = Some(0.60);
    // Size never drops.
    let source = Arc::new(ShrinkingSource {
        asset: "asset-2".to_string(),
        initial_size: 100.0,
        final_size: 100.0,
        calls_before_shrink: 0,
        calls: AtomicUsize::new(0),
    });
    let (manager, _cache) = manager_with(source, venue, Arc::new(RecordingRelay::default()));

    let position = Position {
        asset: "asset-2".to_string(),
        size: 100.0,
        ..Position::default()
    };
    manager.market_sell(&position, &creds()).await.unwrap();

    tokio::time::sleep(Duration::from_secs(40)).await;
    assert!(manager.pending_assets().is_empty());
}

#[tokio::test(start_paused = true)]
async fn finished_polls_are_pruned() {
    let venue = Arc::new(FakeVenue::default());
    *venue.best_price.lock().unwrap() = Some(0.60);
    let source = Arc::new(ShrinkingSource {
        asset: "asset-3".to_string(),
        initial_size: 100.0,
        final_size: 0.0,
        calls_before_shrink: 1,
        calls: AtomicUsize::new(0),
    });
    let (manager, _cache) = manager_with(source, venue, Arc::new(RecordingRelay::default()));

    let position = Position {
        asset: "asset-3".to_string(),
        size: 100.0,
        ..Position::default()
    };
    manager.market_sell(&position, &creds()).await.unwrap();
    assert_eq!(manager.active_polls(), 1);

    for _ in 0..60 {
        if manager.active_polls() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    assert_eq!(manager.active_polls(), 0);
    assert!(manager.pending_assets().is_empty());
}

#[tokio::test]
async fn dust_positions_cannot_be_sold() {
    let venue = Arc::new(FakeVenue::default());
    let source = Arc::new(ShrinkingSource {
        asset: "dust".to_string(),
        initial_size: 0.005,
        final_size: 0.005,
        calls_before_shrink: 0,
        calls: AtomicUsize::new(0),
    });
    let (manager, _cache) = manager_with(source, venue.clone(), Arc::new(RecordingRelay::default()));

    let position = Position {
        asset: "dust".to_string(),
        size: DUST_THRESHOLD / 2.0,
        ..Position::default()
    };
    assert!(manager.market_sell(&position, &creds()).await.is_err());
    assert!(venue.posted.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn redeem_targets_the_settlement_contract_with_the_outcome_bitmask() {
    let venue = Arc::new(FakeVenue::default());
    let relay = Arc::new(RecordingRelay::default());
    let source = Arc::new(ShrinkingSource {
        asset: "winner".to_string(),
        initial_size: 50.0,
        final_size: 0.0,
        calls_before_shrink: 1,
        calls: AtomicUsize::new(0),
    });
    let (manager, cache) = manager_with(source, venue, relay.clone());
    cache.put_balance(10.0);

    let contracts = contract_config(137).unwrap();
    let position = Position {
        asset: "winner".to_string(),
        size: 50.0,
        condition_id: format!("{:#x}", H256::random()),
        outcome_index: 1,
        redeemable: true,
        ..Position::default()
    };
    manager.redeem(&position).await.unwrap();

    // Balance view is stale after a redemption.
    assert!(cache.balance(Duration::from_secs(60)).is_none());

    let batches = relay.batches.lock().unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 1);
    assert_eq!(batches[0][0].to, contracts.settlement);

    let call = RedeemPositionsCall::decode(&batches[0][0].data).unwrap();
    assert_eq!(call.collateral_token, contracts.collateral);
    assert_eq!(call.parent_collection_id, [0u8; 32]);
    assert_eq!(call.index_sets, vec![U256::from(2u64)]);
}

#[tokio::test]
async fn unresolved_positions_cannot_be_redeemed() {
    let venue = Arc::new(FakeVenue::default());
    let relay = Arc::new(RecordingRelay::default());
    let source = Arc::new(ShrinkingSource {
        asset: "open".to_string(),
        initial_size: 50.0,
        final_size: 50.0,
        calls_before_shrink: 0,
        calls: AtomicUsize::new(0),
    });
    let (manager, _cache) = manager_with(source, venue, relay.clone());

    let position = Position {
        asset: "open".to_string(),
        size: 50.0,
        redeemable: false,
        ..Position::default()
    };
    assert!(manager.redeem(&position).await.is_err());
    assert!(relay.batches.lock().unwrap().is_empty());
}

#[tokio::test]
async fn dust_filtering_applies_to_the_positions_view() {
    let venue = Arc::new(FakeVenue::default());
    let source = Arc::new(ShrinkingSource {
        asset: "tiny".to_string(),
        initial_size: 0.005,
        final_size: 0.005,
        calls_before_shrink: 0,
        calls: AtomicUsize::new(0),
    });
    let (manager, _cache) = manager_with(source, venue, Arc::new(RecordingRelay::default()));

    assert!(manager.positions(false).await.unwrap().is_empty());
}
