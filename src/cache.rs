//! Cached venue views
//!
//! Positions, open orders, and collateral balance as last fetched. Mutations
//! (order submit/cancel, sell, redeem) invalidate the affected slots;
//! consistency is eventual, bounded by the next poll or fetch.

use std::sync::RwLock;
use std::time::{Duration, Instant};

use crate::types::{OpenOrder, Position};

struct Slot<T> {
    value: T,
    fetched_at: Instant,
}

struct CachedView<T> {
    slot: RwLock<Option<Slot<T>>>,
}

impl<T: Clone> CachedView<T> {
    fn new() -> Self {
        Self {
            slot: RwLock::new(None),
        }
    }

    fn get(&self, max_age: Duration) -> Option<T> {
        let slot = self.slot.read().unwrap_or_else(|e| e.into_inner());
        slot.as_ref()
            .filter(|s| s.fetched_at.elapsed() <= max_age)
            .map(|s| s.value.clone())
    }

    fn put(&self, value: T) {
        let mut slot = self.slot.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(Slot {
            value,
            fetched_at: Instant::now(),
        });
    }

    fn invalidate(&self) {
        let mut slot = self.slot.write().unwrap_or_else(|e| e.into_inner());
        *slot = None;
    }
}

/// Per-wallet cache of venue reads.
pub struct ViewCache {
    positions: CachedView<Vec<Position>>,
    open_orders: CachedView<Vec<OpenOrder>>,
    balance: CachedView<f64>,
}

impl ViewCache {
    pub fn new() -> Self {
        Self {
            positions: CachedView::new(),
            open_orders: CachedView::new(),
            balance: CachedView::new(),
        }
    }

    pub fn positions(&self, max_age: Duration) -> Option<Vec<Position>> {
        self.positions.get(max_age)
    }

    pub fn put_positions(&self, positions: Vec<Position>) {
        self.positions.put(positions);
    }

    pub fn open_orders(&self, max_age: Duration) -> Option<Vec<OpenOrder>> {
        self.open_orders.get(max_age)
    }

    pub fn put_open_orders(&self, orders: Vec<OpenOrder>) {
        self.open_orders.put(orders);
    }

    pub fn balance(&self, max_age: Duration) -> Option<f64> {
        self.balance.get(max_age)
    }

    pub fn put_balance(&self, balance: f64) {
        self.balance.put(balance);
    }

    pub fn invalidate_positions(&self) {
        self.positions.invalidate();
    }

    pub fn invalidate_open_orders(&self) {
        self.open_orders.invalidate();
    }

    pub fn invalidate_balance(&self) {
        self.balance.invalidate();
    }

    /// After an order mutation both order and position views are stale.
    pub fn invalidate_trading_views(&self) {
        self.positions.invalidate();
        self.open_orders.invalidate();
    }
}

impl Default for ViewCache {
    fn default() -> Self {
        Self::new()
    }
}
