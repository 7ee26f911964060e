//! Order execution
//!
//! The venue only accepts limit orders, so a "market order" is emulated as a
//! GTC limit at an aggressive price derived from the current best price.
//! Limit orders pass the caller's price through after range validation.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::cache::ViewCache;
use crate::clob::types::NewOrder;
use crate::clob::Venue;
use crate::error::CoreError;
use crate::types::{ApiCredentials, OpenOrder, OrderIntent, Side};

const OPEN_ORDERS_MAX_AGE: Duration = Duration::from_secs(10);

fn usable_price(price: f64) -> bool {
    price.is_finite() && price > 0.0 && price < 1.0
}

/// Aggressive limit price that emulates a market order.
///
/// BUY pays up to 5% over the market, capped at 0.99; SELL accepts down to
/// 5% under, floored at 0.01. An unusable or missing market price falls back
/// to the extreme.
pub fn aggressive_price(side: Side, market_price: Option<f64>) -> f64 {
    let market_price = market_price.filter(|p| usable_price(*p));
    match side {
        Side::Buy => market_price.map(|p| (p * 1.05).min(0.99)).unwrap_or(0.99),
        Side::Sell => market_price.map(|p| (p * 0.95).max(0.01)).unwrap_or(0.01),
    }
}

pub struct OrderExecutor {
    venue: Arc<dyn Venue>,
    cache: Arc<ViewCache>,
}

impl OrderExecutor {
    pub fn new(venue: Arc<dyn Venue>, cache: Arc<ViewCache>) -> Self {
        Self { venue, cache }
    }

    async fn resolve_price(&self, intent: &OrderIntent) -> Result<f64> {
        if intent.is_market_order {
            let market_price = match self.venue.best_price(&intent.token_id, intent.side).await {
                Ok(price) => Some(price),
                Err(err) => {
                    warn!(%err, token_id = %intent.token_id, "price query failed, using extreme fallback");
                    None
                }
            };
            let price = aggressive_price(intent.side, market_price);
            debug!(?market_price, price, side = %intent.side, "aggressive price computed");
            Ok(price)
        } else {
            let price = intent.price.ok_or_else(|| {
                CoreError::validation("limit order requires an explicit price")
            })?;
            if !usable_price(price) {
                return Err(CoreError::validation(format!(
                    "limit price {} outside (0, 1)",
                    price
                ))
                .into());
            }
            Ok(price)
        }
    }

    /// Build, sign, and submit an order. Returns the venue order id; a
    /// success response without one is treated as failure.
    pub async fn submit(
        &self,
        intent: &OrderIntent,
        credentials: &ApiCredentials,
    ) -> Result<String> {
        if !(intent.size.is_finite() && intent.size > 0.0) {
            return Err(
                CoreError::validation(format!("order size {} must be positive", intent.size))
                    .into(),
            );
        }

        let price = self.resolve_price(intent).await?;
        let order = NewOrder {
            token_id: intent.token_id.clone(),
            price,
            size: intent.size,
            side: intent.side,
            neg_risk: intent.neg_risk,
        };

        let order_id = self.venue.place_order(&order, credentials).await?;
        if order_id.trim().is_empty() {
            return Err(
                CoreError::Upstream("venue accepted order without returning an id".to_string())
                    .into(),
            );
        }

        self.cache.invalidate_trading_views();
        info!(order_id, token_id = %intent.token_id, side = %intent.side, size = intent.size, price, "order submitted");
        Ok(order_id)
    }

    /// Cancel by id. Not retried; failure surfaces directly.
    pub async fn cancel(&self, order_id: &str, credentials: &ApiCredentials) -> Result<()> {
        let cancelled = self.venue.cancel_order(order_id, credentials).await?;
        if !cancelled {
            return Err(CoreError::Upstream(format!(
                "venue declined to cancel order {}",
                order_id
            ))
            .into());
        }
        self.cache.invalidate_open_orders();
        info!(order_id, "order cancelled");
        Ok(())
    }

    /// Live open orders, served from cache when fresh.
    pub async fn open_orders(&self, credentials: &ApiCredentials) -> Result<Vec<OpenOrder>> {
        if let Some(orders) = self.cache.open_orders(OPEN_ORDERS_MAX_AGE) {
            return Ok(orders);
        }
        let orders = self.venue.open_orders(credentials).await?;
        self.cache.put_open_orders(orders.clone());
        Ok(orders)
    }
}
