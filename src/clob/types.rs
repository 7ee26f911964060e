//! CLOB Types - Data structures for the venue REST API

use ethers::types::{Address, U256};
use serde::Deserialize;

use crate::types::Side;

/// Engine-facing order parameters after pricing has been resolved.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub token_id: String,
    /// Limit price in (0, 1).
    pub price: f64,
    /// Size in shares.
    pub size: f64,
    pub side: Side,
    /// Routes the order to the negative-risk exchange domain.
    pub neg_risk: bool,
}

/// Fully-populated order ready for EIP-712 signing and submission.
#[derive(Debug, Clone)]
pub struct SignableOrder {
    pub salt: U256,
    /// Funding wallet (the proxy/Safe wallet).
    pub maker: Address,
    /// EOA that produces the signature.
    pub signer: Address,
    /// Zero address = open to any taker.
    pub taker: Address,
    pub token_id: String,
    pub maker_amount: U256,
    pub taker_amount: U256,
    /// 0 = good-till-cancelled.
    pub expiration: u64,
    pub nonce: u64,
    pub fee_rate_bps: u32,
    pub side: Side,
    /// 2 = Safe wallet signature.
    pub signature_type: u8,
}

impl SignableOrder {
    /// Build an order with amounts scaled to 6-decimal fixed point.
    ///
    /// BUY: makerAmount is the USDC notional, takerAmount the shares.
    /// SELL: makerAmount is the shares, takerAmount the USDC notional.
    pub fn from_new_order(order: &NewOrder, maker: Address, signer: Address) -> Self {
        let shares_scaled = (order.size.max(0.0) * 1_000_000.0).round() as u128;
        let usdc_scaled = (order.size.max(0.0) * order.price.max(0.0) * 1_000_000.0).round() as u128;
        let (maker_amount, taker_amount) = match order.side {
            Side::Buy => (U256::from(usdc_scaled), U256::from(shares_scaled)),
            Side::Sell => (U256::from(shares_scaled), U256::from(usdc_scaled)),
        };

        Self {
            salt: U256::from(rand::random::<u64>()),
            maker,
            signer,
            taker: Address::zero(),
            token_id: order.token_id.clone(),
            maker_amount,
            taker_amount,
            expiration: 0,
            nonce: rand::random::<u64>(),
            fee_rate_bps: 0,
            side: order.side,
            signature_type: 2,
        }
    }
}

/// Best-price response for a token/side.
#[derive(Debug, Clone, Deserialize)]
pub struct PriceResponse {
    pub price: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_order(side: Side) -> NewOrder {
        NewOrder {
            token_id: "123".to_string(),
            price: 0.40,
            size: 10.0,
            side,
            neg_risk: false,
        }
    }

    #[test]
    fn buy_amounts_put_notional_on_maker_side() {
        let maker = Address::random();
        let signer = Address::random();
        let order = SignableOrder::from_new_order(&new_order(Side::Buy), maker, signer);
        assert_eq!(order.maker_amount, U256::from(4_000_000u64));
        assert_eq!(order.taker_amount, U256::from(10_000_000u64));
        assert_eq!(order.signature_type, 2);
        assert_eq!(order.taker, Address::zero());
    }

    #[test]
    fn sell_amounts_put_shares_on_maker_side() {
        let order = SignableOrder::from_new_order(
            &new_order(Side::Sell),
            Address::random(),
            Address::random(),
        );
        assert_eq!(order.maker_amount, U256::from(10_000_000u64));
        assert_eq!(order.taker_amount, U256::from(4_000_000u64));
    }
}
