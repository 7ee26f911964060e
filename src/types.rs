//! Core types used throughout PolyTrader
//!
//! Session records, order intents, and the wire shapes shared between the
//! session layer and the execution layer.

use chrono::Utc;
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order side (buy/sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Default for Side {
    fn default() -> Self {
        Side::Buy
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Venue API credentials (L2 auth). All three fields must be non-empty for
/// the credential to be usable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiCredentials {
    pub key: String,
    pub secret: String,
    pub passphrase: String,
}

impl ApiCredentials {
    pub fn is_valid(&self) -> bool {
        !self.key.trim().is_empty()
            && !self.secret.trim().is_empty()
            && !self.passphrase.trim().is_empty()
    }
}

/// Orchestration step for the trading session state machine.
///
/// Linear progression; any failure resets to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStep {
    Idle,
    Checking,
    Deploying,
    Credentials,
    Approvals,
    Complete,
}

impl SessionStep {
    /// True while an orchestration pass is running.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            SessionStep::Checking
                | SessionStep::Deploying
                | SessionStep::Credentials
                | SessionStep::Approvals
        )
    }
}

impl fmt::Display for SessionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStep::Idle => write!(f, "idle"),
            SessionStep::Checking => write!(f, "checking"),
            SessionStep::Deploying => write!(f, "deploying"),
            SessionStep::Credentials => write!(f, "credentials"),
            SessionStep::Approvals => write!(f, "approvals"),
            SessionStep::Complete => write!(f, "complete"),
        }
    }
}

/// Persisted trading session, one per EOA address.
///
/// Every flag is derived from the verified outcome of its orchestration step,
/// never assumed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradingSession {
    /// Externally-owned wallet address (session key).
    pub eoa_address: Address,
    /// Derived proxy-wallet address. Always re-derivable from `eoa_address`
    /// plus the chain contract config.
    pub safe_address: Address,
    /// Proxy wallet has on-chain code.
    pub is_safe_deployed: bool,
    pub has_api_credentials: bool,
    #[serde(default)]
    pub api_credentials: Option<ApiCredentials>,
    /// Collateral allowance to the settlement contract exceeds the threshold.
    pub has_approvals: bool,
    /// Timestamp (ms) of the last successful orchestration pass.
    pub last_checked: i64,
}

impl TradingSession {
    /// Fresh session with all step flags unset.
    pub fn new(eoa_address: Address, safe_address: Address) -> Self {
        Self {
            eoa_address,
            safe_address,
            is_safe_deployed: false,
            has_api_credentials: false,
            api_credentials: None,
            has_approvals: false,
            last_checked: Utc::now().timestamp_millis(),
        }
    }

    /// A session is complete iff all three flags hold with a populated,
    /// valid credential.
    pub fn is_complete(&self) -> bool {
        self.is_safe_deployed
            && self.has_api_credentials
            && self.has_approvals
            && self
                .api_credentials
                .as_ref()
                .map(|c| c.is_valid())
                .unwrap_or(false)
    }

    /// Credentials usable for venue auth, if the session carries any.
    pub fn valid_credentials(&self) -> Option<&ApiCredentials> {
        self.api_credentials.as_ref().filter(|c| c.is_valid())
    }
}

/// Ephemeral order intent; never persisted.
#[derive(Debug, Clone)]
pub struct OrderIntent {
    pub token_id: String,
    pub size: f64,
    /// Required for limit orders, must lie in (0, 1) exclusive.
    /// Absent for market orders (aggressive price is synthesized).
    pub price: Option<f64>,
    pub side: Side,
    pub neg_risk: bool,
    pub is_market_order: bool,
}

impl OrderIntent {
    /// Market order: price synthesized from the current book at submit time.
    pub fn market(token_id: impl Into<String>, size: f64, side: Side, neg_risk: bool) -> Self {
        Self {
            token_id: token_id.into(),
            size,
            price: None,
            side,
            neg_risk,
            is_market_order: true,
        }
    }

    /// Limit order at an explicit price.
    pub fn limit(
        token_id: impl Into<String>,
        size: f64,
        price: f64,
        side: Side,
        neg_risk: bool,
    ) -> Self {
        Self {
            token_id: token_id.into(),
            size,
            price: Some(price),
            side,
            neg_risk,
            is_market_order: false,
        }
    }
}

/// Wallet position from the venue Data API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Position {
    pub proxy_wallet: String,
    /// Outcome token id; also the key for pending-verification tracking.
    pub asset: String,
    pub condition_id: String,
    pub size: f64,
    pub avg_price: f64,
    pub initial_value: f64,
    pub current_value: f64,
    pub cur_price: f64,
    pub cash_pnl: f64,
    pub percent_pnl: f64,
    pub realized_pnl: f64,
    /// Market resolved; position can be redeemed for settlement value.
    pub redeemable: bool,
    pub title: String,
    pub slug: String,
    pub outcome: String,
    pub outcome_index: u32,
    pub opposite_asset: String,
    pub end_date: String,
    pub negative_risk: bool,
}

/// Open order as reported by the venue.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenOrder {
    pub id: String,
    pub status: String,
    pub owner: String,
    pub maker_address: String,
    pub market: String,
    pub asset_id: String,
    pub side: String,
    pub original_size: String,
    pub size_matched: String,
    pub price: String,
    pub outcome: String,
    pub created_at: i64,
    pub expiration: String,
    pub order_type: String,
}

impl OpenOrder {
    pub fn is_live(&self) -> bool {
        self.status.eq_ignore_ascii_case("LIVE")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> ApiCredentials {
        ApiCredentials {
            key: "k".to_string(),
            secret: "s".to_string(),
            passphrase: "p".to_string(),
        }
    }

    fn session() -> TradingSession {
        let mut s = TradingSession::new(Address::random(), Address::random());
        s.is_safe_deployed = true;
        s.has_api_credentials = true;
        s.api_credentials = Some(creds());
        s.has_approvals = true;
        s
    }

    #[test]
    fn complete_requires_all_flags_and_valid_credentials() {
        assert!(session().is_complete());

        let mut s = session();
        s.has_approvals = false;
        assert!(!s.is_complete());

        let mut s = session();
        s.api_credentials = None;
        assert!(!s.is_complete());

        let mut s = session();
        s.api_credentials = Some(ApiCredentials {
            key: "k".to_string(),
            secret: "".to_string(),
            passphrase: "p".to_string(),
        });
        assert!(!s.is_complete());
    }

    #[test]
    fn blank_credential_field_is_invalid() {
        let mut c = creds();
        assert!(c.is_valid());
        c.passphrase = "   ".to_string();
        assert!(!c.is_valid());
    }

    #[test]
    fn session_round_trips_through_json() {
        let s = session();
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("\"safeAddress\""));
        let back: TradingSession = serde_json::from_str(&json).unwrap();
        assert!(back.is_complete());
        assert_eq!(back.eoa_address, s.eoa_address);
    }

    #[test]
    fn in_flight_steps() {
        assert!(!SessionStep::Idle.is_in_flight());
        assert!(!SessionStep::Complete.is_in_flight());
        assert!(SessionStep::Checking.is_in_flight());
        assert!(SessionStep::Approvals.is_in_flight());
    }
}
