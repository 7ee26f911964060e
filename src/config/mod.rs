//! Configuration management for PolyTrader
//!
//! Loads from optional config files + environment variables via .env

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub chain: ChainConfig,
    pub venue: VenueConfig,
    pub session: SessionConfig,
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    /// Polygon chain ID (137)
    pub chain_id: u64,
    /// JSON-RPC endpoint for bytecode/allowance reads
    pub rpc_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VenueConfig {
    /// CLOB API endpoint
    pub clob_url: String,
    /// Gamma API endpoint (market listings)
    pub gamma_url: String,
    /// Data API endpoint (positions)
    pub data_api_url: String,
    /// Gasless relay endpoint
    pub relay_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Directory for persisted session files
    pub data_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// HTTP gateway bind address
    pub listen_addr: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Config::builder()
            // Chain defaults
            .set_default("chain.chain_id", 137)?
            .set_default("chain.rpc_url", "https://polygon-rpc.com")?
            // Venue defaults
            .set_default("venue.clob_url", "https://clob.polymarket.com")?
            .set_default("venue.gamma_url", "https://gamma-api.polymarket.com")?
            .set_default("venue.data_api_url", "https://data-api.polymarket.com")?
            .set_default("venue.relay_url", "https://relayer-v2.polymarket.com")?
            // Session defaults
            .set_default("session.data_dir", "./data")?
            // Gateway defaults
            .set_default("gateway.listen_addr", "127.0.0.1:8080")?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (POLYTRADER_*)
            .add_source(Environment::with_prefix("POLYTRADER").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Ok(app_config)
    }

    /// Generate a digest of the config (without secrets) for logging
    pub fn digest(&self) -> String {
        format!(
            "chain_id={} clob={} gamma={} data_api={} relay={} data_dir={}",
            self.chain.chain_id,
            self.venue.clob_url,
            self.venue.gamma_url,
            self.venue.data_api_url,
            self.venue.relay_url,
            self.session.data_dir
        )
    }

    /// Validate required environment variables
    pub fn validate_env(&self) -> Result<()> {
        let pk = match std::env::var("PRIVATE_KEY") {
            Ok(pk) => pk,
            Err(_) => bail!("Required environment variable PRIVATE_KEY is not set"),
        };

        if !pk.starts_with("0x") || pk.len() != 66 {
            bail!("PRIVATE_KEY must be a hex string with 0x prefix (66 chars total)");
        }
        if hex::decode(&pk[2..]).is_err() {
            bail!("PRIVATE_KEY contains non-hex characters");
        }

        Ok(())
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
