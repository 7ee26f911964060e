//! PolyTrader Library
//!
//! Gasless trading session core for Polymarket-style CLOB venues: proxy
//! wallet deployment, credential and approval management, order execution,
//! and position lifecycle handling, all driven through a relay so the user
//! wallet only ever signs.

pub mod app;
pub mod cache;
pub mod chain;
pub mod clob;
pub mod config;
pub mod error;
pub mod execution;
pub mod positions;
pub mod relay;
pub mod session;
pub mod signer;
pub mod types;

#[cfg(feature = "gateway")]
pub mod gateway;

pub use app::App;
pub use cache::ViewCache;
pub use config::AppConfig;
pub use error::CoreError;
pub use execution::OrderExecutor;
pub use positions::PositionManager;
pub use session::SessionOrchestrator;
pub use types::{ApiCredentials, OrderIntent, SessionStep, Side, TradingSession};
