//! Error taxonomy for the trading core.
//!
//! Most fallible paths return `anyhow::Result` with context attached at the
//! call site; the variants here classify the failures that callers need to
//! distinguish (retryable vs fatal, pre-network rejection vs upstream).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Missing or invalid static configuration. Fatal, never retried.
    #[error("configuration error: {0}")]
    Config(String),

    /// Wallet or client handle unavailable for the current operation.
    /// Resolved by the user reconnecting, not by retrying.
    #[error("not connected: {0}")]
    Connectivity(String),

    /// Relay, venue, or RPC failure. Step-local; retries are explicit
    /// user-initiated re-invocations.
    #[error("upstream failure: {0}")]
    Upstream(String),

    /// Rejected before any network or signature call.
    #[error("validation error: {0}")]
    Validation(String),

    /// An orchestration pass is already in flight for this wallet.
    #[error("session initialization already in progress (step: {0})")]
    Busy(String),
}

impl CoreError {
    pub fn config(msg: impl Into<String>) -> Self {
        CoreError::Config(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        CoreError::Validation(msg.into())
    }
}
