//! Venue API credentials
//!
//! Credentials are deterministic per wallet, so derivation is tried before
//! creation: a returning wallet gets its existing credential back, a fresh
//! wallet falls through to creation. Either path costs one L1 signature.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::CoreError;
use crate::types::ApiCredentials;

/// The venue's L1-authenticated credential endpoints.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialEndpoint: Send + Sync {
    /// Derive the existing credential for this wallet.
    async fn derive_credentials(&self) -> Result<ApiCredentials>;

    /// Create a fresh credential for this wallet.
    async fn create_credentials(&self) -> Result<ApiCredentials>;
}

pub struct CredentialManager {
    endpoint: Arc<dyn CredentialEndpoint>,
}

impl CredentialManager {
    pub fn new(endpoint: Arc<dyn CredentialEndpoint>) -> Self {
        Self { endpoint }
    }

    /// Derive-then-create. A derive answer with blank fields counts as a
    /// miss and falls through to creation, same as a derive failure; only a
    /// created credential with blank fields is a failure. Callers never see
    /// an unusable credential.
    pub async fn get_or_create(&self) -> Result<ApiCredentials> {
        match self.endpoint.derive_credentials().await {
            Ok(credentials) if credentials.is_valid() => {
                debug!("derived existing venue credentials");
                info!("venue credentials ready");
                return Ok(credentials);
            }
            Ok(_) => {
                debug!("derived credentials had blank fields, creating fresh credentials")
            }
            Err(err) => {
                debug!(%err, "credential derivation failed, creating fresh credentials")
            }
        }

        let credentials = self
            .endpoint
            .create_credentials()
            .await
            .context("credential creation failed after derivation yielded nothing usable")?;
        if !credentials.is_valid() {
            return Err(
                CoreError::Upstream("venue returned a credential with blank fields".to_string())
                    .into(),
            );
        }

        info!("venue credentials ready");
        Ok(credentials)
    }
}
