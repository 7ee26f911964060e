//! Session persistence
//!
//! One JSON document per EOA. The store is a cache of last-known session
//! state; every flag in it is re-verified against live sources during
//! initialization, so a stale or missing file is never fatal.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use ethers::types::Address;
use tracing::warn;

use crate::chain::to_lower_hex;
use crate::types::TradingSession;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, eoa: Address) -> Result<Option<TradingSession>>;
    async fn save(&self, session: &TradingSession) -> Result<()>;
    async fn clear(&self, eoa: Address) -> Result<()>;
}

/// File-backed store, one `session_<eoa>.json` per wallet.
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, eoa: Address) -> PathBuf {
        self.dir.join(format!("session_{}.json", to_lower_hex(eoa)))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self, eoa: Address) -> Result<Option<TradingSession>> {
        let path = self.path_for(eoa);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("failed reading {}", path.display()))
            }
        };

        match serde_json::from_str::<TradingSession>(&raw) {
            Ok(session) => Ok(Some(session)),
            Err(err) => {
                // Corrupt cache entries are dropped, not propagated.
                warn!(path = %path.display(), %err, "discarding unreadable session file");
                Ok(None)
            }
        }
    }

    async fn save(&self, session: &TradingSession) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed creating {}", self.dir.display()))?;
        let path = self.path_for(session.eoa_address);
        let raw = serde_json::to_string_pretty(session)
            .context("failed serializing session")?;
        tokio::fs::write(&path, raw)
            .await
            .with_context(|| format!("failed writing {}", path.display()))
    }

    async fn clear(&self, eoa: Address) -> Result<()> {
        let path = self.path_for(eoa);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("failed removing {}", path.display())),
        }
    }
}

/// In-memory store for tests and ephemeral deployments.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<Address, TradingSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, eoa: Address) -> Result<Option<TradingSession>> {
        Ok(self
            .sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&eoa)
            .cloned())
    }

    async fn save(&self, session: &TradingSession) -> Result<()> {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(session.eoa_address, session.clone());
        Ok(())
    }

    async fn clear(&self, eoa: Address) -> Result<()> {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&eoa);
        Ok(())
    }
}
