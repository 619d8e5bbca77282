use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tokio::time::Instant;

/// Key-value store with per-key expiry.
///
/// `ttl: None` keeps the value until it is overwritten. A key whose TTL has
/// elapsed must read back as absent even if it has not been purged yet.
#[async_trait]
pub trait ExpiringStore: Send + Sync {
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Drop every expired key. Returns how many were removed.
    async fn purge_expired(&self) -> Result<usize>;
}

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// In-process expiring map. Used by tests and single-node deployments that
/// can afford to lose credentials on restart.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExpiringStore for MemoryStore {
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| anyhow!("Credential map lock poisoned: {}", e))?;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                // Past the clock's range the value simply never expires.
                expires_at: ttl.and_then(|ttl| Instant::now().checked_add(ttl)),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| anyhow!("Credential map lock poisoned: {}", e))?;
        let now = Instant::now();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn purge_expired(&self) -> Result<usize> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| anyhow!("Credential map lock poisoned: {}", e))?;
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        Ok(before - entries.len())
    }
}
