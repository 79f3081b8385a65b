//! Primary (distributed) cache backend seam

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{DelegationError, Result};

/// Byte-oriented key/value cache with per-entry TTL
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;
}

#[derive(Clone)]
struct StoredValue {
    bytes: Vec<u8>,
    stored_at: Instant,
    ttl: Duration,
}

/// In-process stand-in for a shared cache such as Redis
///
/// `set_available(false)` makes every call fail, which is how outages of
/// the primary tier are exercised.
pub struct InMemoryCacheBackend {
    entries: Arc<DashMap<String, StoredValue>>,
    available: AtomicBool,
}

impl InMemoryCacheBackend {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DelegationError::Cache("primary cache unavailable".to_string()))
        }
    }
}

impl Default for InMemoryCacheBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for InMemoryCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.ensure_available()?;

        if let Some(entry) = self.entries.get(key) {
            if entry.stored_at.elapsed() > entry.ttl {
                drop(entry);
                self.entries.remove(key);
                return Ok(None);
            }
            return Ok(Some(entry.bytes.clone()));
        }

        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<()> {
        self.ensure_available()?;

        self.entries.insert(
            key.to_string(),
            StoredValue {
                bytes: value,
                stored_at: Instant::now(),
                ttl: Duration::from_secs(ttl_secs),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.ensure_available()?;
        self.entries.remove(key);
        Ok(())
    }
}
