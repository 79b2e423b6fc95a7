//! Existence/metadata cache
//!
//! The proxy never reads through this cache on the account path; it only
//! invalidates entries before mutating replicas so other readers cannot see
//! stale metadata once a write is in flight.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::common::{Result, METRICS};

/// Cache key for an account's existence/metadata entry
pub fn account_cache_key(account: &str) -> String {
    format!("account/{}", account)
}

/// Process-wide key-value cache backend. The account path only invalidates.
pub trait CacheStore: Send + Sync {
    fn delete(&self, key: &str) -> Result<()>;
}

/// Best-effort delete. A failing cache never fails the request.
pub fn invalidate(cache: &dyn CacheStore, key: &str) {
    match cache.delete(key) {
        Ok(()) => {
            METRICS.cache_invalidations.inc();
            tracing::debug!("invalidated cache key {}", key);
        }
        Err(e) => {
            METRICS.cache_failures.inc();
            tracing::warn!("cache invalidation of {} failed: {}", key, e);
        }
    }
}

/// In-process cache (default)
#[derive(Debug, Default)]
pub struct MemoryCache {
    map: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.lock().get(key).cloned()
    }

    pub fn set(&self, key: &str, value: Vec<u8>) {
        self.lock().insert(key.to_string(), value);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.map
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CacheStore for MemoryCache {
    fn delete(&self, key: &str) -> Result<()> {
        self.lock().remove(key);
        Ok(())
    }
}

/// Cache used when none is configured; every operation is a no-op
#[derive(Debug, Default)]
pub struct NoCache;

impl CacheStore for NoCache {
    fn delete(&self, _key: &str) -> Result<()> {
        Ok(())
    }
}
