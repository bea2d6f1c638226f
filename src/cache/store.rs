//! Page cache storage implementations.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use lru::LruCache;
use metrics::counter;
use tracing::warn;

use super::config::CacheConfig;
use super::{CacheError, PageCache};

/// In-process page cache with LRU eviction.
///
/// An evicted entry is indistinguishable from one that was never written, so
/// the bound only costs extra store reads.
pub struct MemoryPageCache {
    entries: Mutex<LruCache<String, String>>,
}

impl MemoryPageCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(config.capacity)),
        }
    }

    /// A panic while holding the lock leaves at worst a stale snapshot, which
    /// the read path already tolerates, so poisoning is logged and ignored.
    fn entries(&self, op: &'static str) -> MutexGuard<'_, LruCache<String, String>> {
        self.entries.lock().unwrap_or_else(|poisoned| {
            warn!(
                target = "opaline::cache",
                op, "page cache lock was poisoned; continuing"
            );
            poisoned.into_inner()
        })
    }

    pub fn len(&self) -> usize {
        self.entries("len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries("contains").contains(key)
    }
}

#[async_trait]
impl PageCache for MemoryPageCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.entries("get").get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), CacheError> {
        let displaced = self.entries("set").push(key.to_string(), value);
        if let Some((displaced_key, _)) = displaced
            && displaced_key != key
        {
            counter!("opaline_cache_evict_total").increment(1);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries("delete").pop(key);
        Ok(())
    }
}

/// Cache that stores nothing; every read is a miss.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledPageCache;

#[async_trait]
impl PageCache for DisabledPageCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: String) -> Result<(), CacheError> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<(), CacheError> {
        Ok(())
    }
}
