//! Opaline page cache.
//!
//! A flat key/value side channel in front of the page store. Entries hold the
//! owner-shaped page snapshot as JSON and never expire on their own; writers
//! invalidate the keys they touch.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! capacity = 1024
//! ```

mod config;
mod keys;
mod store;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

pub use config::CacheConfig;
pub use keys::{PAGE_KEY_PREFIX, page_key};
pub use store::{DisabledPageCache, MemoryPageCache};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cache operation `{op}` failed: {message}")]
    Operation { op: &'static str, message: String },
}

/// Opaque string-keyed store with no built-in expiry.
#[async_trait]
pub trait PageCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: String) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// Build the configured cache backend.
pub fn build_page_cache(config: &CacheConfig) -> Arc<dyn PageCache> {
    if config.enabled {
        Arc::new(MemoryPageCache::new(config))
    } else {
        Arc::new(DisabledPageCache)
    }
}
