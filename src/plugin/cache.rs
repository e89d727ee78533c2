//! Schema caching for plugin resolution.
//!
//! Fetching a schema can be expensive for real plugins, and every instance
//! of every resource resolves its provider. Schemas are fetched once per
//! plugin and shared as `Arc`s.

use crate::core::error::ResolutionError;
use lru::LruCache;
use parking_lot::Mutex;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of entries evicted.
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate hit ratio.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} hit(s), {} miss(es), {:.0}% hit ratio",
            self.hits,
            self.misses,
            self.hit_ratio() * 100.0
        )
    }
}

/// Thread-safe LRU cache of schemas keyed by plugin.
pub struct SchemaCache<T> {
    cache: Mutex<LruCache<String, Arc<T>>>,
    stats: Mutex<CacheStats>,
}

impl<T> SchemaCache<T> {
    /// Create a new cache with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            stats: Mutex::new(CacheStats::default()),
        }
    }

    /// Get a cached schema, loading and caching it on a miss.
    ///
    /// The lock is not held while loading, so two threads missing on the
    /// same key may both load; the later insert wins.
    pub fn get_or_load<F>(&self, key: &str, load: F) -> Result<Arc<T>, ResolutionError>
    where
        F: FnOnce() -> Result<T, ResolutionError>,
    {
        let key = key.to_string();
        if let Some(schema) = self.cache.lock().get(&key) {
            self.stats.lock().hits += 1;
            return Ok(Arc::clone(schema));
        }
        self.stats.lock().misses += 1;

        let schema = Arc::new(load()?);
        let mut cache = self.cache.lock();
        if cache.len() == cache.cap().get() && !cache.contains(&key) {
            self.stats.lock().evictions += 1;
        }
        cache.put(key, Arc::clone(&schema));
        Ok(schema)
    }

    /// Drop a cached schema.
    pub fn invalidate(&self, key: &str) {
        self.cache.lock().pop(&key.to_string());
    }

    /// Clear the entire cache.
    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.stats.lock().clone()
    }

    /// Get number of cached entries.
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Check if cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for SchemaCache<T> {
    fn default() -> Self {
        Self::new(64)
    }
}
