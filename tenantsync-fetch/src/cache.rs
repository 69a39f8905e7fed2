//! Short-lived, type-erased side cache shared across accounts.
//!
//! Used to hand results from one fan-out (say, the activity feed) to pools
//! that would otherwise refetch the same data (per-project timelines).
//! Entries expire lazily on read; there is no background sweeper.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::time::Instant;

// ============================================================================
// Cache Entry
// ============================================================================

/// A cached value with its freshness window.
#[derive(Clone)]
pub struct CacheEntry {
    /// The cached value.
    pub value: Arc<dyn Any + Send + Sync>,
    /// When the value was stored.
    pub stored_at: Instant,
    /// End of the fresh window. `None` when the TTL is too large to
    /// represent, which means the window never closes.
    pub fresh_until: Option<Instant>,
    /// End of the serve-stale window, `None` meaning never.
    pub stale_until: Option<Instant>,
}

impl CacheEntry {
    /// Returns true if the entry is within its fresh window.
    pub fn is_fresh(&self) -> bool {
        self.fresh_until.is_none_or(|until| Instant::now() < until)
    }

    /// Returns true if the entry may still be served.
    pub fn is_usable(&self) -> bool {
        self.stale_until.is_none_or(|until| Instant::now() < until)
    }
}

impl std::fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("fresh", &self.is_fresh())
            .field("usable", &self.is_usable())
            .finish_non_exhaustive()
    }
}

/// A typed read from the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cached<T> {
    /// The value.
    pub value: T,
    /// Whether it is still within the fresh window.
    pub fresh: bool,
}

// ============================================================================
// Cache
// ============================================================================

/// In-memory key-value cache with fresh and stale TTLs.
#[derive(Debug, Default)]
pub struct Cache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl Cache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entry for `key` if it exists and is still usable.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).filter(|e| e.is_usable()).cloned()
    }

    /// Returns the value for `key` if it is usable and of type `T`.
    pub fn get_typed<T>(&self, key: &str) -> Option<Cached<T>>
    where
        T: Any + Clone + Send + Sync,
    {
        let entry = self.get(key)?;
        let value = entry.value.downcast_ref::<T>()?.clone();
        Some(Cached {
            value,
            fresh: entry.is_fresh(),
        })
    }

    /// Stores `value`, fresh for `ttl` and servable for a further `stale_ttl`.
    pub fn set<T>(&self, key: impl Into<String>, value: T, ttl: Duration, stale_ttl: Duration)
    where
        T: Any + Send + Sync,
    {
        let now = Instant::now();
        let fresh_until = now.checked_add(ttl);
        let entry = CacheEntry {
            value: Arc::new(value),
            stored_at: now,
            fresh_until,
            stale_until: fresh_until.and_then(|t| t.checked_add(stale_ttl)),
        };
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), entry);
    }

    /// Removes `key`.
    pub fn invalidate(&self, key: &str) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entry_ages_through_windows() {
        let cache = Cache::new();
        cache.set("k", vec![1u32, 2], Duration::from_secs(10), Duration::from_secs(20));

        let hit = cache.get_typed::<Vec<u32>>("k").unwrap();
        assert!(hit.fresh);
        assert_eq!(hit.value, vec![1, 2]);

        tokio::time::advance(Duration::from_secs(15)).await;
        let hit = cache.get_typed::<Vec<u32>>("k").unwrap();
        assert!(!hit.fresh);

        tokio::time::advance(Duration::from_secs(20)).await;
        assert!(cache.get("k").is_none());
        // Expiry is lazy: the entry is still stored.
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_ttl_never_expires() {
        let cache = Cache::new();
        cache.set("k", 1u8, Duration::from_secs(u64::MAX), Duration::ZERO);
        cache.set("s", 2u8, Duration::from_secs(1), Duration::from_secs(u64::MAX));

        tokio::time::advance(Duration::from_secs(2)).await;
        let hit = cache.get_typed::<u8>("k").unwrap();
        assert!(hit.fresh);
        let hit = cache.get_typed::<u8>("s").unwrap();
        assert!(!hit.fresh);
    }

    #[test]
    fn test_wrong_type_reads_as_absent() {
        let cache = Cache::new();
        cache.set("k", 5u64, Duration::from_secs(10), Duration::ZERO);
        assert!(cache.get_typed::<String>("k").is_none());
        assert_eq!(cache.get_typed::<u64>("k").map(|c| c.value), Some(5));
    }

    #[test]
    fn test_invalidate_and_clear() {
        let cache = Cache::new();
        cache.set("a", 1u8, Duration::from_secs(10), Duration::ZERO);
        cache.set("b", 2u8, Duration::from_secs(10), Duration::ZERO);

        cache.invalidate("a");
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());

        cache.clear();
        assert!(cache.is_empty());
    }
}
