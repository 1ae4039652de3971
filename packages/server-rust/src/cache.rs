//! In-memory [`TenantCache`] implementation backed by [`DashMap`].
//!
//! Readers never block each other and writers only contend on the shard that
//! owns their key. There is no TTL and no eviction: the key space is bounded
//! by the number of distinct external identifiers the process ever sees, and
//! registry mappings are treated as static for the life of the process.

use dashmap::DashMap;
use inbound_core::{CacheKey, ResolvedStore};

use crate::traits::TenantCache;

/// Concurrent tenant cache with first-writer-wins inserts.
pub struct DashMapTenantCache {
    entries: DashMap<CacheKey, ResolvedStore>,
}

impl DashMapTenantCache {
    /// Creates a new, empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl Default for DashMapTenantCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TenantCache for DashMapTenantCache {
    fn get(&self, key: &CacheKey) -> Option<ResolvedStore> {
        self.entries.get(key).map(|r| r.value().clone())
    }

    fn put(&self, key: CacheKey, store: ResolvedStore) -> ResolvedStore {
        // The entry API holds the shard lock across check-and-insert, so two
        // racing writers cannot both observe a vacant slot.
        let held = self.entries.entry(key).or_insert(store);
        held.value().clone()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
