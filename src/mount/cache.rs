//! Memoized path resolutions.

use moka::sync::Cache;

use super::Resolved;

/// Concurrent map from canonical path to its resolved binding.
///
/// Any mount or unmount flushes the cache entirely; a full flush is a
/// correct (and simpler) stand-in for prefix-scoped invalidation, and a
/// benign race that re-resolves a path after a flush produces the same
/// result as a cold resolve.
pub struct ResolveCache {
    entries: Cache<String, Resolved>,
}

impl ResolveCache {
    pub fn new(capacity: u64) -> Self {
        Self { entries: Cache::new(capacity) }
    }

    pub fn get(&self, canonical: &str) -> Option<Resolved> {
        self.entries.get(canonical)
    }

    pub fn insert(&self, canonical: String, resolved: Resolved) {
        self.entries.insert(canonical, resolved);
    }

    /// Drop every entry; called on any change to the mount table.
    pub fn flush(&self) {
        self.entries.invalidate_all();
    }

    pub fn contains(&self, canonical: &str) -> bool {
        self.entries.contains_key(canonical)
    }
}

impl std::fmt::Debug for ResolveCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolveCache").finish_non_exhaustive()
    }
}
