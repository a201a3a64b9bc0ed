// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! L1: byte-bounded, versioned, TTL-aware LRU.
//!
//! Recency is kept by an unbounded [`lru::LruCache`] (hash map plus intrusive
//! list, O(1) get/put/promote); the byte budget is enforced here by evicting
//! from the LRU head. Recency order, expiry deadlines and memory accounting
//! live behind one mutex so they always change together. `get` reorders, so it
//! takes the lock exclusively like every other operation.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tiered_cache::{CacheKey, KeyVersioner, LocalLruCache};
//!
//! let cache = LocalLruCache::new(20 * 1024 * 1024, None, Arc::new(KeyVersioner::new(1)));
//! let key = CacheKey::new("k1").unwrap();
//!
//! assert!(cache.put(&key, vec![b'x'; 1024 * 1024], None));
//! assert_eq!(cache.get(&key).map(|v| v.len()), Some(1024 * 1024));
//! assert!(cache.memory_usage() < 20 * 1024 * 1024);
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::expiry::ExpiryIndex;
use crate::keys::{CacheKey, KeyVersioner};
use crate::size::estimate_entry;

#[derive(Debug, Clone)]
struct Entry {
    logical_key: String,
    value: Vec<u8>,
    size_bytes: usize,
}

struct LruState {
    entries: LruCache<String, Entry>,
    expiry: ExpiryIndex,
    memory_usage: usize,
}

impl LruState {
    fn remove(&mut self, versioned_key: &str) -> Option<Entry> {
        let entry = self.entries.pop(versioned_key)?;
        self.expiry.clear_expiry(versioned_key);
        self.memory_usage = self.memory_usage.saturating_sub(entry.size_bytes);
        Some(entry)
    }

    fn evict_lru(&mut self) -> Option<(String, Entry)> {
        let (key, entry) = self.entries.pop_lru()?;
        self.expiry.clear_expiry(&key);
        self.memory_usage = self.memory_usage.saturating_sub(entry.size_bytes);
        Some((key, entry))
    }

    fn recomputed_usage(&self) -> usize {
        self.entries.iter().map(|(_, e)| e.size_bytes).sum()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.expiry.clear();
        self.memory_usage = 0;
    }
}

/// In-process LRU tier with a hard byte budget.
pub struct LocalLruCache {
    state: Mutex<LruState>,
    versioner: Arc<KeyVersioner>,
    max_memory: usize,
    default_ttl: Option<Duration>,
}

impl LocalLruCache {
    /// Create an L1 cache holding at most `max_memory` estimated bytes.
    ///
    /// `default_ttl` applies to puts that carry no TTL of their own.
    #[must_use]
    pub fn new(max_memory: usize, default_ttl: Option<Duration>, versioner: Arc<KeyVersioner>) -> Self {
        Self {
            state: Mutex::new(LruState {
                entries: LruCache::unbounded(),
                expiry: ExpiryIndex::new(),
                memory_usage: 0,
            }),
            versioner,
            max_memory,
            default_ttl,
        }
    }

    /// Look up `key`, promoting it to most-recently-used on a hit.
    ///
    /// Expired entries are dropped here and reported as a miss.
    pub fn get(&self, key: &CacheKey) -> Option<Vec<u8>> {
        let mut state = self.state.lock();
        let versioned_key = self.versioner.versioned_key(key);

        if state.expiry.is_expired(&versioned_key, Instant::now()) {
            if let Some(entry) = state.remove(&versioned_key) {
                debug!(key = %entry.logical_key, "L1 entry expired on access");
                crate::metrics::record_expired("L1", 1);
                self.publish_gauges(&state);
            }
            return None;
        }

        state.entries.get(&versioned_key).map(|e| e.value.clone())
    }

    /// Insert or replace `key`.
    ///
    /// Evicts from the LRU head until the new entry fits. Returns `false`
    /// when the entry alone is larger than the whole budget; it is then not
    /// stored (and any previous value under the key is gone).
    pub fn put(&self, key: &CacheKey, value: Vec<u8>, ttl: Option<Duration>) -> bool {
        let mut state = self.state.lock();
        let versioned_key = self.versioner.versioned_key(key);
        self.insert(&mut state, key, versioned_key, value, ttl)
    }

    /// Like [`put`](Self::put), but only while the generation is still
    /// `version`.
    ///
    /// Version changes take the same lock, so a value read or written under
    /// an older generation can never land in L1 under a newer one. Returns
    /// `false` without storing when the generation has moved on.
    pub fn put_at_version(&self, key: &CacheKey, value: Vec<u8>, ttl: Option<Duration>, version: u64) -> bool {
        let mut state = self.state.lock();
        let current = self.versioner.current();
        if current != version {
            debug!(key = %key, version, current, "Generation changed, dropping L1 write");
            return false;
        }
        let versioned_key = KeyVersioner::format_key(version, key);
        self.insert(&mut state, key, versioned_key, value, ttl)
    }

    fn insert(
        &self,
        state: &mut LruState,
        key: &CacheKey,
        versioned_key: String,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> bool {
        let size_bytes = estimate_entry(&versioned_key, &value);

        state.remove(&versioned_key);

        if size_bytes > self.max_memory {
            warn!(
                key = %key,
                size_bytes,
                max_memory = self.max_memory,
                "Value exceeds L1 budget, not caching locally"
            );
            self.publish_gauges(state);
            return false;
        }

        let mut evicted = 0usize;
        let mut evicted_bytes = 0usize;
        while state.memory_usage + size_bytes > self.max_memory {
            match state.evict_lru() {
                Some((_, entry)) => {
                    evicted += 1;
                    evicted_bytes += entry.size_bytes;
                    debug!(key = %entry.logical_key, size_bytes = entry.size_bytes, "L1 evicted LRU entry");
                }
                None => break,
            }
        }
        if evicted > 0 {
            crate::metrics::record_eviction("L1", evicted, evicted_bytes);
        }

        if let Some(ttl) = ttl.or(self.default_ttl) {
            state.expiry.set_expiry(&versioned_key, Instant::now() + ttl);
        }
        state.entries.put(
            versioned_key,
            Entry {
                logical_key: key.to_string(),
                value,
                size_bytes,
            },
        );
        state.memory_usage += size_bytes;

        self.publish_gauges(state);
        true
    }

    /// Remove `key`. Returns whether an entry was present.
    pub fn delete(&self, key: &CacheKey) -> bool {
        let mut state = self.state.lock();
        let versioned_key = self.versioner.versioned_key(key);
        let removed = state.remove(&versioned_key).is_some();
        if removed {
            self.publish_gauges(&state);
        }
        removed
    }

    /// Present and not expired. Does not change recency.
    #[must_use]
    pub fn exists(&self, key: &CacheKey) -> bool {
        let state = self.state.lock();
        let versioned_key = self.versioner.versioned_key(key);
        state.entries.contains(&versioned_key)
            && !state.expiry.is_expired(&versioned_key, Instant::now())
    }

    /// Re-check the budget and evict until it holds.
    ///
    /// Also reconciles incremental accounting against the true sum of entry
    /// sizes, clamping to the recomputed value if they ever disagree.
    pub fn force_eviction(&self) -> usize {
        let mut state = self.state.lock();

        let actual = state.recomputed_usage();
        if actual != state.memory_usage {
            warn!(
                tracked = state.memory_usage,
                actual,
                "L1 memory accounting drifted, clamping to recomputed size"
            );
            crate::metrics::record_error("L1", "force_eviction", "accounting_drift");
            state.memory_usage = actual;
        }

        let mut evicted = 0usize;
        let mut evicted_bytes = 0usize;
        while state.memory_usage > self.max_memory {
            match state.evict_lru() {
                Some((_, entry)) => {
                    evicted += 1;
                    evicted_bytes += entry.size_bytes;
                }
                None => break,
            }
        }
        if evicted > 0 {
            crate::metrics::record_eviction("L1", evicted, evicted_bytes);
        }
        self.publish_gauges(&state);
        evicted
    }

    /// Switch to generation `version` and flush every entry.
    ///
    /// Entries from older generations can never be addressed again, so
    /// dropping them immediately is the same as letting them age out.
    pub fn update_version(&self, version: u64) {
        let mut state = self.state.lock();
        self.versioner.set(version);
        state.clear();
        self.publish_gauges(&state);
    }

    /// Advance the generation by one and flush. Returns the new version.
    pub fn bump_version(&self) -> u64 {
        let mut state = self.state.lock();
        let version = self.versioner.bump();
        state.clear();
        self.publish_gauges(&state);
        version
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.clear();
        self.publish_gauges(&state);
    }

    /// Drop every entry whose deadline has passed. Returns how many went.
    pub fn purge_expired(&self) -> usize {
        let mut state = self.state.lock();
        let expired = state.expiry.sweep(Instant::now());
        let mut purged = 0;
        for key in &expired {
            if let Some(entry) = state.entries.pop(key.as_str()) {
                state.memory_usage = state.memory_usage.saturating_sub(entry.size_bytes);
                purged += 1;
            }
        }
        if purged > 0 {
            crate::metrics::record_expired("L1", purged);
            self.publish_gauges(&state);
        }
        purged
    }

    /// Remove every entry whose versioned key satisfies `predicate`.
    ///
    /// Full scan under the lock; meant for rare bulk invalidation.
    pub fn remove_where<F>(&self, predicate: F) -> usize
    where
        F: Fn(&str) -> bool,
    {
        let mut state = self.state.lock();
        let doomed: Vec<String> = state
            .entries
            .iter()
            .filter(|(k, _)| predicate(k.as_str()))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &doomed {
            state.remove(key);
        }
        if !doomed.is_empty() {
            self.publish_gauges(&state);
        }
        doomed.len()
    }

    #[must_use]
    pub fn memory_usage(&self) -> usize {
        self.state.lock().memory_usage
    }

    #[must_use]
    pub fn max_memory(&self) -> usize {
        self.max_memory
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.versioner.current()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// (entry count, estimated bytes), read under one lock.
    #[must_use]
    pub fn stats(&self) -> (usize, usize) {
        let state = self.state.lock();
        (state.entries.len(), state.memory_usage)
    }

    /// Fraction of the byte budget in use (0.0 - 1.0).
    #[must_use]
    pub fn pressure(&self) -> f64 {
        if self.max_memory == 0 {
            return 0.0;
        }
        self.memory_usage() as f64 / self.max_memory as f64
    }

    fn publish_gauges(&self, state: &LruState) {
        crate::metrics::set_l1_cache_bytes(state.memory_usage);
        crate::metrics::set_l1_cache_items(state.entries.len());
    }

    #[cfg(test)]
    fn skew_accounting(&self, delta: isize) {
        let mut state = self.state.lock();
        state.memory_usage = state.memory_usage.saturating_add_signed(delta);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    const MB: usize = 1024 * 1024;

    fn key(k: &str) -> CacheKey {
        CacheKey::new(k).unwrap()
    }

    fn cache(max_memory: usize) -> LocalLruCache {
        LocalLruCache::new(max_memory, None, Arc::new(KeyVersioner::new(1)))
    }

    /// Budget that fits exactly `n` entries of `value_len` bytes under single-char keys.
    fn budget_for(n: usize, value_len: usize) -> usize {
        let probe = KeyVersioner::new(1).versioned_key(&key("a"));
        n * estimate_entry(&probe, &vec![0u8; value_len])
    }

    #[test]
    fn test_round_trip() {
        let cache = cache(MB);
        cache.put(&key("k"), b"value".to_vec(), None);
        assert_eq!(cache.get(&key("k")), Some(b"value".to_vec()));
    }

    #[test]
    fn test_missing_key_is_none() {
        let cache = cache(MB);
        assert_eq!(cache.get(&key("absent")), None);
    }

    #[test]
    fn test_forced_eviction_scenario() {
        let cache = cache(20 * MB);
        let value = vec![b'x'; MB];

        assert!(cache.put(&key("k1"), value.clone(), None));
        assert!(cache.memory_usage() < 20 * MB);
        assert_eq!(cache.get(&key("k1")), Some(value));

        assert_eq!(cache.force_eviction(), 0);
        assert_eq!(cache.len(), 1);

        assert!(cache.put(&key("new_key"), b"new_value".to_vec(), None));
        assert_eq!(cache.get(&key("new_key")), Some(b"new_value".to_vec()));
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let cache = cache(budget_for(3, 100));
        cache.put(&key("a"), vec![1; 100], None);
        cache.put(&key("b"), vec![2; 100], None);
        cache.put(&key("c"), vec![3; 100], None);

        // Touch "a" so "b" becomes the LRU entry.
        assert!(cache.get(&key("a")).is_some());

        cache.put(&key("d"), vec![4; 100], None);

        assert!(cache.get(&key("b")).is_none(), "b was least recently used");
        assert!(cache.get(&key("a")).is_some());
        assert!(cache.get(&key("c")).is_some());
        assert!(cache.get(&key("d")).is_some());
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_exists_does_not_promote() {
        let cache = cache(budget_for(2, 10));
        cache.put(&key("a"), vec![0; 10], None);
        cache.put(&key("b"), vec![0; 10], None);

        assert!(cache.exists(&key("a")));
        cache.put(&key("c"), vec![0; 10], None);

        assert!(!cache.exists(&key("a")), "exists() must not refresh recency");
        assert!(cache.exists(&key("b")));
    }

    #[test]
    fn test_replace_recomputes_size() {
        let cache = cache(MB);
        cache.put(&key("k"), vec![0; 1000], None);
        let big = cache.memory_usage();
        cache.put(&key("k"), vec![0; 10], None);
        let small = cache.memory_usage();

        assert_eq!(big - small, 990);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_oversized_value_rejected() {
        let cache = cache(1024);
        cache.put(&key("small"), vec![0; 10], None);
        assert!(!cache.put(&key("huge"), vec![0; 4096], None));

        assert!(cache.get(&key("huge")).is_none());
        assert!(cache.get(&key("small")).is_some(), "rejection must not flush others");
        assert!(cache.memory_usage() <= 1024);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let cache = cache(MB);
        cache.put(&key("k"), vec![0; 64], None);

        assert!(cache.delete(&key("k")));
        let usage = cache.memory_usage();
        assert_eq!(usage, 0);

        assert!(!cache.delete(&key("k")));
        assert_eq!(cache.memory_usage(), usage);
    }

    #[test]
    fn test_version_bump_hides_old_keys() {
        let cache = cache(MB);
        let v = b"payload".to_vec();
        cache.put(&key("p"), v.clone(), None);

        cache.update_version(2);
        assert_eq!(cache.version(), 2);
        assert!(cache.get(&key("p")).is_none());
        assert_eq!(cache.memory_usage(), 0);

        cache.put(&key("p"), v.clone(), None);
        assert_eq!(cache.get(&key("p")), Some(v));
    }

    #[test]
    fn test_put_at_version_rejects_stale_generation() {
        let cache = cache(MB);
        cache.put(&key("p"), b"old".to_vec(), None);
        cache.bump_version();

        assert!(!cache.put_at_version(&key("p"), b"old".to_vec(), None, 1));
        assert!(cache.get(&key("p")).is_none());
        assert!(cache.is_empty());

        assert!(cache.put_at_version(&key("p"), b"new".to_vec(), None, 2));
        assert_eq!(cache.get(&key("p")), Some(b"new".to_vec()));
    }

    #[test]
    fn test_bump_version_flushes() {
        let cache = cache(MB);
        cache.put(&key("p"), vec![1], None);
        assert_eq!(cache.bump_version(), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = cache(MB);
        cache.put(&key("short"), b"v".to_vec(), Some(Duration::from_millis(50)));
        assert_eq!(cache.get(&key("short")), Some(b"v".to_vec()));

        thread::sleep(Duration::from_millis(120));

        assert!(!cache.exists(&key("short")));
        assert!(cache.get(&key("short")).is_none());
        assert_eq!(cache.memory_usage(), 0, "expired entry purged on access");
    }

    #[test]
    fn test_default_ttl_applies() {
        let cache = LocalLruCache::new(MB, Some(Duration::from_millis(40)), Arc::new(KeyVersioner::new(1)));
        cache.put(&key("k"), b"v".to_vec(), None);
        thread::sleep(Duration::from_millis(100));
        assert!(cache.get(&key("k")).is_none());
    }

    #[test]
    fn test_purge_expired() {
        let cache = cache(MB);
        cache.put(&key("a"), vec![0; 10], Some(Duration::from_millis(20)));
        cache.put(&key("b"), vec![0; 10], Some(Duration::from_millis(20)));
        cache.put(&key("keep"), vec![0; 10], None);

        thread::sleep(Duration::from_millis(60));

        assert_eq!(cache.purge_expired(), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.memory_usage(), cache.state.lock().recomputed_usage());
    }

    #[test]
    fn test_put_evicts_expired_head_like_any_other() {
        let cache = cache(budget_for(1, 10));
        cache.put(&key("a"), vec![0; 10], Some(Duration::from_secs(3600)));
        cache.put(&key("b"), vec![0; 10], None);
        assert!(cache.get(&key("a")).is_none());
        assert!(cache.get(&key("b")).is_some());
    }

    #[test]
    fn test_force_eviction_repairs_drift() {
        let cache = cache(MB);
        cache.put(&key("k"), vec![0; 100], None);
        let true_usage = cache.memory_usage();

        cache.skew_accounting(5000);
        assert_ne!(cache.memory_usage(), true_usage);

        cache.force_eviction();
        assert_eq!(cache.memory_usage(), true_usage);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_force_eviction_corrects_under_reporting() {
        let cache = cache(budget_for(2, 10));
        cache.put(&key("a"), vec![0; 10], None);
        cache.put(&key("b"), vec![0; 10], None);

        cache.skew_accounting(-1_000_000);
        cache.force_eviction();
        assert!(cache.memory_usage() <= cache.max_memory());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_remove_where() {
        let versioner = Arc::new(KeyVersioner::new(1));
        let cache = LocalLruCache::new(MB, None, versioner.clone());
        cache.put(&CacheKey::namespaced("p1", "a").unwrap(), vec![1], None);
        cache.put(&CacheKey::namespaced("p1", "b").unwrap(), vec![2], None);
        cache.put(&CacheKey::namespaced("p2", "a").unwrap(), vec![3], None);

        let prefix = versioner.namespace_prefix("p1");
        assert_eq!(cache.remove_where(|k| k.starts_with(&prefix)), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&CacheKey::namespaced("p2", "a").unwrap()).is_some());
    }

    #[test]
    fn test_clear() {
        let cache = cache(MB);
        for i in 0..10 {
            cache.put(&key(&format!("k{}", i)), vec![0; 10], Some(Duration::from_secs(60)));
        }
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats(), (0, 0));
    }

    #[test]
    fn test_concurrent_access_keeps_accounting() {
        let cache = Arc::new(cache(budget_for(50, 100)));
        let mut handles = vec![];

        for t in 0..8 {
            let cache = cache.clone();
            handles.push(thread::spawn(move || {
                for i in 0..200 {
                    let k = key(&format!("t{}-{}", t, i % 80));
                    cache.put(&k, vec![t as u8; 100], None);
                    let _ = cache.get(&k);
                    if i % 7 == 0 {
                        cache.delete(&k);
                    }
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let state = cache.state.lock();
        assert_eq!(state.memory_usage, state.recomputed_usage());
        assert!(state.memory_usage <= cache.max_memory);
    }
}
