// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Read-through / write-through operations and invalidation.

use std::time::Duration;

use tracing::{debug, info};

use super::{MetricsSnapshot, PutOutcome, TieredCache};
use crate::error::CacheError;
use crate::eviction::EvictionReport;
use crate::keys::{validate_namespace, CacheKey, KeyVersioner};
use crate::metrics::{self, LatencyTimer, Tier};
use crate::remote::ClusterTopology;

impl TieredCache {
    /// Look up `key`, L1 first.
    ///
    /// An L2 hit is copied into L1 for at most `l1_ttl`, so a local copy
    /// of a remotely evicted or replaced value cannot outlive that bound.
    #[tracing::instrument(skip(self), fields(key = %key))]
    pub async fn get(&self, key: &CacheKey) -> Option<Vec<u8>> {
        let _timer = LatencyTimer::new("tiered", "get");

        if let Some(value) = self.l1.get(key) {
            self.stats.record_hit(Tier::L1);
            return Some(value);
        }
        self.stats.record_miss(Tier::L1);

        let version = self.versioner.current();
        let remote_key = KeyVersioner::format_key(version, key);

        if !self.filter.should_check_remote(&remote_key).await {
            debug!("Membership filter says never cached, skipping L2");
            self.stats.record_miss(Tier::L2);
            return None;
        }

        let Some(value) = self.l2.get(&remote_key).await else {
            self.stats.record_miss(Tier::L2);
            return None;
        };
        self.stats.record_hit(Tier::L2);

        if let Some(eviction) = &self.eviction {
            eviction.track_access(&remote_key).await;
        }
        // A bump while we were waiting on L2 means this value belongs to
        // the previous generation; hand it back but don't cache it.
        self.l1.put_at_version(key, value.clone(), Some(self.l1_ttl), version);
        Some(value)
    }

    /// Store `value` in both tiers.
    ///
    /// `ttl` defaults to the size-based policy. L1 keeps the entry for at
    /// most `l1_ttl`. A failure in one tier does not undo the other. If the
    /// generation changes while L2 is being written, the L1 copy is skipped
    /// and `l1` comes back false.
    #[tracing::instrument(skip(self, value), fields(key = %key, size = value.len()))]
    pub async fn put(&self, key: &CacheKey, value: Vec<u8>, ttl: Option<Duration>) -> PutOutcome {
        let _timer = LatencyTimer::new("tiered", "put");
        let ttl = self.ttl_policy.resolve(ttl, value.len());
        let version = self.versioner.current();
        let remote_key = KeyVersioner::format_key(version, key);

        let l2 = self.l2.set(&remote_key, &value, Some(ttl)).await;
        if l2 {
            self.filter.insert(&remote_key).await;
            if let Some(eviction) = &self.eviction {
                eviction.track_access(&remote_key).await;
                eviction.record_write(value.len());
            }
        }

        // Only cache locally if the generation L2 was written under is
        // still current.
        let l1 = self.l1.put_at_version(key, value, Some(ttl.min(self.l1_ttl)), version);
        metrics::record_operation("tiered", "put", if l1 || l2 { "success" } else { "error" });

        PutOutcome { l1, l2 }
    }

    /// Remove `key` from both tiers and the access index.
    /// Returns true if either tier held it.
    #[tracing::instrument(skip(self), fields(key = %key))]
    pub async fn delete(&self, key: &CacheKey) -> bool {
        let _timer = LatencyTimer::new("tiered", "delete");
        let remote_key = self.versioner.versioned_key(key);

        let l1 = self.l1.delete(key);
        let l2 = self.l2.delete(&remote_key).await;
        if let Some(eviction) = &self.eviction {
            eviction.forget(&remote_key).await;
        }
        l1 || l2
    }

    /// Present in either tier. Does not change recency or backfill.
    pub async fn exists(&self, key: &CacheKey) -> bool {
        if self.l1.exists(key) {
            return true;
        }
        self.l2.exists(&self.versioner.versioned_key(key)).await
    }

    /// Delete every entry of `namespace` in the current generation.
    ///
    /// Scans L2 for `v{version}:{namespace}:*`, deletes the matches, and
    /// scrubs L1 entries with the same prefix. Returns the remote keys
    /// found. An unreachable L2 yields an empty list; L1 is scrubbed anyway.
    #[tracing::instrument(skip(self))]
    pub async fn invalidate_namespace(&self, namespace: &str) -> Result<Vec<String>, CacheError> {
        validate_namespace(namespace)?;
        let _timer = LatencyTimer::new("tiered", "invalidate");

        let pattern = self.versioner.namespace_pattern(namespace);
        let keys = self.l2.keys_matching(&pattern).await;
        let deleted = self.l2.delete_many(&keys).await;
        if let Some(eviction) = &self.eviction {
            eviction.forget_many(&keys).await;
        }

        let prefix = self.versioner.namespace_prefix(namespace);
        let local = self.l1.remove_where(|k| k.starts_with(&prefix));

        metrics::record_invalidation("L2", deleted);
        metrics::record_invalidation("L1", local);
        info!(namespace, matched = keys.len(), deleted, local, "Invalidated namespace");

        Ok(keys)
    }

    /// Hit/miss counters per tier plus current L1 size.
    #[must_use]
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        let (l1_hits, l1_misses, l2_hits, l2_misses) = self.stats.counts();
        let (l1_entries, memory_usage_bytes) = self.l1.stats();
        MetricsSnapshot {
            l1_hits,
            l1_misses,
            l2_hits,
            l2_misses,
            memory_usage_bytes,
            l1_entries,
            version: self.versioner.current(),
        }
    }

    /// Slot layout of the remote store; standalone when it can't be read.
    pub async fn cluster_topology(&self) -> ClusterTopology {
        self.l2.cluster_topology().await
    }

    /// Start a new generation. Every existing entry becomes unreachable in
    /// both tiers and L1 is flushed. Returns the new version.
    pub fn bump_version(&self) -> u64 {
        let version = self.l1.bump_version();
        info!(version, "Cache generation bumped");
        version
    }

    /// Switch to an explicit generation, e.g. one agreed with other processes.
    pub fn update_version(&self, version: u64) {
        self.l1.update_version(version);
        info!(version, "Cache generation updated");
    }

    /// Re-check the L1 budget (and accounting). Returns entries evicted.
    pub fn force_eviction(&self) -> usize {
        self.l1.force_eviction()
    }

    /// Drop expired L1 entries now. Returns how many went.
    pub fn purge_expired(&self) -> usize {
        self.l1.purge_expired()
    }

    /// Run one remote eviction sweep. `None` when remote eviction is off.
    pub async fn evict_remote(&self) -> Option<EvictionReport> {
        match &self.eviction {
            Some(eviction) => Some(eviction.sweep().await),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::CacheConfig;
    use crate::storage::{ClusterMode, InMemoryStore, RemoteStore};

    async fn cache_with(config: CacheConfig) -> (TieredCache, Arc<InMemoryStore>) {
        let store = Arc::new(if config.bloom_filter {
            InMemoryStore::with_filters()
        } else {
            InMemoryStore::new()
        });
        let cache = TieredCache::with_store(config, store.clone()).await.unwrap();
        (cache, store)
    }

    async fn test_cache() -> (TieredCache, Arc<InMemoryStore>) {
        cache_with(CacheConfig::default()).await
    }

    fn key(k: &str) -> CacheKey {
        CacheKey::new(k).unwrap()
    }

    #[tokio::test]
    async fn test_put_then_get_hits_l1() {
        let (cache, _) = test_cache().await;
        let outcome = cache.put(&key("k"), b"value".to_vec(), None).await;
        assert!(outcome.both());

        assert_eq!(cache.get(&key("k")).await, Some(b"value".to_vec()));
        let snapshot = cache.metrics_snapshot();
        assert_eq!((snapshot.l1_hits, snapshot.l1_misses), (1, 0));
        assert_eq!((snapshot.l2_hits, snapshot.l2_misses), (0, 0));
    }

    #[tokio::test]
    async fn test_l2_hit_backfills_l1() {
        let (cache, store) = test_cache().await;
        let k = key("shared");
        // Written by another process: only in L2
        store
            .set(&cache.versioner.versioned_key(&k), b"remote", None)
            .await
            .unwrap();

        assert_eq!(cache.get(&k).await, Some(b"remote".to_vec()));
        assert!(cache.local().exists(&k));
        assert_eq!(cache.get(&k).await, Some(b"remote".to_vec()));

        let snapshot = cache.metrics_snapshot();
        assert_eq!(snapshot.l1_misses, 1);
        assert_eq!(snapshot.l2_hits, 1);
        assert_eq!(snapshot.l1_hits, 1);
    }

    #[tokio::test]
    async fn test_miss_in_both_tiers() {
        let (cache, _) = test_cache().await;
        assert!(cache.get(&key("absent")).await.is_none());

        let snapshot = cache.metrics_snapshot();
        assert_eq!(snapshot.l1_misses, 1);
        assert_eq!(snapshot.l2_misses, 1);
    }

    #[tokio::test]
    async fn test_remote_key_format() {
        let (cache, store) = test_cache().await;
        let k = CacheKey::namespaced("proj", "a.py").unwrap();
        cache.put(&k, b"x".to_vec(), None).await;

        let keys = store.scan_match("*").await.unwrap();
        assert_eq!(keys, vec![format!("v1:proj:{}", k.digest())]);
    }

    #[tokio::test]
    async fn test_ttl_policy_applies_to_l2() {
        let config = CacheConfig {
            large_threshold_bytes: 10,
            small_ttl_secs: 3600,
            large_ttl_secs: 600,
            ..Default::default()
        };
        let (cache, store) = cache_with(config).await;
        let small = key("small");
        let large = key("large");
        cache.put(&small, vec![0; 5], None).await;
        cache.put(&large, vec![0; 50], None).await;

        let small_ttl = store.ttl_of(&cache.versioner.versioned_key(&small)).unwrap();
        let large_ttl = store.ttl_of(&cache.versioner.versioned_key(&large)).unwrap();
        assert!(small_ttl > Duration::from_secs(3500));
        assert!(large_ttl <= Duration::from_secs(600));
        assert!(large_ttl > Duration::from_secs(500));
    }

    #[tokio::test]
    async fn test_explicit_ttl_expires_both_tiers() {
        let (cache, _) = test_cache().await;
        let k = key("brief");
        cache.put(&k, b"v".to_vec(), Some(Duration::from_millis(50))).await;
        assert!(cache.get(&k).await.is_some());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(cache.get(&k).await.is_none());
    }

    #[tokio::test]
    async fn test_delete_both_tiers_idempotent() {
        let (cache, store) = test_cache().await;
        let k = key("gone");
        cache.put(&k, b"v".to_vec(), None).await;

        assert!(cache.delete(&k).await);
        assert!(!cache.delete(&k).await);
        assert!(cache.get(&k).await.is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_exists_checks_both_tiers() {
        let (cache, store) = test_cache().await;
        let k = key("remote-only");
        assert!(!cache.exists(&k).await);

        store.set(&cache.versioner.versioned_key(&k), b"v", None).await.unwrap();
        assert!(cache.exists(&k).await);
        // exists never backfills
        assert!(!cache.local().exists(&k));
    }

    #[tokio::test]
    async fn test_invalidate_namespace() {
        let (cache, store) = test_cache().await;
        let a1 = CacheKey::namespaced("a", "1").unwrap();
        let a2 = CacheKey::namespaced("a", "2").unwrap();
        let b1 = CacheKey::namespaced("b", "1").unwrap();
        let global = key("1");
        for k in [&a1, &a2, &b1, &global] {
            cache.put(k, b"v".to_vec(), None).await;
        }

        let mut removed = cache.invalidate_namespace("a").await.unwrap();
        removed.sort();
        let mut expected = vec![cache.versioner.versioned_key(&a1), cache.versioner.versioned_key(&a2)];
        expected.sort();
        assert_eq!(removed, expected);

        assert!(cache.get(&a1).await.is_none());
        assert!(cache.get(&a2).await.is_none());
        assert!(cache.get(&b1).await.is_some());
        assert!(cache.get(&global).await.is_some());
        assert_eq!(store.len(), 2);
        assert_eq!(cache.local().len(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_rejects_glob_namespace() {
        let (cache, _) = test_cache().await;
        assert!(matches!(
            cache.invalidate_namespace("*").await,
            Err(CacheError::InvalidNamespace(_))
        ));
        assert!(cache.invalidate_namespace("").await.is_err());
    }

    #[tokio::test]
    async fn test_invalidate_unknown_namespace_is_empty() {
        let (cache, _) = test_cache().await;
        assert!(cache.invalidate_namespace("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bump_version_hides_both_tiers() {
        let (cache, store) = test_cache().await;
        let k = key("k");
        cache.put(&k, b"old".to_vec(), None).await;
        assert_eq!(cache.version(), 1);

        assert_eq!(cache.bump_version(), 2);
        assert!(cache.local().is_empty());
        // The v1 copy is still in L2 but no longer addressable
        assert_eq!(store.len(), 1);
        assert!(cache.get(&k).await.is_none());

        cache.put(&k, b"new".to_vec(), None).await;
        assert_eq!(cache.get(&k).await, Some(b"new".to_vec()));
        assert_eq!(cache.metrics_snapshot().version, 2);
    }

    #[tokio::test]
    async fn test_update_version_round_trip() {
        let (cache, _) = test_cache().await;
        let k = key("k");
        cache.put(&k, b"one".to_vec(), None).await;

        cache.update_version(2);
        assert!(cache.get(&k).await.is_none());
        cache.put(&k, b"two".to_vec(), None).await;

        // Back to generation 1: the v1 entry is still in L2
        cache.update_version(1);
        assert_eq!(cache.get(&k).await, Some(b"one".to_vec()));
    }

    #[tokio::test]
    async fn test_oversized_value_still_reaches_l2() {
        let config = CacheConfig {
            l1_max_bytes: 1024,
            ..Default::default()
        };
        let (cache, _) = cache_with(config).await;
        let outcome = cache.put(&key("big"), vec![0; 4096], None).await;
        assert_eq!(outcome, PutOutcome { l1: false, l2: true });
        assert_eq!(cache.get(&key("big")).await.map(|v| v.len()), Some(4096));
    }

    #[tokio::test]
    async fn test_l2_failure_degrades_to_l1() {
        let (cache, store) = test_cache().await;
        store.close().await.unwrap();

        let k = key("k");
        let outcome = cache.put(&k, b"v".to_vec(), None).await;
        assert_eq!(outcome, PutOutcome { l1: true, l2: false });
        assert_eq!(cache.get(&k).await, Some(b"v".to_vec()));
        assert!(cache.get(&key("other")).await.is_none());
        assert!(cache.invalidate_namespace("ns").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_access_tracking_with_eviction() {
        let config = CacheConfig {
            eviction_max_memory_bytes: Some(1),
            ..Default::default()
        };
        let (cache, store) = cache_with(config).await;
        for i in 0..20 {
            cache.put(&key(&format!("k{}", i)), b"v".to_vec(), None).await;
        }
        assert_eq!(store.index_len(crate::eviction::ACCESS_INDEX).await.unwrap(), 20);

        cache.delete(&key("k0")).await;
        assert_eq!(store.index_len(crate::eviction::ACCESS_INDEX).await.unwrap(), 19);

        let report = cache.evict_remote().await.unwrap();
        assert_eq!(report.evicted.len(), 2);
        assert_eq!(store.len(), 17);
    }

    #[tokio::test]
    async fn test_evict_remote_disabled_by_default() {
        let (cache, _) = test_cache().await;
        assert!(cache.evict_remote().await.is_none());
    }

    #[tokio::test]
    async fn test_filter_skips_l2_for_never_cached_keys() {
        let config = CacheConfig {
            bloom_filter: true,
            ..Default::default()
        };
        let (cache, store) = cache_with(config).await;
        assert_eq!(cache.filter().name(), "remote_bloom");

        let before = store.command_count();
        assert!(cache.get(&key("never")).await.is_none());
        // One BF.EXISTS, no GET
        assert_eq!(store.command_count(), before + 1);

        let k = key("cached");
        cache.put(&k, b"v".to_vec(), None).await;
        cache.local().clear();
        assert_eq!(cache.get(&k).await, Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn test_filter_falls_back_when_unsupported() {
        let config = CacheConfig {
            bloom_filter: true,
            ..Default::default()
        };
        let store = Arc::new(InMemoryStore::new());
        let cache = TieredCache::with_store(config, store).await.unwrap();
        assert_eq!(cache.filter().name(), "disabled");
    }

    #[tokio::test]
    async fn test_cluster_topology_passthrough() {
        let (cache, store) = test_cache().await;
        assert_eq!(cache.cluster_topology().await, ClusterTopology::STANDALONE);

        store.set_cluster_mode(ClusterMode::Cluster {
            slots_assigned: 16384,
            known_nodes: 2,
        });
        assert_eq!(cache.cluster_topology().await.slots_per_node, 8192);
    }

    #[tokio::test]
    async fn test_purge_and_force_eviction() {
        let (cache, _) = test_cache().await;
        cache.put(&key("short"), b"v".to_vec(), Some(Duration::from_millis(10))).await;
        cache.put(&key("long"), b"v".to_vec(), None).await;

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.force_eviction(), 0);
        assert_eq!(cache.local().len(), 1);
    }
}
