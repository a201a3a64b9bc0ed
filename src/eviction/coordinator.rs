// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Remote-tier eviction over an access-order index.
//!
//! Callers record every read and write with [`EvictionCoordinator::track_access`],
//! which scores the key with the current unix time in a sorted set. When the
//! store reports memory at or above the ceiling, a sweep removes the oldest
//! 10% of tracked keys (at least one), deleting each key and its index entry
//! together.
//!
//! ```text
//! used_memory >= max_memory ?
//!   no  → nothing to do
//!   yes → n = max(1, ceil(0.10 × ZCARD))
//!         ZRANGE lru_access 0 n-1
//!         MULTI; DEL victims; ZREM lru_access victims; EXEC
//! ```
//!
//! Untracked keys are never candidates. Concurrent sweeps may together
//! remove slightly more or less than 10%.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::profile::RemoteMemoryProfile;
use crate::metrics;
use crate::storage::{RemoteStore, StoreError};

/// Name of the access-order sorted set (before any store prefix).
pub const ACCESS_INDEX: &str = "lru_access";

/// Share of tracked keys removed per sweep.
pub const EVICTION_PERCENT: u64 = 10;

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EvictionReport {
    /// Remote memory observed before the sweep.
    pub used_bytes: u64,
    /// Index size observed before the sweep.
    pub tracked_keys: u64,
    /// Keys removed from the index, oldest first.
    pub evicted: Vec<String>,
    /// How many of `evicted` still existed in the store.
    pub deleted: usize,
}

impl EvictionReport {
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.evicted.is_empty()
    }
}

/// Statistics for monitoring eviction state.
#[derive(Debug, Clone, Serialize)]
pub struct EvictionStats {
    pub used_bytes: u64,
    pub max_bytes: u64,
    pub pending_writes_estimate: u64,
    pub pressure: f64,
    pub sweeps: u64,
    pub evicted_total: u64,
    pub profile_age_secs: f64,
}

/// Number of victims for a sweep over `tracked` keys.
#[must_use]
pub fn victim_count(tracked: u64) -> usize {
    if tracked == 0 {
        return 0;
    }
    // Integer ceil; 30 * 0.1 in f64 rounds up to 4
    tracked.saturating_mul(EVICTION_PERCENT).div_ceil(100).max(1) as usize
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

pub struct EvictionCoordinator {
    store: Arc<dyn RemoteStore>,
    index: String,
    max_memory: u64,
    profile: RwLock<RemoteMemoryProfile>,
    sweeps: AtomicU64,
    evicted_total: AtomicU64,
}

impl EvictionCoordinator {
    #[must_use]
    pub fn new(store: Arc<dyn RemoteStore>, max_memory: u64) -> Self {
        Self {
            store,
            index: ACCESS_INDEX.to_string(),
            max_memory,
            profile: RwLock::new(RemoteMemoryProfile::new(max_memory)),
            sweeps: AtomicU64::new(0),
            evicted_total: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn max_memory(&self) -> u64 {
        self.max_memory
    }

    /// Score `key` with the current time. Returns false if the store refused.
    pub async fn track_access(&self, key: &str) -> bool {
        match self.store.index_touch(&self.index, key, unix_now()).await {
            Ok(()) => true,
            Err(e) => {
                debug!(key, error = %e, "Failed to record access");
                metrics::record_error("L2", "track_access", e.kind());
                false
            }
        }
    }

    /// Drop `key` from the index, e.g. after an explicit delete.
    pub async fn forget(&self, key: &str) -> bool {
        match self.store.index_remove(&self.index, &[key.to_string()]).await {
            Ok(removed) => removed > 0,
            Err(e) => {
                debug!(key, error = %e, "Failed to forget key");
                metrics::record_error("L2", "forget", e.kind());
                false
            }
        }
    }

    /// Drop several keys from the index. Returns how many were tracked.
    pub async fn forget_many(&self, keys: &[String]) -> usize {
        if keys.is_empty() {
            return 0;
        }
        match self.store.index_remove(&self.index, keys).await {
            Ok(removed) => removed,
            Err(e) => {
                debug!(keys = keys.len(), error = %e, "Failed to forget keys");
                metrics::record_error("L2", "forget", e.kind());
                0
            }
        }
    }

    /// Count bytes written since the last profile refresh.
    pub fn record_write(&self, bytes: usize) {
        self.profile.write().add_pending_writes(bytes as u64);
    }

    /// Pressure from the cached profile, without a round-trip.
    #[must_use]
    pub fn pressure(&self) -> f64 {
        self.profile.read().pressure()
    }

    /// Run one sweep against `max_memory`. Store failures are logged and
    /// reported as a no-op sweep.
    pub async fn evict_oldest(&self, max_memory: u64) -> EvictionReport {
        match self.try_evict_oldest(max_memory).await {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "Remote eviction sweep failed");
                metrics::record_error("L2", "evict", e.kind());
                EvictionReport::default()
            }
        }
    }

    /// Sweep against the configured ceiling.
    pub async fn sweep(&self) -> EvictionReport {
        self.evict_oldest(self.max_memory).await
    }

    async fn try_evict_oldest(&self, max_memory: u64) -> Result<EvictionReport, StoreError> {
        self.sweeps.fetch_add(1, Ordering::Relaxed);

        let used_bytes = self.store.used_memory().await?;
        {
            let mut profile = self.profile.write();
            profile.refresh(used_bytes);
            metrics::set_remote_used_bytes(used_bytes);
            metrics::set_remote_memory_pressure(profile.pressure());
        }

        let mut report = EvictionReport {
            used_bytes,
            ..Default::default()
        };
        if used_bytes < max_memory {
            return Ok(report);
        }

        report.tracked_keys = self.store.index_len(&self.index).await?;
        let wanted = victim_count(report.tracked_keys);
        if wanted == 0 {
            debug!(used_bytes, max_memory, "Remote memory over ceiling but nothing tracked");
            return Ok(report);
        }

        let victims = self.store.index_lowest(&self.index, wanted).await?;
        if victims.is_empty() {
            return Ok(report);
        }
        report.deleted = self.store.evict_indexed(&self.index, &victims).await?;
        report.evicted = victims;

        self.evicted_total.fetch_add(report.evicted.len() as u64, Ordering::Relaxed);
        metrics::record_eviction("L2", report.evicted.len(), 0);
        info!(
            used_bytes,
            max_memory,
            tracked = report.tracked_keys,
            evicted = report.evicted.len(),
            deleted = report.deleted,
            "Evicted least recently accessed remote keys"
        );

        Ok(report)
    }

    /// Sweep every `interval` until `shutdown` turns true or its sender drops.
    pub fn spawn(self: Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.sweep().await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            debug!("Remote eviction loop stopping");
                            break;
                        }
                    }
                }
            }
        })
    }

    #[must_use]
    pub fn stats(&self) -> EvictionStats {
        let profile = self.profile.read();
        EvictionStats {
            used_bytes: profile.used_bytes,
            max_bytes: profile.max_bytes,
            pending_writes_estimate: profile.pending_writes_estimate,
            pressure: profile.pressure(),
            sweeps: self.sweeps.load(Ordering::Relaxed),
            evicted_total: self.evicted_total.load(Ordering::Relaxed),
            profile_age_secs: profile.last_updated.elapsed().as_secs_f64(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;

    async fn seeded(count: usize) -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        for i in 0..count {
            let key = format!("key-{:03}", i);
            store.set(&key, b"payload", None).await.unwrap();
            // Older keys get lower scores
            store.index_touch(ACCESS_INDEX, &key, 1_000.0 + i as f64).await.unwrap();
        }
        store
    }

    #[test]
    fn test_victim_count() {
        assert_eq!(victim_count(0), 0);
        assert_eq!(victim_count(1), 1);
        assert_eq!(victim_count(9), 1);
        assert_eq!(victim_count(10), 1);
        assert_eq!(victim_count(11), 2);
        assert_eq!(victim_count(25), 3);
        assert_eq!(victim_count(100), 10);
    }

    #[tokio::test]
    async fn test_below_ceiling_is_noop() {
        let store = seeded(20).await;
        store.set_used_memory(Some(500));
        let coordinator = EvictionCoordinator::new(store.clone(), 1_000);

        let report = coordinator.sweep().await;
        assert!(report.is_noop());
        assert_eq!(report.used_bytes, 500);
        assert_eq!(store.len(), 20);
        assert_eq!(store.index_len(ACCESS_INDEX).await.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_removes_lowest_scored_tenth() {
        let store = seeded(25).await;
        store.set_used_memory(Some(2_000));
        let coordinator = EvictionCoordinator::new(store.clone(), 1_000);

        let report = coordinator.sweep().await;

        assert_eq!(report.tracked_keys, 25);
        assert_eq!(report.evicted, vec!["key-000", "key-001", "key-002"]);
        assert_eq!(report.deleted, 3);
        assert_eq!(store.len(), 22);
        assert_eq!(store.index_len(ACCESS_INDEX).await.unwrap(), 22);
        for key in &report.evicted {
            assert!(!store.exists(key).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_at_ceiling_evicts_at_least_one() {
        let store = seeded(3).await;
        store.set_used_memory(Some(1_000));
        let coordinator = EvictionCoordinator::new(store.clone(), 1_000);

        let report = coordinator.evict_oldest(1_000).await;
        assert_eq!(report.evicted, vec!["key-000"]);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_untracked_keys_are_never_candidates() {
        let store = seeded(2).await;
        store.set("untracked", b"payload", None).await.unwrap();
        store.set_used_memory(Some(u64::MAX));
        let coordinator = EvictionCoordinator::new(store.clone(), 1);

        coordinator.sweep().await;
        coordinator.sweep().await;
        coordinator.sweep().await;

        assert!(store.exists("untracked").await.unwrap());
        assert_eq!(store.len(), 1);
        assert_eq!(coordinator.stats().evicted_total, 2);
    }

    #[tokio::test]
    async fn test_track_access_moves_key_to_back() {
        let store = seeded(10).await;
        store.set_used_memory(Some(2_000));
        let coordinator = EvictionCoordinator::new(store.clone(), 1_000);

        // key-000 was the oldest; touching it now makes key-001 the victim
        assert!(coordinator.track_access("key-000").await);
        let report = coordinator.sweep().await;
        assert_eq!(report.evicted, vec!["key-001"]);
    }

    #[tokio::test]
    async fn test_forget_removes_from_index_only() {
        let store = seeded(2).await;
        let coordinator = EvictionCoordinator::new(store.clone(), 1_000);

        assert!(coordinator.forget("key-000").await);
        assert!(!coordinator.forget("key-000").await);
        assert_eq!(store.index_len(ACCESS_INDEX).await.unwrap(), 1);
        assert!(store.exists("key-000").await.unwrap());
    }

    #[tokio::test]
    async fn test_store_failure_is_noop_report() {
        let store = seeded(5).await;
        store.close().await.unwrap();
        let coordinator = EvictionCoordinator::new(store, 1);

        assert!(coordinator.sweep().await.is_noop());
        assert!(!coordinator.track_access("key-000").await);
    }

    #[tokio::test]
    async fn test_stats_and_pressure() {
        let store = seeded(1).await;
        store.set_used_memory(Some(750));
        let coordinator = EvictionCoordinator::new(store, 1_000);

        coordinator.sweep().await;
        assert!((coordinator.pressure() - 0.75).abs() < 1e-9);

        coordinator.record_write(250);
        let stats = coordinator.stats();
        assert_eq!(stats.pending_writes_estimate, 250);
        assert!((stats.pressure - 1.0).abs() < 1e-9);
        assert_eq!(stats.sweeps, 1);
    }

    #[tokio::test]
    async fn test_spawned_loop_stops_on_shutdown() {
        let store = seeded(10).await;
        store.set_used_memory(Some(u64::MAX));
        let coordinator = Arc::new(EvictionCoordinator::new(store.clone(), 1));
        let (tx, rx) = watch::channel(false);

        let handle = coordinator.clone().spawn(Duration::from_millis(10), rx);
        tokio::time::sleep(Duration::from_millis(60)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(coordinator.stats().sweeps >= 1);
        assert!(store.len() < 10);
    }
}
