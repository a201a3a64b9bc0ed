// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-process [`RemoteStore`] for tests and single-node deployments.
//!
//! Mirrors the Redis semantics the cache relies on: per-key expiry,
//! glob `SCAN`, sorted-set access index, and an optional membership
//! filter. Reported memory is the sum of stored value sizes unless a
//! test pins it with [`InMemoryStore::set_used_memory`].

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;

use super::traits::{ClusterMode, RemoteStore, StoreError};

#[derive(Clone)]
struct StoredValue {
    data: Vec<u8>,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

pub struct InMemoryStore {
    data: DashMap<String, StoredValue>,
    indexes: Mutex<HashMap<String, HashMap<String, f64>>>,
    filters: DashMap<String, HashSet<String>>,
    filters_enabled: bool,
    pinned_memory: Mutex<Option<u64>>,
    cluster: Mutex<ClusterMode>,
    closed: AtomicBool,
    commands: AtomicU64,
}

impl InMemoryStore {
    /// Create a new empty store without membership filter support.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
            indexes: Mutex::new(HashMap::new()),
            filters: DashMap::new(),
            filters_enabled: false,
            pinned_memory: Mutex::new(None),
            cluster: Mutex::new(ClusterMode::Standalone),
            closed: AtomicBool::new(false),
            commands: AtomicU64::new(0),
        }
    }

    /// Store that accepts `filter_add` / `filter_exists`, like Redis with
    /// the bloom module loaded. The filter here is exact.
    #[must_use]
    pub fn with_filters() -> Self {
        Self {
            filters_enabled: true,
            ..Self::new()
        }
    }

    /// Report a fixed `used_memory` instead of the computed one.
    pub fn set_used_memory(&self, bytes: Option<u64>) {
        *self.pinned_memory.lock() = bytes;
    }

    pub fn set_cluster_mode(&self, mode: ClusterMode) {
        *self.cluster.lock() = mode;
    }

    /// Live (unexpired) entries.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.data.iter().filter(|e| e.value().is_live(now)).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining TTL of `key`, if it has one.
    #[must_use]
    pub fn ttl_of(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.data
            .get(key)
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    /// Number of trait calls served so far.
    #[must_use]
    pub fn command_count(&self) -> u64 {
        self.commands.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.data.clear();
        self.indexes.lock().clear();
        self.filters.clear();
    }

    fn begin(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Connection("store closed".to_string()));
        }
        self.commands.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn live_value(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        let entry = self.data.get(key)?;
        if entry.is_live(now) {
            return Some(entry.data.clone());
        }
        drop(entry);
        self.data.remove_if(key, |_, v| !v.is_live(now));
        None
    }

    fn remove_live(&self, key: &str) -> bool {
        let now = Instant::now();
        self.data.remove(key).map_or(false, |(_, v)| v.is_live(now))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Redis-style glob: `*` matches any run, `?` any single char.
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

#[async_trait]
impl RemoteStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.begin()?;
        Ok(self.live_value(key))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), StoreError> {
        self.begin()?;
        let expires_at = ttl.map(|t| Instant::now() + t.max(Duration::from_millis(1)));
        self.data.insert(
            key.to_string(),
            StoredValue {
                data: value.to_vec(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.begin()?;
        Ok(self.remove_live(key))
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.begin()?;
        Ok(self.live_value(key).is_some())
    }

    async fn scan_match(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        self.begin()?;
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .data
            .iter()
            .filter(|e| e.value().is_live(now) && glob_match(pattern, e.key()))
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn index_touch(&self, index: &str, key: &str, score: f64) -> Result<(), StoreError> {
        self.begin()?;
        self.indexes
            .lock()
            .entry(index.to_string())
            .or_default()
            .insert(key.to_string(), score);
        Ok(())
    }

    async fn index_len(&self, index: &str) -> Result<u64, StoreError> {
        self.begin()?;
        Ok(self.indexes.lock().get(index).map_or(0, |set| set.len() as u64))
    }

    async fn index_lowest(&self, index: &str, count: usize) -> Result<Vec<String>, StoreError> {
        self.begin()?;
        let indexes = self.indexes.lock();
        let Some(set) = indexes.get(index) else {
            return Ok(Vec::new());
        };
        let mut members: Vec<(&String, f64)> = set.iter().map(|(k, s)| (k, *s)).collect();
        // Same ordering as ZRANGE: by score, then lexicographically
        members.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));
        Ok(members.into_iter().take(count).map(|(k, _)| k.clone()).collect())
    }

    async fn index_remove(&self, index: &str, keys: &[String]) -> Result<usize, StoreError> {
        self.begin()?;
        let mut indexes = self.indexes.lock();
        let Some(set) = indexes.get_mut(index) else {
            return Ok(0);
        };
        Ok(keys.iter().filter(|k| set.remove(k.as_str()).is_some()).count())
    }

    async fn evict_indexed(&self, index: &str, keys: &[String]) -> Result<usize, StoreError> {
        self.begin()?;
        // Holding the index lock across both removals keeps them atomic
        // with respect to other index operations.
        let mut indexes = self.indexes.lock();
        let deleted = keys.iter().filter(|k| self.remove_live(k)).count();
        if let Some(set) = indexes.get_mut(index) {
            for key in keys {
                set.remove(key);
            }
        }
        Ok(deleted)
    }

    async fn used_memory(&self) -> Result<u64, StoreError> {
        self.begin()?;
        if let Some(pinned) = *self.pinned_memory.lock() {
            return Ok(pinned);
        }
        let now = Instant::now();
        Ok(self
            .data
            .iter()
            .filter(|e| e.value().is_live(now))
            .map(|e| (e.key().len() + e.value().data.len()) as u64)
            .sum())
    }

    async fn cluster_mode(&self) -> Result<ClusterMode, StoreError> {
        self.begin()?;
        Ok(*self.cluster.lock())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.begin()
    }

    async fn filter_add(&self, filter: &str, item: &str) -> Result<bool, StoreError> {
        self.begin()?;
        if !self.filters_enabled {
            return Err(StoreError::Unsupported(format!("membership filter '{}'", filter)));
        }
        Ok(self.filters.entry(filter.to_string()).or_default().insert(item.to_string()))
    }

    async fn filter_exists(&self, filter: &str, item: &str) -> Result<bool, StoreError> {
        self.begin()?;
        if !self.filters_enabled {
            return Err(StoreError::Unsupported(format!("membership filter '{}'", filter)));
        }
        Ok(self.filters.get(filter).map_or(false, |set| set.contains(item)))
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
