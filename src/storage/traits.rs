// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Remote operation timed out")]
    Timeout,
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Not supported by this backend: {0}")]
    Unsupported(String),
}

impl StoreError {
    /// Timeouts are the only errors retried transparently.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, StoreError::Timeout)
    }

    /// Short label for error metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::Timeout => "timeout",
            StoreError::Connection(_) => "connection",
            StoreError::Backend(_) => "backend",
            StoreError::Unsupported(_) => "unsupported",
        }
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_timeout() {
            StoreError::Timeout
        } else if e.is_connection_refusal() || e.is_connection_dropped() || e.is_io_error() {
            StoreError::Connection(e.to_string())
        } else {
            StoreError::Backend(e.to_string())
        }
    }
}

/// Cluster state as reported by the store itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterMode {
    /// Cluster support disabled (plain Redis / single node).
    Standalone,
    Cluster { slots_assigned: u32, known_nodes: u32 },
}

/// The shared remote key/value store behind L2.
///
/// Keys are passed unprefixed; implementations that namespace keys apply
/// and strip their prefix themselves. The sorted-set methods back the
/// access-order index used for remote eviction.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), StoreError>;
    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Delete several keys. Returns how many existed.
    /// Default implementation falls back to sequential deletes.
    async fn delete_many(&self, keys: &[String]) -> Result<usize, StoreError> {
        let mut deleted = 0;
        for key in keys {
            if self.delete(key).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// All keys matching a glob `pattern` (`*` and `?`), unprefixed.
    async fn scan_match(&self, pattern: &str) -> Result<Vec<String>, StoreError>;

    /// Set `key`'s score in sorted set `index`.
    async fn index_touch(&self, index: &str, key: &str, score: f64) -> Result<(), StoreError>;
    async fn index_len(&self, index: &str) -> Result<u64, StoreError>;
    /// The `count` lowest-scored members of `index`, lowest first.
    async fn index_lowest(&self, index: &str, count: usize) -> Result<Vec<String>, StoreError>;
    async fn index_remove(&self, index: &str, keys: &[String]) -> Result<usize, StoreError>;

    /// Delete `keys` from the store and from `index` as one atomic step.
    /// Returns how many keys existed in the store.
    async fn evict_indexed(&self, index: &str, keys: &[String]) -> Result<usize, StoreError>;

    /// Bytes of memory the store reports in use.
    async fn used_memory(&self) -> Result<u64, StoreError>;
    async fn cluster_mode(&self) -> Result<ClusterMode, StoreError>;
    async fn ping(&self) -> Result<(), StoreError>;

    /// Add `item` to probabilistic filter `filter`. Returns true if newly added.
    async fn filter_add(&self, filter: &str, _item: &str) -> Result<bool, StoreError> {
        Err(StoreError::Unsupported(format!("membership filter '{}'", filter)))
    }

    async fn filter_exists(&self, filter: &str, _item: &str) -> Result<bool, StoreError> {
        Err(StoreError::Unsupported(format!("membership filter '{}'", filter)))
    }

    /// Release connections. Later calls fail with [`StoreError::Connection`].
    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
