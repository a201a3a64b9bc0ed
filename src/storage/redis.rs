// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Redis backend for the L2 tier.
//!
//! Values are stored as plain Redis strings. TTLs use `SET .. PX` so
//! sub-second lifetimes survive. The access-order index is a sorted set,
//! and the optional membership filter maps onto RedisBloom (`BF.ADD` /
//! `BF.EXISTS`), which plain Redis rejects with an unknown-command error.
//!
//! The store targets a standalone Redis (or a single node behind a proxy).
//! It opens a plain client, and the eviction transaction deletes several
//! keys plus a `ZREM` in one `MULTI`/`EXEC`, which Redis Cluster rejects
//! with `CROSSSLOT`. `CLUSTER INFO` is read only to report the slot layout.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use redis::{cmd, pipe};

use super::pool::{PoolSettings, RedisPool};
use super::traits::{ClusterMode, RemoteStore, StoreError};

/// Keys per `SCAN` page.
const SCAN_COUNT: usize = 500;

pub struct RedisStore {
    pool: RedisPool,
    /// Optional key prefix for sharing an instance (e.g., "myapp:" → "myapp:v1:...")
    prefix: String,
}

impl RedisStore {
    /// Connect without a key prefix, using default pool settings.
    pub async fn new(url: &str) -> Result<Self, StoreError> {
        Self::connect(url, None, &PoolSettings::default()).await
    }

    /// Connect with an optional key prefix.
    ///
    /// The prefix is prepended to every key, index and filter name, and
    /// stripped from keys returned by [`RemoteStore::scan_match`].
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use tiered_cache::storage::{PoolSettings, RedisStore};
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let store = RedisStore::connect("redis://localhost", Some("myapp:"), &PoolSettings::default()).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(url: &str, prefix: Option<&str>, settings: &PoolSettings) -> Result<Self, StoreError> {
        let pool = RedisPool::connect(url, settings).await?;
        Ok(Self {
            pool,
            prefix: prefix.unwrap_or("").to_string(),
        })
    }

    #[inline]
    fn prefixed_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}{}", self.prefix, key)
        }
    }

    #[inline]
    fn strip_prefix<'a>(&self, key: &'a str) -> &'a str {
        if self.prefix.is_empty() {
            key
        } else {
            key.strip_prefix(&self.prefix).unwrap_or(key)
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    async fn info_section(&self, section: &'static str) -> Result<String, StoreError> {
        self.pool
            .run("redis_info", |mut conn| async move { cmd("INFO").arg(section).query_async(&mut conn).await })
            .await
    }
}

/// Pull `field:value` out of an `INFO`-style reply.
pub(crate) fn parse_info_field<'a>(info: &'a str, field: &str) -> Option<&'a str> {
    info.lines().find_map(|line| {
        let (name, value) = line.trim().split_once(':')?;
        (name == field).then_some(value.trim())
    })
}

/// Interpret `INFO cluster` and, when cluster support is on, `CLUSTER INFO`.
pub(crate) fn parse_cluster_mode(info_cluster: &str, cluster_info: Option<&str>) -> Result<ClusterMode, StoreError> {
    if parse_info_field(info_cluster, "cluster_enabled") != Some("1") {
        return Ok(ClusterMode::Standalone);
    }
    let info = cluster_info.ok_or_else(|| StoreError::Backend("CLUSTER INFO unavailable".to_string()))?;
    let field = |name: &str| -> Result<u32, StoreError> {
        parse_info_field(info, name)
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| StoreError::Backend(format!("CLUSTER INFO missing {}", name)))
    };
    Ok(ClusterMode::Cluster {
        slots_assigned: field("cluster_slots_assigned")?,
        known_nodes: field("cluster_known_nodes")?,
    })
}

#[async_trait]
impl RemoteStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let key = self.prefixed_key(key);
        self.pool
            .run("redis_get", |mut conn| {
                let key = key.clone();
                async move { cmd("GET").arg(&key).query_async(&mut conn).await }
            })
            .await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), StoreError> {
        let key = self.prefixed_key(key);
        // PX 0 is rejected by Redis; clamp to the smallest legal expiry
        let ttl_ms = ttl.map(|t| (t.as_millis() as u64).max(1));
        self.pool
            .run("redis_set", |mut conn| {
                let key = key.clone();
                async move {
                    let mut command = cmd("SET");
                    command.arg(&key).arg(value);
                    if let Some(ms) = ttl_ms {
                        command.arg("PX").arg(ms);
                    }
                    command.query_async::<()>(&mut conn).await
                }
            })
            .await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let key = self.prefixed_key(key);
        let removed: i64 = self
            .pool
            .run("redis_delete", |mut conn| {
                let key = key.clone();
                async move { cmd("DEL").arg(&key).query_async(&mut conn).await }
            })
            .await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let key = self.prefixed_key(key);
        self.pool
            .run("redis_exists", |mut conn| {
                let key = key.clone();
                async move { cmd("EXISTS").arg(&key).query_async(&mut conn).await }
            })
            .await
    }

    /// Pipelined per-key `DEL`: one round-trip, with a count per key.
    async fn delete_many(&self, keys: &[String]) -> Result<usize, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let prefixed: Vec<String> = keys.iter().map(|k| self.prefixed_key(k)).collect();
        let counts: Vec<i64> = self
            .pool
            .run("redis_delete_many", |mut conn| {
                let prefixed = prefixed.clone();
                async move {
                    let mut pipeline = pipe();
                    for key in &prefixed {
                        pipeline.del(key);
                    }
                    pipeline.query_async(&mut conn).await
                }
            })
            .await?;
        Ok(counts.into_iter().filter(|c| *c > 0).count())
    }

    async fn scan_match(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let pattern = self.prefixed_key(pattern);
        // SCAN may repeat keys across pages
        let mut found = BTreeSet::new();
        let mut cursor: u64 = 0;

        loop {
            let (next, page): (u64, Vec<String>) = self
                .pool
                .run("redis_scan", |mut conn| {
                    let pattern = pattern.clone();
                    async move {
                        cmd("SCAN")
                            .arg(cursor)
                            .arg("MATCH")
                            .arg(&pattern)
                            .arg("COUNT")
                            .arg(SCAN_COUNT)
                            .query_async(&mut conn)
                            .await
                    }
                })
                .await?;

            found.extend(page.iter().map(|k| self.strip_prefix(k).to_string()));
            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(found.into_iter().collect())
    }

    async fn index_touch(&self, index: &str, key: &str, score: f64) -> Result<(), StoreError> {
        let index = self.prefixed_key(index);
        let key = key.to_string();
        self.pool
            .run("redis_zadd", |mut conn| {
                let (index, key) = (index.clone(), key.clone());
                async move { cmd("ZADD").arg(&index).arg(score).arg(&key).query_async::<()>(&mut conn).await }
            })
            .await
    }

    async fn index_len(&self, index: &str) -> Result<u64, StoreError> {
        let index = self.prefixed_key(index);
        self.pool
            .run("redis_zcard", |mut conn| {
                let index = index.clone();
                async move { cmd("ZCARD").arg(&index).query_async(&mut conn).await }
            })
            .await
    }

    async fn index_lowest(&self, index: &str, count: usize) -> Result<Vec<String>, StoreError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let index = self.prefixed_key(index);
        let stop = count as i64 - 1;
        self.pool
            .run("redis_zrange", |mut conn| {
                let index = index.clone();
                async move { cmd("ZRANGE").arg(&index).arg(0).arg(stop).query_async(&mut conn).await }
            })
            .await
    }

    async fn index_remove(&self, index: &str, keys: &[String]) -> Result<usize, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let index = self.prefixed_key(index);
        let members = keys.to_vec();
        let removed: i64 = self
            .pool
            .run("redis_zrem", |mut conn| {
                let (index, members) = (index.clone(), members.clone());
                async move { cmd("ZREM").arg(&index).arg(&members).query_async(&mut conn).await }
            })
            .await?;
        Ok(removed.max(0) as usize)
    }

    /// `MULTI` / `EXEC` so a concurrent reader never sees an index entry
    /// whose key is already gone, or the reverse.
    async fn evict_indexed(&self, index: &str, keys: &[String]) -> Result<usize, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let index = self.prefixed_key(index);
        let prefixed: Vec<String> = keys.iter().map(|k| self.prefixed_key(k)).collect();
        let members = keys.to_vec();
        let (deleted, _unindexed): (i64, i64) = self
            .pool
            .run("redis_evict", |mut conn| {
                let (index, prefixed, members) = (index.clone(), prefixed.clone(), members.clone());
                async move {
                    let mut pipeline = pipe();
                    pipeline.atomic().del(&prefixed).zrem(&index, &members);
                    pipeline.query_async(&mut conn).await
                }
            })
            .await?;
        Ok(deleted.max(0) as usize)
    }

    async fn used_memory(&self) -> Result<u64, StoreError> {
        let info = self.info_section("memory").await?;
        parse_info_field(&info, "used_memory")
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| StoreError::Backend("INFO memory missing used_memory".to_string()))
    }

    async fn cluster_mode(&self) -> Result<ClusterMode, StoreError> {
        let info = self.info_section("cluster").await?;
        if parse_info_field(&info, "cluster_enabled") != Some("1") {
            return Ok(ClusterMode::Standalone);
        }
        let cluster_info: String = self
            .pool
            .run("redis_cluster_info", |mut conn| async move {
                cmd("CLUSTER").arg("INFO").query_async(&mut conn).await
            })
            .await?;
        parse_cluster_mode(&info, Some(&cluster_info))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let _pong: String = self
            .pool
            .run("redis_ping", |mut conn| async move { cmd("PING").query_async(&mut conn).await })
            .await?;
        Ok(())
    }

    async fn filter_add(&self, filter: &str, item: &str) -> Result<bool, StoreError> {
        let filter = self.prefixed_key(filter);
        let item = item.to_string();
        self.pool
            .run("redis_bf_add", |mut conn| {
                let (filter, item) = (filter.clone(), item.clone());
                async move { cmd("BF.ADD").arg(&filter).arg(&item).query_async(&mut conn).await }
            })
            .await
    }

    async fn filter_exists(&self, filter: &str, item: &str) -> Result<bool, StoreError> {
        let filter = self.prefixed_key(filter);
        let item = item.to_string();
        self.pool
            .run("redis_bf_exists", |mut conn| {
                let (filter, item) = (filter.clone(), item.clone());
                async move { cmd("BF.EXISTS").arg(&filter).arg(&item).query_async(&mut conn).await }
            })
            .await
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.pool.close();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_info_field() {
        let info = "# Memory\r\nused_memory:1048576\r\nused_memory_human:1.00M\r\n";
        assert_eq!(parse_info_field(info, "used_memory"), Some("1048576"));
        assert_eq!(parse_info_field(info, "used_memory_human"), Some("1.00M"));
        assert_eq!(parse_info_field(info, "maxmemory"), None);
    }

    #[test]
    fn test_cluster_disabled_is_standalone() {
        let info = "# Cluster\r\ncluster_enabled:0\r\n";
        assert_eq!(parse_cluster_mode(info, None).unwrap(), ClusterMode::Standalone);
    }

    #[test]
    fn test_missing_cluster_section_is_standalone() {
        assert_eq!(parse_cluster_mode("", None).unwrap(), ClusterMode::Standalone);
    }

    #[test]
    fn test_cluster_enabled_reads_cluster_info() {
        let info = "# Cluster\r\ncluster_enabled:1\r\n";
        let cluster = "cluster_state:ok\r\ncluster_slots_assigned:16384\r\ncluster_known_nodes:3\r\n";
        assert_eq!(
            parse_cluster_mode(info, Some(cluster)).unwrap(),
            ClusterMode::Cluster {
                slots_assigned: 16384,
                known_nodes: 3
            }
        );
    }

    #[test]
    fn test_cluster_info_missing_fields_is_error() {
        let info = "cluster_enabled:1\r\n";
        assert!(parse_cluster_mode(info, Some("cluster_state:fail\r\n")).is_err());
        assert!(parse_cluster_mode(info, None).is_err());
    }
}
