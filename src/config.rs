// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the tiered cache.
//!
//! # Example
//!
//! ```
//! use tiered_cache::CacheConfig;
//!
//! // Minimal config (uses defaults, in-process L2)
//! let config = CacheConfig::default();
//! assert_eq!(config.l1_max_bytes, 20 * 1024 * 1024); // 20 MB
//!
//! // Full config
//! let config = CacheConfig {
//!     redis_url: Some("redis://localhost:6379".into()),
//!     redis_prefix: Some("analysis:".into()),
//!     l1_max_bytes: 64 * 1024 * 1024,
//!     eviction_max_memory_bytes: Some(512 * 1024 * 1024),
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//!
//! // Or from JSON, where every field is optional
//! let config = CacheConfig::from_json(r#"{"pool_size": 8}"#).unwrap();
//! assert_eq!(config.pool_size, 8);
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::error::CacheError;
use crate::storage::PoolSettings;
use crate::ttl::TtlPolicy;

/// Configuration for the tiered cache.
///
/// All fields have sensible defaults. Without `redis_url` the L2 tier is an
/// in-process store, which is only useful for tests and single-process use.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Redis connection string (e.g., "redis://localhost:6379")
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Prefix for every remote key, index and filter (e.g., "analysis:")
    #[serde(default)]
    pub redis_prefix: Option<String>,

    /// L1 byte budget (default: 20 MB)
    #[serde(default = "default_l1_max_bytes")]
    pub l1_max_bytes: usize,

    /// L1 TTL applied when a put gives none (default: no expiry)
    #[serde(default)]
    pub l1_default_ttl_secs: Option<u64>,

    /// Upper bound on any L1 lifetime, including L2 backfills
    #[serde(default = "default_l1_ttl_secs")]
    pub l1_ttl_secs: u64,

    /// Remote connection pool
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_socket_timeout_ms")]
    pub socket_timeout_ms: u64,
    #[serde(default = "default_true")]
    pub retry_on_timeout: bool,

    /// Overall cap per remote call from the facade (default: none)
    #[serde(default)]
    pub operation_timeout_ms: Option<u64>,

    /// Remote eviction ceiling. `None` disables access tracking and sweeps.
    #[serde(default)]
    pub eviction_max_memory_bytes: Option<u64>,
    #[serde(default = "default_eviction_interval_secs")]
    pub eviction_interval_secs: u64,

    /// L1 expiry sweep interval for background maintenance
    #[serde(default = "default_expiry_sweep_interval_secs")]
    pub expiry_sweep_interval_secs: u64,

    /// Size-based TTL policy
    #[serde(default = "default_small_ttl_secs")]
    pub small_ttl_secs: u64,
    #[serde(default = "default_large_ttl_secs")]
    pub large_ttl_secs: u64,
    #[serde(default = "default_large_threshold_bytes")]
    pub large_threshold_bytes: usize,

    /// Starting cache generation
    #[serde(default = "default_initial_version")]
    pub initial_version: u64,

    /// Use a RedisBloom filter to skip L2 lookups for never-cached keys
    #[serde(default)]
    pub bloom_filter: bool,
    #[serde(default = "default_bloom_filter_name")]
    pub bloom_filter_name: String,
}

fn default_l1_max_bytes() -> usize { 20 * 1024 * 1024 } // 20 MB
fn default_l1_ttl_secs() -> u64 { 300 }
fn default_pool_size() -> usize { 4 }
fn default_max_connections() -> usize { 50 }
fn default_connect_timeout_ms() -> u64 { 5_000 }
fn default_socket_timeout_ms() -> u64 { 30_000 }
fn default_true() -> bool { true }
fn default_eviction_interval_secs() -> u64 { 60 }
fn default_expiry_sweep_interval_secs() -> u64 { 30 }
fn default_small_ttl_secs() -> u64 { 3600 }
fn default_large_ttl_secs() -> u64 { 600 }
fn default_large_threshold_bytes() -> usize { 1_000_000 }
fn default_initial_version() -> u64 { 1 }
fn default_bloom_filter_name() -> String { "cached_keys".to_string() }

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            redis_prefix: None,
            l1_max_bytes: default_l1_max_bytes(),
            l1_default_ttl_secs: None,
            l1_ttl_secs: default_l1_ttl_secs(),
            pool_size: default_pool_size(),
            max_connections: default_max_connections(),
            connect_timeout_ms: default_connect_timeout_ms(),
            socket_timeout_ms: default_socket_timeout_ms(),
            retry_on_timeout: true,
            operation_timeout_ms: None,
            eviction_max_memory_bytes: None,
            eviction_interval_secs: default_eviction_interval_secs(),
            expiry_sweep_interval_secs: default_expiry_sweep_interval_secs(),
            small_ttl_secs: default_small_ttl_secs(),
            large_ttl_secs: default_large_ttl_secs(),
            large_threshold_bytes: default_large_threshold_bytes(),
            initial_version: default_initial_version(),
            bloom_filter: false,
            bloom_filter_name: default_bloom_filter_name(),
        }
    }
}

impl CacheConfig {
    /// Parse from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, CacheError> {
        let config: Self = serde_json::from_str(json).map_err(|e| CacheError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the cache cannot run with.
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.l1_max_bytes == 0 {
            return Err(CacheError::Config("l1_max_bytes must be greater than zero".into()));
        }
        if self.pool_size == 0 || self.max_connections == 0 {
            return Err(CacheError::Config("pool_size and max_connections must be greater than zero".into()));
        }
        if self.connect_timeout_ms == 0 || self.socket_timeout_ms == 0 {
            return Err(CacheError::Config("timeouts must be greater than zero".into()));
        }
        if self.operation_timeout_ms == Some(0) {
            return Err(CacheError::Config("operation_timeout_ms must be greater than zero when set".into()));
        }
        if self.small_ttl_secs == 0 || self.large_ttl_secs == 0 {
            return Err(CacheError::Config("small_ttl_secs and large_ttl_secs must be greater than zero".into()));
        }
        if self.l1_ttl_secs == 0 {
            return Err(CacheError::Config("l1_ttl_secs must be greater than zero".into()));
        }
        if self.eviction_interval_secs == 0 || self.expiry_sweep_interval_secs == 0 {
            return Err(CacheError::Config("maintenance intervals must be greater than zero".into()));
        }
        if self.initial_version == 0 {
            return Err(CacheError::Config("initial_version starts at 1".into()));
        }
        if self.bloom_filter && self.bloom_filter_name.is_empty() {
            return Err(CacheError::Config("bloom_filter_name must not be empty".into()));
        }
        Ok(())
    }

    #[must_use]
    pub fn l1_default_ttl(&self) -> Option<Duration> {
        self.l1_default_ttl_secs.map(Duration::from_secs)
    }

    #[must_use]
    pub fn l1_ttl(&self) -> Duration {
        Duration::from_secs(self.l1_ttl_secs)
    }

    #[must_use]
    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_ms.map(Duration::from_millis)
    }

    #[must_use]
    pub fn eviction_interval(&self) -> Duration {
        Duration::from_secs(self.eviction_interval_secs)
    }

    #[must_use]
    pub fn expiry_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_sweep_interval_secs)
    }

    #[must_use]
    pub fn ttl_policy(&self) -> TtlPolicy {
        TtlPolicy::new(
            Duration::from_secs(self.small_ttl_secs),
            Duration::from_secs(self.large_ttl_secs),
            self.large_threshold_bytes,
        )
    }

    #[must_use]
    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            pool_size: self.pool_size,
            max_connections: self.max_connections,
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            socket_timeout: Duration::from_millis(self.socket_timeout_ms),
            retry_on_timeout: self.retry_on_timeout,
        }
    }
}
