// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Tiered Cache
//!
//! A memory-bounded, versioned, TTL-aware LRU cache with a shared remote tier.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TieredCache facade                      │
//! │  • get / put / delete / invalidate_namespace               │
//! │  • Hit/miss counters per tier                              │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    L1: In-Process LRU                       │
//! │  • Byte budget, evicts least recently used                 │
//! │  • Per-entry TTL, lazy expiry + periodic sweep             │
//! │  • Generation version in every key                         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                     (miss → read-through)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     L2: Redis                               │
//! │  • Pooled connections, timeouts, one retry on timeout      │
//! │  • Failures degrade to misses, never errors                │
//! │  • Access-order index + 10% eviction sweep                 │
//! │  • Optional bloom filter to skip never-cached lookups      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tiered_cache::{CacheConfig, CacheKey, TieredCache};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = CacheConfig {
//!         redis_url: Some("redis://localhost:6379".into()),
//!         redis_prefix: Some("analysis:".into()),
//!         eviction_max_memory_bytes: Some(512 * 1024 * 1024),
//!         ..Default::default()
//!     };
//!
//!     let cache = Arc::new(TieredCache::connect(config).await.expect("Failed to connect"));
//!     cache.start_maintenance();
//!
//!     let key = CacheKey::namespaced("project-42", "/srv/repo").unwrap();
//!     cache.put(&key, b"{\"status\":\"COMPLETED\"}".to_vec(), Some(Duration::from_secs(600))).await;
//!
//!     if let Some(bytes) = cache.get(&key).await {
//!         println!("Cached: {}", String::from_utf8_lossy(&bytes));
//!     }
//!
//!     // Drop everything cached for the project
//!     cache.invalidate_namespace("project-42").await.unwrap();
//!
//!     cache.shutdown().await;
//! }
//! ```
//!
//! ## Configuration
//!
//! See [`CacheConfig`] for all configuration options.
//!
//! ## Modules
//!
//! - [`cache`]: The [`TieredCache`] facade
//! - [`local`]: L1 LRU and its expiry index
//! - [`remote`]: Error-absorbing L2 client and cluster topology
//! - [`storage`]: Remote store backends (Redis, in-memory)
//! - [`eviction`]: Remote access-order eviction
//! - [`filter`]: Optional membership filter
//! - [`resilience`]: Retry logic

pub mod cache;
pub mod config;
pub mod error;
pub mod eviction;
pub mod filter;
pub mod keys;
pub mod local;
pub mod metrics;
pub mod remote;
pub mod resilience;
pub mod size;
pub mod storage;
pub mod ttl;

pub use cache::{CacheState, MetricsSnapshot, PutOutcome, TieredCache};
pub use config::CacheConfig;
pub use error::CacheError;
pub use eviction::{EvictionCoordinator, EvictionReport};
pub use filter::{DisabledFilter, FilterTrust, MembershipFilter, RemoteBloomFilter};
pub use keys::{CacheKey, KeyVersioner};
pub use local::{ExpiryIndex, LocalLruCache};
pub use metrics::LatencyTimer;
pub use remote::{ClusterTopology, RemoteStoreClient};
pub use resilience::retry::RetryConfig;
pub use size::{estimate_entry, SizedValue};
pub use storage::{RemoteStore, StoreError};
pub use ttl::TtlPolicy;
