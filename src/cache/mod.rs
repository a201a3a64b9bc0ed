// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Tiered cache facade.
//!
//! The [`TieredCache`] ties the components together:
//! - L1 in-process LRU with a byte budget, TTLs and generation versioning
//! - L2 remote store (Redis) shared across processes, errors absorbed
//! - optional remote eviction over an access-order index
//! - optional membership filter to skip L2 for never-cached keys
//!
//! # Read / write paths
//!
//! ```text
//! get:  L1 hit ───────────────────────────────► value
//!       L1 miss → filter says never? ─────────► None
//!               → L2 hit → backfill L1 (l1_ttl) ► value
//!               → L2 miss ────────────────────► None
//!
//! put:  ttl = caller's or size policy
//!       L2 SET PX ttl   (+ filter add, access index)
//!       L1 put min(ttl, l1_ttl)
//! ```
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use tiered_cache::{CacheConfig, CacheKey, TieredCache};
//! use tiered_cache::storage::InMemoryStore;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let store = Arc::new(InMemoryStore::new());
//! let cache = TieredCache::with_store(CacheConfig::default(), store).await.unwrap();
//!
//! let key = CacheKey::namespaced("project-42", "report").unwrap();
//! assert!(cache.put(&key, b"{\"score\": 9.1}".to_vec(), None).await.both());
//! assert_eq!(cache.get(&key).await.as_deref(), Some(&b"{\"score\": 9.1}"[..]));
//!
//! let removed = cache.invalidate_namespace("project-42").await.unwrap();
//! assert_eq!(removed.len(), 1);
//! assert!(cache.get(&key).await.is_none());
//! # }
//! ```

mod api;
mod lifecycle;
mod types;

pub use types::{CacheState, MetricsSnapshot, PutOutcome};

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::eviction::EvictionCoordinator;
use crate::filter::{DisabledFilter, MembershipFilter, RemoteBloomFilter};
use crate::keys::KeyVersioner;
use crate::local::LocalLruCache;
use crate::metrics::CacheStats;
use crate::remote::RemoteStoreClient;
use crate::storage::{InMemoryStore, RedisStore, RemoteStore};
use crate::ttl::TtlPolicy;

/// Two-tier cache: in-process LRU in front of a shared remote store.
///
/// Build it once and share it as `Arc<TieredCache>`. Every method takes
/// `&self`; L1 is guarded by a single lock and L2 calls run concurrently
/// over the store's connection pool.
pub struct TieredCache {
    pub(super) config: CacheConfig,

    /// Generation counter shared with L1
    pub(super) versioner: Arc<KeyVersioner>,

    /// L1: in-process LRU
    pub(super) l1: LocalLruCache,

    /// L2: remote store, failures absorbed
    pub(super) l2: RemoteStoreClient,

    /// Remote eviction (only with `eviction_max_memory_bytes`)
    pub(super) eviction: Option<Arc<EvictionCoordinator>>,

    /// "Ever cached" accelerator (disabled unless configured and available)
    pub(super) filter: Arc<dyn MembershipFilter>,

    pub(super) ttl_policy: TtlPolicy,
    pub(super) l1_ttl: Duration,

    pub(super) stats: CacheStats,

    /// Lifecycle state (broadcast to watchers)
    pub(super) state: watch::Sender<CacheState>,

    /// Flipped to true to stop background tasks
    pub(super) shutdown: watch::Sender<bool>,

    /// Background maintenance tasks
    pub(super) tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl TieredCache {
    /// Connect to the configured remote store and build the cache.
    ///
    /// Without `redis_url` an in-process store stands in for L2.
    #[tracing::instrument(skip(config), fields(has_redis = config.redis_url.is_some()))]
    pub async fn connect(config: CacheConfig) -> Result<Self, CacheError> {
        config.validate()?;
        let store: Arc<dyn RemoteStore> = match &config.redis_url {
            Some(url) => {
                let store = RedisStore::connect(url, config.redis_prefix.as_deref(), &config.pool_settings()).await?;
                info!(prefix = store.prefix(), "Connected to Redis");
                Arc::new(store)
            }
            None => {
                info!("No redis_url configured, using in-process L2");
                Arc::new(InMemoryStore::new())
            }
        };
        Self::with_store(config, store).await
    }

    /// Build the cache over an existing store.
    pub async fn with_store(config: CacheConfig, store: Arc<dyn RemoteStore>) -> Result<Self, CacheError> {
        config.validate()?;

        let versioner = Arc::new(KeyVersioner::new(config.initial_version));
        let l1 = LocalLruCache::new(config.l1_max_bytes, config.l1_default_ttl(), versioner.clone());
        let l2 = RemoteStoreClient::new(store.clone()).with_operation_timeout(config.operation_timeout());

        let eviction = config
            .eviction_max_memory_bytes
            .map(|max_memory| Arc::new(EvictionCoordinator::new(store.clone(), max_memory)));

        let filter: Arc<dyn MembershipFilter> = if config.bloom_filter {
            match RemoteBloomFilter::probe(store, config.bloom_filter_name.clone()).await {
                Some(bloom) => Arc::new(bloom),
                None => Arc::new(DisabledFilter),
            }
        } else {
            Arc::new(DisabledFilter)
        };

        let (state, _) = watch::channel(CacheState::Ready);
        let (shutdown, _) = watch::channel(false);

        info!(
            l1_max_bytes = config.l1_max_bytes,
            version = versioner.current(),
            remote_eviction = eviction.is_some(),
            filter = filter.name(),
            "Tiered cache ready"
        );

        Ok(Self {
            ttl_policy: config.ttl_policy(),
            l1_ttl: config.l1_ttl(),
            config,
            versioner,
            l1,
            l2,
            eviction,
            filter,
            stats: CacheStats::new(),
            state,
            shutdown,
            tasks: Mutex::new(Vec::new()),
        })
    }

    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> CacheState {
        *self.state.borrow()
    }

    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<CacheState> {
        self.state.subscribe()
    }

    /// Current cache generation.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.versioner.current()
    }

    /// Direct access to the L1 tier.
    #[must_use]
    pub fn local(&self) -> &LocalLruCache {
        &self.l1
    }

    /// Direct access to the L2 tier.
    #[must_use]
    pub fn remote(&self) -> &RemoteStoreClient {
        &self.l2
    }

    #[must_use]
    pub fn eviction(&self) -> Option<&Arc<EvictionCoordinator>> {
        self.eviction.as_ref()
    }

    #[must_use]
    pub fn filter(&self) -> &Arc<dyn MembershipFilter> {
        &self.filter
    }
}
