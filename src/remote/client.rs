// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error-absorbing front for a [`RemoteStore`].
//!
//! The cache treats L2 as best effort: every failure is logged, counted
//! and turned into the "nothing there" answer for that call. Nothing in
//! here returns an error.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, warn};

use super::topology::ClusterTopology;
use crate::metrics::{self, LatencyTimer};
use crate::storage::{RemoteStore, StoreError};

const TIER: &str = "L2";

#[derive(Clone)]
pub struct RemoteStoreClient {
    store: Arc<dyn RemoteStore>,
    operation_timeout: Option<Duration>,
}

impl RemoteStoreClient {
    #[must_use]
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            operation_timeout: None,
        }
    }

    /// Cap every call at `limit`, on top of the store's own socket timeout.
    #[must_use]
    pub fn with_operation_timeout(mut self, limit: Option<Duration>) -> Self {
        self.operation_timeout = limit;
        self
    }

    /// The wrapped store, for components that handle errors themselves.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    async fn guarded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        let _timer = LatencyTimer::new(TIER, operation);
        let result = match self.operation_timeout {
            Some(limit) => timeout(limit, call).await.unwrap_or(Err(StoreError::Timeout)),
            None => call.await,
        };

        if let Err(e) = &result {
            warn!(operation, error = %e, "Remote cache operation failed");
            metrics::record_error(TIER, operation, e.kind());
            match e {
                StoreError::Timeout => metrics::record_timeout(TIER, operation),
                StoreError::Connection(_) => metrics::record_connection_error("remote"),
                _ => {}
            }
        }
        result
    }

    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let value = self.guarded("get", self.store.get(key)).await.ok().flatten();
        if let Some(bytes) = &value {
            metrics::record_bytes_read(TIER, bytes.len());
        }
        value
    }

    /// Returns whether the write was acknowledged.
    pub async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> bool {
        let ok = self.guarded("set", self.store.set(key, value, ttl)).await.is_ok();
        if ok {
            metrics::record_bytes_written(TIER, value.len());
        }
        ok
    }

    /// True only if the key existed and was removed.
    pub async fn delete(&self, key: &str) -> bool {
        self.guarded("delete", self.store.delete(key)).await.unwrap_or(false)
    }

    pub async fn exists(&self, key: &str) -> bool {
        self.guarded("exists", self.store.exists(key)).await.unwrap_or(false)
    }

    /// Incremental scan; empty on failure.
    pub async fn keys_matching(&self, pattern: &str) -> Vec<String> {
        self.guarded("scan", self.store.scan_match(pattern)).await.unwrap_or_default()
    }

    pub async fn delete_many(&self, keys: &[String]) -> usize {
        if keys.is_empty() {
            return 0;
        }
        self.guarded("delete_many", self.store.delete_many(keys)).await.unwrap_or(0)
    }

    /// Slot layout, or [`ClusterTopology::STANDALONE`] when introspection fails.
    pub async fn cluster_topology(&self) -> ClusterTopology {
        match self.guarded("cluster_info", self.store.cluster_mode()).await {
            Ok(mode) => ClusterTopology::from_mode(mode),
            Err(_) => ClusterTopology::STANDALONE,
        }
    }

    pub async fn ping(&self) -> bool {
        let healthy = self.guarded("ping", self.store.ping()).await.is_ok();
        metrics::set_backend_healthy("remote", healthy);
        healthy
    }

    /// Release the store's connections. Errors are logged, never raised.
    pub async fn close(&self) {
        match self.store.close().await {
            Ok(()) => debug!("Remote store closed"),
            Err(e) => warn!(error = %e, "Error closing remote store"),
        }
    }
}
