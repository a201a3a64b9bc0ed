// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cache lifecycle: background maintenance and shutdown.

use std::sync::{Arc, Weak};

use tracing::{debug, info, warn};

use super::{CacheState, TieredCache};

impl TieredCache {
    /// Spawn background maintenance: a periodic L1 expiry sweep and, when
    /// configured, the remote eviction loop. Calling it twice is a no-op.
    ///
    /// The L1 sweep holds only a weak reference, so dropping the last
    /// `Arc<TieredCache>` also ends it.
    #[tracing::instrument(skip(self))]
    pub fn start_maintenance(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock();
        if self.state() != CacheState::Ready {
            debug!(state = %self.state(), "Maintenance already started or cache closing");
            return;
        }

        let weak: Weak<Self> = Arc::downgrade(self);
        let mut shutdown = self.shutdown.subscribe();
        let sweep_interval = self.config.expiry_sweep_interval();
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(cache) = weak.upgrade() else { break };
                        let purged = cache.purge_expired();
                        if purged > 0 {
                            debug!(purged, "L1 expiry sweep");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        }));

        if let Some(eviction) = &self.eviction {
            tasks.push(
                eviction
                    .clone()
                    .spawn(self.config.eviction_interval(), self.shutdown.subscribe()),
            );
        }

        self.state.send_replace(CacheState::Running);
        info!(
            tasks = tasks.len(),
            expiry_sweep_secs = self.config.expiry_sweep_interval_secs,
            "Cache maintenance started"
        );
    }

    /// Stop background tasks and release remote connections.
    ///
    /// Later L2 calls fail quietly (misses, `false`), while L1 keeps serving.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&self) {
        if self.state() == CacheState::Closed {
            return;
        }
        info!("Initiating tiered cache shutdown...");
        self.state.send_replace(CacheState::ShuttingDown);
        self.shutdown.send_replace(true);

        let tasks: Vec<_> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Maintenance task ended abnormally");
            }
        }

        self.l2.close().await;
        self.state.send_replace(CacheState::Closed);

        let snapshot = self.metrics_snapshot();
        info!(
            l1_hits = snapshot.l1_hits,
            l2_hits = snapshot.l2_hits,
            memory_usage_bytes = snapshot.memory_usage_bytes,
            "Tiered cache shutdown complete"
        );
    }
}
