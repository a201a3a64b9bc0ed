// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{FilterTrust, MembershipFilter};
use crate::metrics;
use crate::storage::RemoteStore;

const PROBE_ITEM: &str = "__tiered_cache_probe__";

/// Bloom filter living in the remote store (RedisBloom `BF.*`).
///
/// Starts trusted. The first failed insert demotes it for good, since an
/// item missing from the filter would otherwise be reported as absent.
pub struct RemoteBloomFilter {
    store: Arc<dyn RemoteStore>,
    filter: String,
    trusted: AtomicBool,
}

impl RemoteBloomFilter {
    /// Check that the store understands the filter commands.
    /// Returns `None` (and logs why) when it does not.
    pub async fn probe(store: Arc<dyn RemoteStore>, filter: impl Into<String>) -> Option<Self> {
        let filter = filter.into();
        match store.filter_exists(&filter, PROBE_ITEM).await {
            Ok(_) => {
                info!(filter = %filter, "Remote membership filter available");
                Some(Self {
                    store,
                    filter,
                    trusted: AtomicBool::new(true),
                })
            }
            Err(e) => {
                warn!(filter = %filter, error = %e, "Remote membership filter unavailable, continuing without it");
                None
            }
        }
    }

    pub fn mark_untrusted(&self) {
        if self.trusted.swap(false, Ordering::AcqRel) {
            warn!(filter = %self.filter, "Marking membership filter as untrusted");
        }
    }
}

#[async_trait]
impl MembershipFilter for RemoteBloomFilter {
    async fn might_contain(&self, item: &str) -> Option<bool> {
        if !self.trusted.load(Ordering::Acquire) {
            metrics::record_filter_check("untrusted");
            return None;
        }
        match self.store.filter_exists(&self.filter, item).await {
            Ok(found) => {
                metrics::record_filter_check(if found { "maybe" } else { "negative" });
                Some(found)
            }
            Err(e) => {
                debug!(error = %e, "Membership filter lookup failed");
                metrics::record_filter_check("error");
                None
            }
        }
    }

    async fn insert(&self, item: &str) -> bool {
        match self.store.filter_add(&self.filter, item).await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Membership filter insert failed");
                self.mark_untrusted();
                false
            }
        }
    }

    fn trust(&self) -> FilterTrust {
        if self.trusted.load(Ordering::Acquire) {
            FilterTrust::Trusted
        } else {
            FilterTrust::Untrusted
        }
    }

    fn name(&self) -> &'static str {
        "remote_bloom"
    }
}
