// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Optional "was this ever cached" accelerator for L2 lookups.
//!
//! A trusted filter answering "definitely not" lets a lookup skip the
//! remote round-trip entirely. Anything else ("maybe", or a filter that
//! is disabled or untrusted) means the remote store must be asked.

mod bloom;

pub use bloom::RemoteBloomFilter;

use async_trait::async_trait;

/// Trust state of a membership filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterTrust {
    /// A missed insert means "definitely not" can no longer be believed
    Untrusted,
    /// Every insert has landed - trust "definitely not" responses
    Trusted,
}

#[async_trait]
pub trait MembershipFilter: Send + Sync {
    /// `Some(false)` → never inserted. `Some(true)` → maybe inserted.
    /// `None` → no usable answer; the caller must check the store.
    async fn might_contain(&self, item: &str) -> Option<bool>;

    /// Record `item`. Returns false if the filter could not be updated.
    async fn insert(&self, item: &str) -> bool;

    fn trust(&self) -> FilterTrust;

    /// Short label for logs.
    fn name(&self) -> &'static str;

    /// Whether a lookup for `item` has to reach the remote store.
    async fn should_check_remote(&self, item: &str) -> bool {
        self.might_contain(item).await != Some(false)
    }
}

/// Filter used when the accelerator is off or unavailable. Never answers.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledFilter;

#[async_trait]
impl MembershipFilter for DisabledFilter {
    async fn might_contain(&self, _item: &str) -> Option<bool> {
        None
    }

    async fn insert(&self, _item: &str) -> bool {
        true
    }

    fn trust(&self) -> FilterTrust {
        FilterTrust::Untrusted
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_filter_always_defers() {
        let filter = DisabledFilter;
        assert!(filter.insert("k").await);
        assert_eq!(filter.might_contain("k").await, None);
        assert!(filter.should_check_remote("k").await);
        assert!(filter.should_check_remote("other").await);
        assert_eq!(filter.trust(), FilterTrust::Untrusted);
    }
}
