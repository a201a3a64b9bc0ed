// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Size-based default TTLs.
//!
//! Small payloads are cheap to keep and get the long lifetime; payloads at
//! or above the threshold get the short one so they cycle out of the
//! remote tier sooner. An explicit TTL from the caller always wins.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use tiered_cache::TtlPolicy;
//!
//! let policy = TtlPolicy::default();
//! assert_eq!(policy.ttl_for(10_000), Duration::from_secs(3600));
//! assert_eq!(policy.ttl_for(2_000_000), Duration::from_secs(600));
//!
//! // Caller's TTL wins
//! assert_eq!(policy.resolve(Some(Duration::from_secs(5)), 2_000_000), Duration::from_secs(5));
//! ```

use std::time::Duration;

/// Two-tier TTL chosen by payload size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    /// TTL for payloads below `large_threshold_bytes`
    pub small_ttl: Duration,
    /// TTL for payloads at or above `large_threshold_bytes`
    pub large_ttl: Duration,
    pub large_threshold_bytes: usize,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            small_ttl: Duration::from_secs(60 * 60),
            large_ttl: Duration::from_secs(10 * 60),
            large_threshold_bytes: 1_000_000,
        }
    }
}

impl TtlPolicy {
    #[must_use]
    pub fn new(small_ttl: Duration, large_ttl: Duration, large_threshold_bytes: usize) -> Self {
        Self {
            small_ttl,
            large_ttl,
            large_threshold_bytes,
        }
    }

    /// Default TTL for a payload of `size_bytes`.
    #[must_use]
    pub fn ttl_for(&self, size_bytes: usize) -> Duration {
        if size_bytes < self.large_threshold_bytes {
            self.small_ttl
        } else {
            self.large_ttl
        }
    }

    /// `explicit` if given, otherwise the size-based default.
    #[must_use]
    pub fn resolve(&self, explicit: Option<Duration>, size_bytes: usize) -> Duration {
        explicit.unwrap_or_else(|| self.ttl_for(size_bytes))
    }
}
