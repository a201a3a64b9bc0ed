// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public types for the tiered cache facade.

use serde::Serialize;

/// Cache lifecycle state.
///
/// Use [`super::TieredCache::state()`] to check the current state or
/// [`super::TieredCache::state_receiver()`] to watch for changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// Constructed and serving, no background tasks
    Ready,
    /// Background maintenance running
    Running,
    /// Graceful shutdown in progress
    ShuttingDown,
    /// Remote connections released
    Closed,
}

impl std::fmt::Display for CacheState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready => write!(f, "Ready"),
            Self::Running => write!(f, "Running"),
            Self::ShuttingDown => write!(f, "ShuttingDown"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

/// Which tiers accepted a write.
///
/// The two writes are independent; neither is rolled back if the other fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PutOutcome {
    pub l1: bool,
    pub l2: bool,
}

impl PutOutcome {
    /// Stored in at least one tier.
    #[must_use]
    pub fn any(&self) -> bool {
        self.l1 || self.l2
    }

    #[must_use]
    pub fn both(&self) -> bool {
        self.l1 && self.l2
    }
}

/// Point-in-time hit/miss counters and L1 size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MetricsSnapshot {
    pub l1_hits: u64,
    pub l1_misses: u64,
    pub l2_hits: u64,
    pub l2_misses: u64,
    /// Estimated L1 bytes
    pub memory_usage_bytes: usize,
    pub l1_entries: usize,
    pub version: u64,
}

impl MetricsSnapshot {
    /// Share of lookups answered by either tier (0.0 - 1.0).
    #[must_use]
    pub fn hit_ratio(&self) -> f64 {
        let lookups = self.l1_hits + self.l1_misses;
        if lookups == 0 {
            return 0.0;
        }
        (self.l1_hits + self.l2_hits) as f64 / lookups as f64
    }
}
