// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::time::Instant;

/// Last observed remote memory usage, kept to avoid a round-trip per check.
#[derive(Debug, Clone)]
pub struct RemoteMemoryProfile {
    /// Used memory in bytes (from INFO memory)
    pub used_bytes: u64,
    /// Eviction ceiling in bytes
    pub max_bytes: u64,
    /// When we last refreshed from the store
    pub last_updated: Instant,
    /// Estimated bytes written since last refresh
    pub pending_writes_estimate: u64,
}

impl RemoteMemoryProfile {
    #[must_use]
    pub fn new(max_bytes: u64) -> Self {
        Self {
            used_bytes: 0,
            max_bytes,
            last_updated: Instant::now(),
            pending_writes_estimate: 0,
        }
    }

    /// Current memory pressure (0.0 to 1.0+)
    #[must_use]
    pub fn pressure(&self) -> f64 {
        if self.max_bytes == 0 {
            return 0.0;
        }
        (self.used_bytes + self.pending_writes_estimate) as f64 / self.max_bytes as f64
    }

    pub fn add_pending_writes(&mut self, bytes: u64) {
        self.pending_writes_estimate = self.pending_writes_estimate.saturating_add(bytes);
    }

    pub fn refresh(&mut self, used_bytes: u64) {
        self.used_bytes = used_bytes;
        self.pending_writes_estimate = 0;
        self.last_updated = Instant::now();
    }
}
