// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for tiered-cache.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The embedding process is responsible for choosing the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `tiered_cache_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//! - `_bytes` suffix for sizes
//!
//! # Labels
//! - `tier`: L1, L2
//! - `operation`: get, put, delete, invalidate, evict
//! - `status`: hit, miss, success, error
//!
//! Hit/miss counts are additionally kept in-process by [`CacheStats`] so
//! [`TieredCache::metrics_snapshot`](crate::TieredCache::metrics_snapshot)
//! works without any recorder installed.

use metrics::{counter, gauge, histogram};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Which tier served (or failed to serve) a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    L1,
    L2,
}

impl Tier {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::L1 => "L1",
            Tier::L2 => "L2",
        }
    }
}

/// In-process hit/miss counters, one pair per tier.
#[derive(Debug, Default)]
pub struct CacheStats {
    l1_hits: AtomicU64,
    l1_misses: AtomicU64,
    l2_hits: AtomicU64,
    l2_misses: AtomicU64,
}

impl CacheStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self, tier: Tier) {
        match tier {
            Tier::L1 => self.l1_hits.fetch_add(1, Ordering::Relaxed),
            Tier::L2 => self.l2_hits.fetch_add(1, Ordering::Relaxed),
        };
        record_operation(tier.as_str(), "get", "hit");
    }

    pub fn record_miss(&self, tier: Tier) {
        match tier {
            Tier::L1 => self.l1_misses.fetch_add(1, Ordering::Relaxed),
            Tier::L2 => self.l2_misses.fetch_add(1, Ordering::Relaxed),
        };
        record_operation(tier.as_str(), "get", "miss");
    }

    /// (l1_hits, l1_misses, l2_hits, l2_misses)
    #[must_use]
    pub fn counts(&self) -> (u64, u64, u64, u64) {
        (
            self.l1_hits.load(Ordering::Relaxed),
            self.l1_misses.load(Ordering::Relaxed),
            self.l2_hits.load(Ordering::Relaxed),
            self.l2_misses.load(Ordering::Relaxed),
        )
    }
}

/// Record a cache operation outcome
pub fn record_operation(tier: &str, operation: &str, status: &str) {
    counter!(
        "tiered_cache_operations_total",
        "tier" => tier.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record operation latency
pub fn record_latency(tier: &str, operation: &str, duration: Duration) {
    histogram!(
        "tiered_cache_operation_seconds",
        "tier" => tier.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Set current L1 size in estimated bytes
pub fn set_l1_cache_bytes(bytes: usize) {
    gauge!("tiered_cache_l1_bytes").set(bytes as f64);
}

/// Set current L1 entry count
pub fn set_l1_cache_items(count: usize) {
    gauge!("tiered_cache_l1_items").set(count as f64);
}

/// Record eviction event
pub fn record_eviction(tier: &str, count: usize, bytes: usize) {
    counter!("tiered_cache_evictions_total", "tier" => tier.to_string()).increment(count as u64);
    if bytes > 0 {
        counter!("tiered_cache_evicted_bytes_total", "tier" => tier.to_string()).increment(bytes as u64);
    }
}

/// Record entries dropped because their TTL passed
pub fn record_expired(tier: &str, count: usize) {
    counter!("tiered_cache_expired_total", "tier" => tier.to_string()).increment(count as u64);
}

/// Set remote memory pressure (used / ceiling)
pub fn set_remote_memory_pressure(pressure: f64) {
    gauge!("tiered_cache_l2_memory_pressure").set(pressure);
}

/// Set remote used memory as last observed
pub fn set_remote_used_bytes(bytes: u64) {
    gauge!("tiered_cache_l2_used_bytes").set(bytes as f64);
}

// ═══════════════════════════════════════════════════════════════════════════
// ERROR TRACKING - Categorized error counters for alerting
// ═══════════════════════════════════════════════════════════════════════════

/// Record an error with category for alerting
pub fn record_error(tier: &str, operation: &str, error_type: &str) {
    counter!(
        "tiered_cache_errors_total",
        "tier" => tier.to_string(),
        "operation" => operation.to_string(),
        "error_type" => error_type.to_string()
    )
    .increment(1);
}

/// Record a connection/backend error
pub fn record_connection_error(backend: &str) {
    counter!(
        "tiered_cache_connection_errors_total",
        "backend" => backend.to_string()
    )
    .increment(1);
}

/// Record a timeout error
pub fn record_timeout(tier: &str, operation: &str) {
    counter!(
        "tiered_cache_timeouts_total",
        "tier" => tier.to_string(),
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record a transparent retry of a remote command
pub fn record_retry(operation: &str) {
    counter!(
        "tiered_cache_retries_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// THROUGHPUT - Bytes moved per tier
// ═══════════════════════════════════════════════════════════════════════════

/// Record bytes written to a tier
pub fn record_bytes_written(tier: &str, bytes: usize) {
    counter!(
        "tiered_cache_bytes_written_total",
        "tier" => tier.to_string()
    )
    .increment(bytes as u64);
}

/// Record bytes read from a tier
pub fn record_bytes_read(tier: &str, bytes: usize) {
    counter!(
        "tiered_cache_bytes_read_total",
        "tier" => tier.to_string()
    )
    .increment(bytes as u64);
}

/// Record keys removed by a namespace invalidation
pub fn record_invalidation(tier: &str, count: usize) {
    counter!(
        "tiered_cache_invalidated_keys_total",
        "tier" => tier.to_string()
    )
    .increment(count as u64);
}

/// Set backend health status (1 = healthy, 0 = unhealthy)
pub fn set_backend_healthy(backend: &str, healthy: bool) {
    gauge!(
        "tiered_cache_backend_healthy",
        "backend" => backend.to_string()
    )
    .set(if healthy { 1.0 } else { 0.0 });
}

/// Record membership filter check
pub fn record_filter_check(result: &str) {
    counter!(
        "tiered_cache_filter_checks_total",
        "result" => result.to_string()
    )
    .increment(1);
}

/// A timing guard that records latency on drop
pub struct LatencyTimer {
    tier: &'static str,
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(tier: &'static str, operation: &'static str) -> Self {
        Self {
            tier,
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.tier, self.operation, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // These tests verify the API doesn't panic without a recorder installed.
    // The demo wires a metrics-util DebuggingRecorder for real output.

    #[test]
    fn test_cache_stats_counts_per_tier() {
        let stats = CacheStats::new();
        stats.record_hit(Tier::L1);
        stats.record_hit(Tier::L1);
        stats.record_miss(Tier::L1);
        stats.record_hit(Tier::L2);
        stats.record_miss(Tier::L2);
        stats.record_miss(Tier::L2);

        assert_eq!(stats.counts(), (2, 1, 1, 2));
    }

    #[test]
    fn test_tier_labels() {
        assert_eq!(Tier::L1.as_str(), "L1");
        assert_eq!(Tier::L2.as_str(), "L2");
    }

    #[test]
    fn test_record_functions() {
        record_operation("L1", "get", "hit");
        record_latency("L2", "put", Duration::from_millis(5));
        set_l1_cache_bytes(1024);
        set_l1_cache_items(3);
        record_eviction("L1", 2, 512);
        record_eviction("L2", 10, 0);
        record_expired("L1", 1);
        set_remote_memory_pressure(0.8);
        set_remote_used_bytes(1 << 20);
        record_error("L2", "get", "timeout");
        record_connection_error("redis");
        record_timeout("L2", "set");
        record_retry("redis_get");
        record_bytes_written("L2", 100);
        record_bytes_read("L2", 100);
        record_invalidation("L2", 4);
        set_backend_healthy("redis", true);
        record_filter_check("negative");
    }

    #[test]
    fn test_latency_timer() {
        {
            let _timer = LatencyTimer::new("L1", "get");
            std::thread::sleep(Duration::from_micros(10));
        }
        // Timer recorded on drop
    }
}
