// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic tiered-cache usage example.
//!
//! Demonstrates:
//! 1. Connecting to Redis (L2), or the in-process store when none is given
//! 2. Caching a handful of JSON analysis results
//! 3. Reading them back through L1 and, after a local flush, through L2
//! 4. Invalidating a namespace and bumping the cache generation
//! 5. Displaying metrics
//! 6. Clean shutdown
//!
//! # Run
//!
//! ```bash
//! # In-process L2
//! cargo run --example basic_usage
//!
//! # Against Redis
//! docker run --rm -p 6379:6379 redis:7-alpine
//! REDIS_URL=redis://localhost:6379 cargo run --example basic_usage
//! ```

use std::sync::Arc;
use std::time::Instant;

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use serde_json::json;
use tiered_cache::{CacheConfig, CacheKey, TieredCache};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install metrics recorder (captures everything the cache emits)
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║            tiered-cache: Basic Usage Example                  ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Configure and connect
    // ─────────────────────────────────────────────────────────────────────────
    let redis_url = std::env::var("REDIS_URL").ok();
    println!("📦 Configuring tiered-cache (L2: {})...", redis_url.as_deref().unwrap_or("in-process"));

    let config = CacheConfig {
        redis_url,
        // Namespace prefix for Redis keys (plays nice with other data)
        redis_prefix: Some("demo:".into()),
        // L1 memory limit (16MB for demo)
        l1_max_bytes: 16 * 1024 * 1024,
        // Remote eviction above 256MB of Redis memory
        eviction_max_memory_bytes: Some(256 * 1024 * 1024),
        ..Default::default()
    };

    let cache = Arc::new(TieredCache::connect(config).await?);
    cache.start_maintenance();
    println!("   ✅ Cache ready! State: {}, version: {}", cache.state(), cache.version());

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Cache some results (with timing)
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📝 Caching 5 analysis results...");

    let entries = vec![
        ("project-1", "src/main.rs", json!({"status": "COMPLETED", "score": 9.1})),
        ("project-1", "src/lib.rs", json!({"status": "COMPLETED", "score": 8.4})),
        ("project-1", "README.md", json!({"status": "SKIPPED"})),
        ("project-2", "app.py", json!({"status": "COMPLETED", "score": 7.0})),
        ("project-2", "setup.py", json!({"status": "FAILED", "error": "timeout"})),
    ];

    let mut keys = Vec::new();
    for (namespace, path, result) in &entries {
        let key = CacheKey::namespaced(*namespace, *path)?;
        let start = Instant::now();
        let outcome = cache.put(&key, serde_json::to_vec(result)?, None).await;
        println!("   └─ {} → L1={} L2={} ({:?})", key, outcome.l1, outcome.l2, start.elapsed());
        keys.push(key);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Read back: L1, then L2 after dropping the local copies
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📖 Reading back from L1...");
    for key in &keys {
        let start = Instant::now();
        let found = cache.get(key).await;
        println!("   └─ {} → {} ({:?})", key, render(found.as_deref()), start.elapsed());
    }

    println!("\n📖 Flushing L1 and reading through L2...");
    cache.local().clear();
    for key in &keys {
        let start = Instant::now();
        let found = cache.get(key).await;
        println!("   └─ {} → {} ({:?})", key, render(found.as_deref()), start.elapsed());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Invalidation and versioning
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🧹 Invalidating namespace 'project-1'...");
    let removed = cache.invalidate_namespace("project-1").await?;
    println!("   └─ Removed {} remote keys", removed.len());
    println!("   └─ {} still cached: {}", keys[3], cache.exists(&keys[3]).await);

    println!("\n🔁 Bumping cache generation...");
    let version = cache.bump_version();
    println!("   └─ Now at v{}; {} cached: {}", version, keys[3], cache.get(&keys[3]).await.is_some());

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Metrics
    // ─────────────────────────────────────────────────────────────────────────
    let snapshot = cache.metrics_snapshot();
    println!("\n📊 Cache Metrics:");
    println!("   ┌─ L1: {} hits / {} misses", snapshot.l1_hits, snapshot.l1_misses);
    println!("   ├─ L2: {} hits / {} misses", snapshot.l2_hits, snapshot.l2_misses);
    println!("   ├─ L1 size: {} entries, {} bytes", snapshot.l1_entries, snapshot.memory_usage_bytes);
    println!("   └─ Hit ratio: {:.1}%", snapshot.hit_ratio() * 100.0);

    let topology = cache.cluster_topology().await;
    println!("\n🗺️  Topology: {} node(s), {} slots each", topology.node_count, topology.slots_per_node);

    if let Some(report) = cache.evict_remote().await {
        println!("\n🧮 Remote eviction: {} bytes used, {} keys evicted", report.used_bytes, report.evicted.len());
    }

    println!("\n📈 Raw Metrics:");
    dump_metrics(&snapshotter);

    // ─────────────────────────────────────────────────────────────────────────
    // 6. Clean shutdown
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🛑 Shutting down...");
    cache.shutdown().await;
    println!("   ✅ Shutdown complete! State: {}", cache.state());

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║                    Example complete!                          ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    Ok(())
}

fn render(bytes: Option<&[u8]>) -> String {
    match bytes {
        Some(b) => String::from_utf8_lossy(b).into_owned(),
        None => "NOT FOUND".into(),
    }
}

/// Dump all captured metrics, grouped by kind
fn dump_metrics(snapshotter: &Snapshotter) {
    let snapshot = snapshotter.snapshot();

    let mut counters: Vec<_> = vec![];
    let mut gauges: Vec<_> = vec![];
    let mut histograms: Vec<_> = vec![];

    for (composite_key, _, _, value) in snapshot.into_vec() {
        let (_, key) = composite_key.into_parts();
        let name = key.name().to_string();
        let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
        let label_str = if labels.is_empty() { String::new() } else { format!("{{{}}}", labels.join(",")) };

        match value {
            DebugValue::Counter(v) => counters.push((name, label_str, v)),
            DebugValue::Gauge(v) => gauges.push((name, label_str, v.into_inner())),
            DebugValue::Histogram(samples) => {
                let count = samples.len();
                let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                let avg = if count > 0 { sum / count as f64 } else { 0.0 };
                histograms.push((name, label_str, count, avg));
            }
        }
    }

    counters.sort_by(|a, b| a.0.cmp(&b.0));
    gauges.sort_by(|a, b| a.0.cmp(&b.0));
    histograms.sort_by(|a, b| a.0.cmp(&b.0));

    if !counters.is_empty() {
        println!("   ┌─ Counters (cumulative)");
        for (name, labels, value) in &counters {
            println!("   │  └─ {}{} = {}", name, labels, value);
        }
    }
    if !gauges.is_empty() {
        println!("   ├─ Gauges (current value)");
        for (name, labels, value) in &gauges {
            println!("   │  └─ {}{} = {:.2}", name, labels, value);
        }
    }
    if !histograms.is_empty() {
        println!("   └─ Histograms (distributions)");
        for (name, labels, count, avg) in &histograms {
            println!("   │  └─ {}{} count={} avg={:.6}s", name, labels, count, avg);
        }
    }
    if counters.is_empty() && gauges.is_empty() && histograms.is_empty() {
        println!("   └─ (no metrics recorded)");
    }
}
