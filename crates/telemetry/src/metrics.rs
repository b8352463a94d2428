//! Internal metrics collection.
//!
//! Collects metrics in-memory; the scheduler logs a snapshot line
//! periodically and the health endpoint can expose the same snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A counter metric.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn reset(&self) -> u64 {
        self.0.swap(0, Ordering::Relaxed)
    }
}

/// A gauge metric (can go up or down).
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Histogram for latency tracking.
#[derive(Debug)]
pub struct Histogram {
    /// Buckets: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 5s, 10s
    buckets: [AtomicU64; 11],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    const BUCKET_BOUNDS: [u64; 11] = [1, 5, 10, 25, 50, 100, 250, 500, 1000, 5000, 10000];

    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Records a value in milliseconds.
    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        for (i, &bound) in Self::BUCKET_BOUNDS.iter().enumerate() {
            if ms <= bound {
                self.buckets[i].fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        // Value exceeds all buckets, add to last
        self.buckets[10].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum() as f64 / count as f64
        }
    }

    /// Returns bucket counts.
    pub fn buckets(&self) -> Vec<(u64, u64)> {
        Self::BUCKET_BOUNDS
            .iter()
            .zip(self.buckets.iter())
            .map(|(&bound, count)| (bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Collected metrics for the numwatch engine.
#[derive(Debug, Default)]
pub struct Metrics {
    // Ingestion metrics
    pub jobs_created: Counter,
    pub items_enqueued: Counter,
    pub numbers_invalid: Counter,
    pub numbers_deduplicated: Counter,

    // Checker metrics
    pub wa_stage1_checks: Counter,
    pub wa_stage2_checks: Counter,
    pub tg_checks: Counter,
    pub flood_waits: Counter,
    pub accounts_deactivated: Counter,

    // Cache metrics
    pub cache_hits: Counter,
    pub cache_misses: Counter,

    // Pipeline metrics
    pub messages_consumed: Counter,
    pub messages_acked: Counter,
    pub messages_reclaimed: Counter,
    pub items_processed: Counter,
    pub progress_events: Counter,
    pub stream_errors: Counter,
    pub store_errors: Counter,

    // Job lifecycle metrics
    pub jobs_completed: Counter,
    pub jobs_failed: Counter,
    pub exports_generated: Counter,

    // Latency histograms
    pub wa_check_latency_ms: Histogram,
    pub tg_check_latency_ms: Histogram,
    pub export_latency_ms: Histogram,

    // Gauges
    pub active_jobs: Gauge,
    pub tg_accounts_active: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub jobs_created: u64,
    pub items_enqueued: u64,
    pub wa_stage1_checks: u64,
    pub wa_stage2_checks: u64,
    pub tg_checks: u64,
    pub flood_waits: u64,
    pub accounts_deactivated: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub messages_consumed: u64,
    pub messages_acked: u64,
    pub items_processed: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub exports_generated: u64,
    pub wa_check_latency_mean_ms: f64,
    pub tg_check_latency_mean_ms: f64,
    pub active_jobs: u64,
    pub tg_accounts_active: u64,
}

impl Metrics {
    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            jobs_created: self.jobs_created.get(),
            items_enqueued: self.items_enqueued.get(),
            wa_stage1_checks: self.wa_stage1_checks.get(),
            wa_stage2_checks: self.wa_stage2_checks.get(),
            tg_checks: self.tg_checks.get(),
            flood_waits: self.flood_waits.get(),
            accounts_deactivated: self.accounts_deactivated.get(),
            cache_hits: self.cache_hits.get(),
            cache_misses: self.cache_misses.get(),
            messages_consumed: self.messages_consumed.get(),
            messages_acked: self.messages_acked.get(),
            items_processed: self.items_processed.get(),
            jobs_completed: self.jobs_completed.get(),
            jobs_failed: self.jobs_failed.get(),
            exports_generated: self.exports_generated.get(),
            wa_check_latency_mean_ms: self.wa_check_latency_ms.mean(),
            tg_check_latency_mean_ms: self.tg_check_latency_ms.mean(),
            active_jobs: self.active_jobs.get(),
            tg_accounts_active: self.tg_accounts_active.get(),
        }
    }
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
