//! In-memory metrics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

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

    /// Saturates at zero.
    pub fn dec(&self) {
        let _ = self
            .0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
    }
}

/// Latency histogram in milliseconds.
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

        let idx = Self::BUCKET_BOUNDS
            .iter()
            .position(|&bound| ms <= bound)
            .unwrap_or(Self::BUCKET_BOUNDS.len() - 1);
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
    }

    /// Records the time elapsed since `start`.
    pub fn observe_since(&self, start: Instant) {
        self.observe(start.elapsed().as_millis() as u64);
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

    /// Returns (upper bound, count) per bucket.
    pub fn buckets(&self) -> Vec<(u64, u64)> {
        Self::BUCKET_BOUNDS
            .iter()
            .zip(self.buckets.iter())
            .map(|(&bound, count)| (bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Collected metrics for the batcher.
#[derive(Debug, Default)]
pub struct Metrics {
    // Ingestion
    pub records_received: Counter,
    pub records_rejected: Counter,
    pub records_buffered: Counter,
    pub records_immediate: Counter,

    // Flushing
    pub flushes_triggered: Counter,
    pub flushes_skipped: Counter,
    pub batches_pushed: Counter,
    pub records_pushed: Counter,
    pub batches_lost: Counter,
    pub records_lost: Counter,
    pub lifecycle_errors: Counter,

    // Storage
    pub storage_errors: Counter,

    // Queue consumer
    pub queue_messages_consumed: Counter,
    pub queue_messages_malformed: Counter,
    pub queue_errors: Counter,

    // Latency histograms
    pub sink_push_latency_ms: Histogram,
    pub storage_latency_ms: Histogram,

    // Gauges
    pub in_flight_flushes: Gauge,
    pub queue_lag: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub records_received: u64,
    pub records_rejected: u64,
    pub records_buffered: u64,
    pub records_immediate: u64,
    pub flushes_triggered: u64,
    pub flushes_skipped: u64,
    pub batches_pushed: u64,
    pub records_pushed: u64,
    pub batches_lost: u64,
    pub records_lost: u64,
    pub lifecycle_errors: u64,
    pub storage_errors: u64,
    pub queue_messages_consumed: u64,
    pub queue_messages_malformed: u64,
    pub queue_errors: u64,
    pub sink_push_latency_mean_ms: f64,
    pub storage_latency_mean_ms: f64,
    pub in_flight_flushes: u64,
    pub queue_lag: u64,
}

impl Metrics {
    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            records_received: self.records_received.get(),
            records_rejected: self.records_rejected.get(),
            records_buffered: self.records_buffered.get(),
            records_immediate: self.records_immediate.get(),
            flushes_triggered: self.flushes_triggered.get(),
            flushes_skipped: self.flushes_skipped.get(),
            batches_pushed: self.batches_pushed.get(),
            records_pushed: self.records_pushed.get(),
            batches_lost: self.batches_lost.get(),
            records_lost: self.records_lost.get(),
            lifecycle_errors: self.lifecycle_errors.get(),
            storage_errors: self.storage_errors.get(),
            queue_messages_consumed: self.queue_messages_consumed.get(),
            queue_messages_malformed: self.queue_messages_malformed.get(),
            queue_errors: self.queue_errors.get(),
            sink_push_latency_mean_ms: self.sink_push_latency_ms.mean(),
            storage_latency_mean_ms: self.storage_latency_ms.mean(),
            in_flight_flushes: self.in_flight_flushes.get(),
            queue_lag: self.queue_lag.get(),
        }
    }
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
