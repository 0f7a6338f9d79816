//! In-process metrics rendered in the Prometheus text format
//!
//! Each server owns one [`MetricsRegistry`]; the request-tracing middleware
//! feeds the latency histogram and the coordinator bumps the metadata counters.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Histogram bucket boundaries for latency measurements (in milliseconds)
const LATENCY_BUCKETS: [f64; 11] = [
    1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0,
];

/// A simple histogram implementation for latency tracking
#[derive(Debug)]
pub struct Histogram {
    buckets: Vec<AtomicU64>,
    boundaries: Vec<f64>,
    sum_micros: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    pub fn new() -> Self {
        let mut buckets = Vec::with_capacity(LATENCY_BUCKETS.len() + 1);
        for _ in 0..=LATENCY_BUCKETS.len() {
            buckets.push(AtomicU64::new(0));
        }
        Self {
            buckets,
            boundaries: LATENCY_BUCKETS.to_vec(),
            sum_micros: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Record a value (milliseconds)
    pub fn observe(&self, value: f64) {
        let bucket_idx = self
            .boundaries
            .iter()
            .position(|&boundary| value <= boundary)
            .unwrap_or(self.boundaries.len());

        self.buckets[bucket_idx].fetch_add(1, Ordering::Relaxed);
        self.sum_micros
            .fetch_add((value * 1000.0) as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Cumulative bucket counts, ending with the +Inf bucket
    pub fn get_buckets(&self) -> Vec<(f64, u64)> {
        let mut cumulative = 0u64;
        let mut result = Vec::with_capacity(self.boundaries.len() + 1);

        for (i, &boundary) in self.boundaries.iter().enumerate() {
            cumulative += self.buckets[i].load(Ordering::Relaxed);
            result.push((boundary, cumulative));
        }

        cumulative += self.buckets[self.boundaries.len()].load(Ordering::Relaxed);
        result.push((f64::INFINITY, cumulative));

        result
    }

    pub fn sum(&self) -> f64 {
        self.sum_micros.load(Ordering::Relaxed) as f64 / 1000.0
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

/// Counter for tracking event counts
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Metrics registry owned by a running server
#[derive(Debug)]
pub struct MetricsRegistry {
    pub total_requests: Counter,
    pub total_errors: Counter,
    pub request_latency: Histogram,

    pub metadata_gets: Counter,
    pub metadata_puts: Counter,
    pub metadata_deletes: Counter,
    pub sweeps: Counter,
    pub expired_records: Counter,
    /// Placement adjustments that would have driven a node below zero
    pub accounting_anomalies: Counter,

    start_time: Instant,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            total_requests: Counter::new(),
            total_errors: Counter::new(),
            request_latency: Histogram::new(),
            metadata_gets: Counter::new(),
            metadata_puts: Counter::new(),
            metadata_deletes: Counter::new(),
            sweeps: Counter::new(),
            expired_records: Counter::new(),
            accounting_anomalies: Counter::new(),
            start_time: Instant::now(),
        }
    }

    /// Record a served request
    pub fn record_request(&self, duration: Duration, success: bool) {
        self.total_requests.inc();
        self.request_latency
            .observe(duration.as_secs_f64() * 1000.0);
        if !success {
            self.total_errors.inc();
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-compatible metrics output
    pub fn to_prometheus(&self) -> String {
        let mut out = String::new();

        let counters = [
            ("placekv_requests_total", "Total number of requests", &self.total_requests),
            ("placekv_errors_total", "Total number of failed requests", &self.total_errors),
            ("placekv_metadata_gets_total", "Metadata lookups", &self.metadata_gets),
            ("placekv_metadata_puts_total", "Metadata commits", &self.metadata_puts),
            ("placekv_metadata_deletes_total", "Metadata deletions", &self.metadata_deletes),
            ("placekv_sweeps_total", "Expiration sweeps run", &self.sweeps),
            ("placekv_expired_records_total", "Records evicted by sweeps", &self.expired_records),
            (
                "placekv_accounting_anomalies_total",
                "Placement adjustments clamped at zero",
                &self.accounting_anomalies,
            ),
        ];
        for (name, help, counter) in counters {
            let _ = writeln!(out, "# HELP {} {}", name, help);
            let _ = writeln!(out, "# TYPE {} counter", name);
            let _ = writeln!(out, "{} {}", name, counter.get());
        }

        out.push_str("# HELP placekv_uptime_seconds Server uptime in seconds\n");
        out.push_str("# TYPE placekv_uptime_seconds gauge\n");
        let _ = writeln!(out, "placekv_uptime_seconds {}", self.uptime_seconds());

        out.push_str("# HELP placekv_request_duration_ms Request duration in milliseconds\n");
        out.push_str("# TYPE placekv_request_duration_ms histogram\n");
        for (le, count) in self.request_latency.get_buckets() {
            if le.is_infinite() {
                let _ = writeln!(
                    out,
                    "placekv_request_duration_ms_bucket{{le=\"+Inf\"}} {}",
                    count
                );
            } else {
                let _ = writeln!(
                    out,
                    "placekv_request_duration_ms_bucket{{le=\"{}\"}} {}",
                    le, count
                );
            }
        }
        let _ = writeln!(
            out,
            "placekv_request_duration_ms_sum {}",
            self.request_latency.sum()
        );
        let _ = writeln!(
            out,
            "placekv_request_duration_ms_count {}",
            self.request_latency.count()
        );

        out
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_histogram() {
        let hist = Histogram::new();

        hist.observe(5.0);
        hist.observe(50.0);
        hist.observe(50_000.0);

        assert_eq!(hist.count(), 3);
        let buckets = hist.get_buckets();
        assert_eq!(buckets.last().unwrap().1, 3);
        // 5ms lands in the le=5 bucket
        assert_eq!(buckets[1], (5.0, 1));
    }

    #[test]
    fn test_registry_render() {
        let registry = MetricsRegistry::new();
        registry.record_request(Duration::from_millis(3), true);
        registry.record_request(Duration::from_millis(30), false);
        registry.accounting_anomalies.inc();

        assert_eq!(registry.total_requests.get(), 2);
        assert_eq!(registry.total_errors.get(), 1);

        let text = registry.to_prometheus();
        assert!(text.contains("placekv_requests_total 2"));
        assert!(text.contains("placekv_accounting_anomalies_total 1"));
        assert!(text.contains("placekv_request_duration_ms_count 2"));
    }
}
