//! Core loop timing histograms.
//! Each named metric keeps its most recent samples (microseconds) in a fixed
//! ring; summaries report p50/p95/p99 and the max.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Measures from creation until `finish`, then records into the registry.
pub struct TimingSpan {
    name: &'static str,
    start: Instant,
    registry: Arc<MetricsRegistry>,
}

impl TimingSpan {
    /// Record the elapsed time in microseconds and return it.
    pub fn finish(self) -> f64 {
        let elapsed_us = self.start.elapsed().as_micros() as f64;
        self.registry.record(self.name, elapsed_us);
        elapsed_us
    }
}

/// Fixed-capacity latency ring. Oldest samples are overwritten.
struct LatencyRing {
    samples: Box<[f64]>,
    next: usize,
    len: usize,
}

impl LatencyRing {
    fn new(capacity: usize) -> Self {
        Self {
            samples: vec![0.0; capacity].into_boxed_slice(),
            next: 0,
            len: 0,
        }
    }

    fn push(&mut self, value_us: f64) {
        let capacity = self.samples.len();
        self.samples[self.next] = value_us;
        self.next = (self.next + 1) % capacity;
        self.len = (self.len + 1).min(capacity);
    }

    fn sorted(&self) -> Vec<f64> {
        let mut sorted = self.samples[..self.len].to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        sorted
    }

    fn percentile_of(sorted: &[f64], p: f64) -> f64 {
        if sorted.is_empty() {
            return 0.0;
        }
        let idx = ((p / 100.0) * (sorted.len() as f64 - 1.0)).round() as usize;
        sorted[idx.min(sorted.len() - 1)]
    }
}

/// Named latency histograms shared between the worker and control threads.
pub struct MetricsRegistry {
    rings: Mutex<HashMap<&'static str, LatencyRing>>,
    ring_capacity: usize,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(ring_capacity: usize) -> Self {
        Self {
            rings: Mutex::new(HashMap::new()),
            ring_capacity: ring_capacity.max(1),
        }
    }

    /// Record a sample (in microseconds) for the named metric.
    pub fn record(&self, name: &'static str, value_us: f64) {
        self.rings
            .lock()
            .entry(name)
            .or_insert_with(|| LatencyRing::new(self.ring_capacity))
            .push(value_us);
        tracing::trace!(metric = name, value_us, "metric_recorded");
    }

    pub fn record_duration(&self, name: &'static str, elapsed: Duration) {
        self.record(name, elapsed.as_micros() as f64);
    }

    /// Start a timing span that records on finish.
    pub fn span(self: &Arc<Self>, name: &'static str) -> TimingSpan {
        TimingSpan {
            name,
            start: Instant::now(),
            registry: Arc::clone(self),
        }
    }

    /// Percentile (0-100) of a metric in microseconds; 0 when nothing was recorded.
    pub fn percentile(&self, name: &str, p: f64) -> f64 {
        let rings = self.rings.lock();
        rings
            .get(name)
            .map(|ring| LatencyRing::percentile_of(&ring.sorted(), p))
            .unwrap_or(0.0)
    }

    pub fn summary(&self) -> HashMap<String, MetricSummary> {
        let rings = self.rings.lock();
        rings
            .iter()
            .map(|(&name, ring)| {
                let sorted = ring.sorted();
                let summary = MetricSummary {
                    p50_us: LatencyRing::percentile_of(&sorted, 50.0),
                    p95_us: LatencyRing::percentile_of(&sorted, 95.0),
                    p99_us: LatencyRing::percentile_of(&sorted, 99.0),
                    max_us: sorted.last().copied().unwrap_or(0.0),
                    count: ring.len,
                };
                (name.to_string(), summary)
            })
            .collect()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricSummary {
    pub p50_us: f64,
    pub p95_us: f64,
    pub p99_us: f64,
    pub max_us: f64,
    pub count: usize,
}

/// Well-known metric names (constants to avoid typos).
pub mod metric_names {
    pub const BUFFER_PROCESSED: &str = "t_buffer_processed";
    pub const SINK_WRITE: &str = "t_sink_write";
    pub const WINDOW_FILL_TO_WRITE: &str = "t_window_fill_to_write";
    pub const QUIESCE_WAIT: &str = "t_quiesce_wait";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentiles() {
        let registry = MetricsRegistry::new();
        for v in 1..=100 {
            registry.record(metric_names::SINK_WRITE, v as f64);
        }
        assert_eq!(registry.percentile(metric_names::SINK_WRITE, 50.0), 51.0);
        assert_eq!(registry.percentile(metric_names::SINK_WRITE, 99.0), 99.0);
        assert_eq!(registry.percentile("unknown", 50.0), 0.0);

        let summary = registry.summary();
        assert_eq!(summary[metric_names::SINK_WRITE].count, 100);
        assert_eq!(summary[metric_names::SINK_WRITE].max_us, 100.0);
    }

    #[test]
    fn test_ring_keeps_latest_samples() {
        let registry = MetricsRegistry::with_capacity(4);
        for v in [100.0, 1.0, 2.0, 3.0, 4.0] {
            registry.record(metric_names::QUIESCE_WAIT, v);
        }
        let summary = registry.summary();
        assert_eq!(summary[metric_names::QUIESCE_WAIT].count, 4);
        assert_eq!(summary[metric_names::QUIESCE_WAIT].max_us, 4.0);
    }

    #[test]
    fn test_span_records_on_finish() {
        let registry = Arc::new(MetricsRegistry::new());
        registry.span(metric_names::BUFFER_PROCESSED).finish();
        registry.record_duration(metric_names::BUFFER_PROCESSED, Duration::from_micros(7));
        assert_eq!(registry.summary()[metric_names::BUFFER_PROCESSED].count, 2);
    }
}
