//! Observability: per-cycle tracing IDs and latency histograms.
//! Every capture cycle carries trace_id, request_id, generation.
//! Histograms track p50/p95/p99 for capture, parse and whole-cycle timing.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Identifiers attached to one capture cycle.
#[derive(Debug, Clone)]
pub struct RequestIds {
    pub trace_id: String,
    pub request_id: String,
    pub generation: u64,
}

impl RequestIds {
    pub fn new(generation: u64) -> Self {
        Self {
            trace_id: uuid::Uuid::new_v4().to_string(),
            request_id: uuid::Uuid::new_v4().to_string(),
            generation,
        }
    }
}

/// Measures elapsed time from creation until `finish`.
pub struct TimingSpan {
    name: &'static str,
    start: Instant,
    registry: Arc<MetricsRegistry>,
}

impl TimingSpan {
    /// Record the elapsed duration in microseconds and return it.
    pub fn finish(self) -> f64 {
        let elapsed_us = self.start.elapsed().as_micros() as f64;
        self.registry.record(self.name, elapsed_us);
        elapsed_us
    }
}

/// Fixed-capacity ring of samples; the oldest sample is overwritten.
struct SampleRing {
    samples: Vec<f64>,
    pos: usize,
    count: usize,
}

impl SampleRing {
    fn new(capacity: usize) -> Self {
        Self {
            samples: vec![0.0; capacity],
            pos: 0,
            count: 0,
        }
    }

    fn push(&mut self, value: f64) {
        let capacity = self.samples.len();
        self.samples[self.pos] = value;
        self.pos = (self.pos + 1) % capacity;
        if self.count < capacity {
            self.count += 1;
        }
    }

    fn percentile(&self, p: f64) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let mut sorted: Vec<f64> = self.samples[..self.count].to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let idx = ((p / 100.0) * (self.count as f64 - 1.0)).round() as usize;
        sorted[idx.min(self.count - 1)]
    }
}

pub struct MetricsRegistry {
    histograms: Mutex<HashMap<&'static str, SampleRing>>,
    ring_capacity: usize,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(ring_capacity: usize) -> Self {
        Self {
            histograms: Mutex::new(HashMap::new()),
            ring_capacity: ring_capacity.max(1),
        }
    }

    /// Record a sample (in microseconds) for the named metric.
    pub fn record(&self, name: &'static str, value_us: f64) {
        let mut hists = self.histograms.lock();
        hists
            .entry(name)
            .or_insert_with(|| SampleRing::new(self.ring_capacity))
            .push(value_us);
        tracing::debug!(metric = name, value_us = value_us, "metric_recorded");
    }

    /// Start a timing span that records on finish.
    pub fn span(self: &Arc<Self>, name: &'static str) -> TimingSpan {
        TimingSpan {
            name,
            start: Instant::now(),
            registry: Arc::clone(self),
        }
    }

    /// Percentile (0-100) for a metric in microseconds; 0 when unrecorded.
    pub fn percentile(&self, name: &str, p: f64) -> f64 {
        self.histograms
            .lock()
            .get(name)
            .map(|ring| ring.percentile(p))
            .unwrap_or(0.0)
    }

    pub fn count(&self, name: &str) -> usize {
        self.histograms.lock().get(name).map_or(0, |ring| ring.count)
    }

    /// p50/p95/p99 of every recorded metric.
    pub fn summary(&self) -> HashMap<String, MetricSummary> {
        let hists = self.histograms.lock();
        hists
            .iter()
            .map(|(&name, ring)| {
                (
                    name.to_string(),
                    MetricSummary {
                        p50_us: ring.percentile(50.0),
                        p95_us: ring.percentile(95.0),
                        p99_us: ring.percentile(99.0),
                        count: ring.count,
                    },
                )
            })
            .collect()
    }

    /// Emit the summary as one JSON log line.
    pub fn log_summary(&self) {
        match serde_json::to_string(&self.summary()) {
            Ok(json) => tracing::info!(summary = %json, "metrics_summary"),
            Err(e) => tracing::warn!(error = %e, "metrics summary serialization failed"),
        }
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
    pub count: usize,
}

/// Well-known metric names (constants to avoid typos).
pub mod metric_names {
    /// Capture start until the utterance (or failure) arrives.
    pub const CAPTURE_DONE: &str = "t_capture_done";
    pub const PARSE_DONE: &str = "t_parse_done";
    /// Trigger received until the cycle settles, before wake listening resumes.
    pub const CYCLE_DONE: &str = "t_cycle_done";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentiles() {
        let registry = MetricsRegistry::new();
        for v in 1..=100 {
            registry.record(metric_names::PARSE_DONE, v as f64);
        }
        assert_eq!(registry.percentile(metric_names::PARSE_DONE, 50.0), 51.0);
        assert_eq!(registry.percentile(metric_names::PARSE_DONE, 99.0), 99.0);
        assert_eq!(registry.percentile("unknown", 50.0), 0.0);
    }

    #[test]
    fn test_ring_keeps_newest_samples() {
        let registry = MetricsRegistry::with_capacity(4);
        for v in [1000.0, 1000.0, 1.0, 2.0, 3.0, 4.0] {
            registry.record(metric_names::CYCLE_DONE, v);
        }
        assert_eq!(registry.count(metric_names::CYCLE_DONE), 4);
        assert_eq!(registry.percentile(metric_names::CYCLE_DONE, 100.0), 4.0);
    }

    #[test]
    fn test_span_records_into_summary() {
        let registry = Arc::new(MetricsRegistry::new());
        let span = registry.span(metric_names::CAPTURE_DONE);
        assert!(span.finish() >= 0.0);
        let summary = registry.summary();
        assert_eq!(summary[metric_names::CAPTURE_DONE].count, 1);
    }
}
