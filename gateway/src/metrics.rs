//! Prometheus metrics for the Scribe bridge

use crate::error::{BridgeError, Result};
use prometheus::{
    Counter, CounterVec, Encoder, GaugeVec, Histogram, TextEncoder, register_counter,
    register_counter_vec, register_gauge_vec, register_histogram,
};
use scriber_core::{DropReason, FailureKind, MetricsSink, ResultCode};
use std::sync::OnceLock;
use std::time::Duration;

/// Global metrics instance
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// All bridge metrics
pub struct Metrics {
    // ─────────────────────────────────────────────────────────────────────────
    // Record outcomes
    // ─────────────────────────────────────────────────────────────────────────
    /// Records dropped before enqueue (by reason)
    pub events_dropped: CounterVec,

    /// Failures while handling a batch (by kind)
    pub errors: CounterVec,

    /// Commands written to the queue
    pub published: Counter,

    /// Channel deliveries implied by broadcast commands
    pub broadcasts: Counter,

    // ─────────────────────────────────────────────────────────────────────────
    // Queue & batches
    // ─────────────────────────────────────────────────────────────────────────
    /// List length after the last push (by queue key)
    pub queue_length: GaugeVec,

    /// Log entries per inbound batch
    pub batch_size: Histogram,

    /// Time spent in the queue push
    pub enqueue_duration_seconds: Histogram,

    /// Inbound batches by result code
    pub batches: CounterVec,
}

impl Metrics {
    /// Initialize metrics (call once at startup)
    ///
    /// Returns error if metric registration fails.
    pub fn init() -> Result<&'static Metrics> {
        if let Some(metrics) = METRICS.get() {
            return Ok(metrics);
        }

        let metrics = Metrics {
            events_dropped: register_counter_vec!(
                "scriber_events_dropped_total",
                "Total log entries dropped before enqueue",
                &["reason"]
            )
            .map_err(|e| BridgeError::Metrics(format!("events_dropped: {e}")))?,

            errors: register_counter_vec!(
                "scriber_errors_total",
                "Total batch handling failures",
                &["kind"]
            )
            .map_err(|e| BridgeError::Metrics(format!("errors: {e}")))?,

            published: register_counter!(
                "scriber_published_total",
                "Total commands written to the queue"
            )
            .map_err(|e| BridgeError::Metrics(format!("published: {e}")))?,

            broadcasts: register_counter!(
                "scriber_broadcasts_total",
                "Total channel deliveries requested by broadcast commands"
            )
            .map_err(|e| BridgeError::Metrics(format!("broadcasts: {e}")))?,

            queue_length: register_gauge_vec!(
                "scriber_queue_length",
                "Queue list length observed after the last push",
                &["queue"]
            )
            .map_err(|e| BridgeError::Metrics(format!("queue_length: {e}")))?,

            batch_size: register_histogram!(
                "scriber_batch_size",
                "Number of log entries per inbound batch",
                // Buckets: 1, 10, 50, 100, 500, 1000, 5000, 10000
                vec![1.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0, 10000.0]
            )
            .map_err(|e| BridgeError::Metrics(format!("batch_size: {e}")))?,

            enqueue_duration_seconds: register_histogram!(
                "scriber_enqueue_duration_seconds",
                "Time spent pushing a batch to the queue",
                // Buckets: 100us to 5s
                vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
            )
            .map_err(|e| BridgeError::Metrics(format!("enqueue_duration_seconds: {e}")))?,

            batches: register_counter_vec!(
                "scriber_batches_total",
                "Total inbound batches by result",
                &["result"]
            )
            .map_err(|e| BridgeError::Metrics(format!("batches: {e}")))?,
        };

        // Set the metrics (only succeeds once)
        let _ = METRICS.set(metrics);

        METRICS
            .get()
            .ok_or_else(|| BridgeError::Metrics("Failed to initialize metrics".to_string()))
    }

    /// Get the global metrics instance
    ///
    /// Returns None if metrics haven't been initialized yet.
    pub fn get() -> Option<&'static Metrics> {
        METRICS.get()
    }

    /// Record an inbound batch and how it was answered
    pub fn record_batch(&self, entries: usize, result: ResultCode) {
        self.batch_size.observe(entries as f64);
        self.batches.with_label_values(&[result.as_str()]).inc();
    }

    /// Record how long a queue push took
    pub fn record_enqueue_duration(&self, duration: Duration) {
        self.enqueue_duration_seconds
            .observe(duration.as_secs_f64());
    }
}

/// Gather all metrics and encode as Prometheus text format
///
/// Returns the metrics as a String, ready to be served via HTTP.
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_ok() {
        String::from_utf8(buffer).unwrap_or_default()
    } else {
        String::new()
    }
}

/// Record a batch if metrics are initialized, otherwise skip
pub fn try_record_batch(entries: usize, result: ResultCode) {
    if let Some(m) = Metrics::get() {
        m.record_batch(entries, result);
    }
}

/// Record a push duration if metrics are initialized, otherwise skip
pub fn try_record_enqueue_duration(duration: Duration) {
    if let Some(m) = Metrics::get() {
        m.record_enqueue_duration(duration);
    }
}

/// [`MetricsSink`] backed by the global Prometheus registry
pub struct PrometheusSink {
    metrics: &'static Metrics,
}

impl PrometheusSink {
    /// Initialize the global metrics and wrap them
    pub fn init() -> Result<Self> {
        Ok(Self {
            metrics: Metrics::init()?,
        })
    }
}

impl MetricsSink for PrometheusSink {
    fn record_dropped(&self, reason: DropReason, count: u64) {
        self.metrics
            .events_dropped
            .with_label_values(&[reason.as_str()])
            .inc_by(count as f64);
    }

    fn record_error(&self, kind: FailureKind) {
        self.metrics
            .errors
            .with_label_values(&[kind.as_str()])
            .inc();
    }

    fn record_published(&self, count: u64) {
        self.metrics.published.inc_by(count as f64);
    }

    fn record_broadcasts(&self, count: u64) {
        self.metrics.broadcasts.inc_by(count as f64);
    }

    fn set_queue_length(&self, queue: &str, length: u64) {
        self.metrics
            .queue_length
            .with_label_values(&[queue])
            .set(length as f64);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_init_is_idempotent() {
        let first = Metrics::init().unwrap() as *const Metrics;
        let second = Metrics::init().unwrap() as *const Metrics;
        assert_eq!(first, second);
        assert!(Metrics::get().is_some());
    }

    #[test]
    fn test_sink_records_into_registry() {
        let sink = PrometheusSink::init().unwrap();

        sink.record_dropped(DropReason::StaleTtl, 2);
        sink.record_error(FailureKind::RedisPublishFailTemp);
        sink.record_published(5);
        sink.set_queue_length("test.queue.gauge", 42);

        let m = Metrics::get().unwrap();
        assert!(
            m.events_dropped
                .with_label_values(&["stale_ttl"])
                .get()
                >= 2.0
        );
        assert!(m.published.get() >= 5.0);
        assert_eq!(
            m.queue_length
                .with_label_values(&["test.queue.gauge"])
                .get(),
            42.0
        );
    }

    #[test]
    fn test_gather_contains_registered_series() {
        let _ = Metrics::init();
        try_record_batch(3, ResultCode::Ok);
        try_record_enqueue_duration(Duration::from_millis(2));

        let text = gather();
        assert!(text.contains("scriber_batches_total"));
        assert!(text.contains("scriber_batch_size"));
        assert!(text.contains("scriber_enqueue_duration_seconds"));
    }
}
