//! Metrics sink consumed by the pipeline
//!
//! The pipeline reports what it did through [`MetricsSink`]; where the
//! numbers end up (Prometheus, memory, nowhere) is the sink's business.
//! Counter names follow the statsd-style scheme the fan-out dashboards use:
//! `dropped.<reason>`, `error.<kind>`, `published`, `broadcasts`, and
//! `<queue>.queue_length` for the per-queue depth gauge.

use parking_lot::Mutex;
use std::collections::HashMap;

/// Counter name for published commands
pub const PUBLISHED: &str = "published";

/// Counter name for broadcast channel touches
pub const BROADCASTS: &str = "broadcasts";

/// Suffix of the per-queue depth gauge
pub const QUEUE_LENGTH_SUFFIX: &str = ".queue_length";

/// Why a record or command never reached the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// Staleness wrapper says the message expired
    StaleTtl,
    /// Payload failed to decode or validate
    InvalidFormat,
    /// Batch could not be serialized
    EncodeFail,
}

impl DropReason {
    /// Label value
    pub fn as_str(self) -> &'static str {
        match self {
            DropReason::StaleTtl => "stale_ttl",
            DropReason::InvalidFormat => "invalid_format",
            DropReason::EncodeFail => "encode_fail",
        }
    }

    /// Full counter name, e.g. `dropped.stale_ttl`
    pub fn metric_name(self) -> &'static str {
        match self {
            DropReason::StaleTtl => "dropped.stale_ttl",
            DropReason::InvalidFormat => "dropped.invalid_format",
            DropReason::EncodeFail => "dropped.encode_fail",
        }
    }
}

/// Batch-level failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Serializing the batch failed; the batch is dropped
    EncodeFail,
    /// Queue write failed; the caller is asked to retry
    RedisPublishFailTemp,
}

impl FailureKind {
    /// Label value
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::EncodeFail => "encode_fail",
            FailureKind::RedisPublishFailTemp => "redis_publish_fail_temp",
        }
    }

    /// Full counter name, e.g. `error.encode_fail`
    pub fn metric_name(self) -> &'static str {
        match self {
            FailureKind::EncodeFail => "error.encode_fail",
            FailureKind::RedisPublishFailTemp => "error.redis_publish_fail_temp",
        }
    }
}

/// Name of the depth gauge for `queue`
pub fn queue_length_name(queue: &str) -> String {
    format!("{queue}{QUEUE_LENGTH_SUFFIX}")
}

/// Destination for pipeline counters and gauges
///
/// Implementations must be cheap and non-blocking; they are called on the
/// request path of every inbound batch.
pub trait MetricsSink: Send + Sync {
    /// `count` records or commands were dropped for `reason`
    fn record_dropped(&self, reason: DropReason, count: u64);

    /// One batch-level failure of `kind`
    fn record_error(&self, kind: FailureKind);

    /// `count` commands were written to a queue
    fn record_published(&self, count: u64);

    /// Broadcast commands in a written batch addressed `count` channels in total
    fn record_broadcasts(&self, count: u64);

    /// `queue` holds `length` elements after the last push
    fn set_queue_length(&self, queue: &str, length: u64);
}

/// Sink that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record_dropped(&self, _reason: DropReason, _count: u64) {}
    fn record_error(&self, _kind: FailureKind) {}
    fn record_published(&self, _count: u64) {}
    fn record_broadcasts(&self, _count: u64) {}
    fn set_queue_length(&self, _queue: &str, _length: u64) {}
}

/// Sink that keeps counters and gauges in memory, keyed by statsd-style name
///
/// Counters that were never incremented are absent, which lets callers tell
/// "not emitted" from "emitted zero".
#[derive(Debug, Default)]
pub struct MemoryMetrics {
    counters: Mutex<HashMap<String, u64>>,
    gauges: Mutex<HashMap<String, u64>>,
}

impl MemoryMetrics {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of counter `name`, 0 if never emitted
    pub fn counter(&self, name: &str) -> u64 {
        self.counters.lock().get(name).copied().unwrap_or(0)
    }

    /// True if counter `name` was emitted at least once
    pub fn emitted(&self, name: &str) -> bool {
        self.counters.lock().contains_key(name)
    }

    /// Last value of gauge `name`
    pub fn gauge(&self, name: &str) -> Option<u64> {
        self.gauges.lock().get(name).copied()
    }

    /// Names of all emitted counters, sorted
    pub fn counter_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.counters.lock().keys().cloned().collect();
        names.sort();
        names
    }

    fn incr(&self, name: &str, by: u64) {
        *self.counters.lock().entry(name.to_string()).or_insert(0) += by;
    }
}

impl MetricsSink for MemoryMetrics {
    fn record_dropped(&self, reason: DropReason, count: u64) {
        self.incr(reason.metric_name(), count);
    }

    fn record_error(&self, kind: FailureKind) {
        self.incr(kind.metric_name(), 1);
    }

    fn record_published(&self, count: u64) {
        self.incr(PUBLISHED, count);
    }

    fn record_broadcasts(&self, count: u64) {
        self.incr(BROADCASTS, count);
    }

    fn set_queue_length(&self, queue: &str, length: u64) {
        self.gauges.lock().insert(queue_length_name(queue), length);
    }
}
