//! Batch submitter - encodes a translated batch and pushes it to a queue
//!
//! Outcome policy:
//! - empty batch: nothing is written, the caller is told OK
//! - encode failure: the batch is dropped and the caller is told OK, since
//!   redelivering an unencodable batch would loop forever
//! - push failure: transient, the caller is told to retry the whole batch

use crate::ingest::Translation;
use crate::metrics::try_record_enqueue_duration;
use scriber_core::{DropReason, FailureKind, MetricsSink, Mode, QueueBackend, ResultCode};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// What happened to a submitted batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// No commands survived translation; the queue was not touched
    Empty,
    /// The batch was appended to the queue
    Published {
        /// Commands in the batch
        commands: usize,
        /// Queue length reported after the push
        queue_length: u64,
    },
    /// The batch could not be serialized and was discarded
    EncodeDropped {
        /// Commands lost
        commands: usize,
    },
    /// The backend rejected the push; the caller should redeliver
    RetryLater,
}

impl From<SubmitOutcome> for ResultCode {
    fn from(outcome: SubmitOutcome) -> Self {
        match outcome {
            SubmitOutcome::RetryLater => ResultCode::TryLater,
            SubmitOutcome::Empty
            | SubmitOutcome::Published { .. }
            | SubmitOutcome::EncodeDropped { .. } => ResultCode::Ok,
        }
    }
}

/// Writes translated batches to a [`QueueBackend`]
pub struct Submitter {
    mode: Mode,
    backend: Arc<dyn QueueBackend>,
    metrics: Arc<dyn MetricsSink>,
}

impl Submitter {
    /// Create a submitter
    pub fn new(mode: Mode, backend: Arc<dyn QueueBackend>, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            mode,
            backend,
            metrics,
        }
    }

    /// The backend batches are written to
    pub fn backend(&self) -> &Arc<dyn QueueBackend> {
        &self.backend
    }

    /// Encode `translation.batch` and append it to `queue`
    pub async fn submit(&self, translation: &Translation, queue: &str) -> SubmitOutcome {
        if translation.batch.is_empty() {
            info!("No publishable events in batch");
            return SubmitOutcome::Empty;
        }

        let encoded = translation.batch.to_json();
        self.push_encoded(encoded, translation, queue).await
    }

    async fn push_encoded(
        &self,
        encoded: serde_json::Result<String>,
        translation: &Translation,
        queue: &str,
    ) -> SubmitOutcome {
        let commands = translation.batch.len();

        let payload = match encoded {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, commands, "Failed to encode command batch, dropping it");
                self.metrics.record_error(FailureKind::EncodeFail);
                self.metrics
                    .record_dropped(DropReason::EncodeFail, commands as u64);
                return SubmitOutcome::EncodeDropped { commands };
            }
        };

        let start = Instant::now();
        let pushed = self.backend.push(queue, payload).await;
        let elapsed = start.elapsed();
        try_record_enqueue_duration(elapsed);

        match pushed {
            Ok(queue_length) => {
                if self.mode == Mode::Broadcast {
                    self.metrics.record_broadcasts(translation.fanout);
                }
                self.metrics.record_published(commands as u64);
                self.metrics.set_queue_length(queue, queue_length);
                debug!(
                    queue,
                    commands,
                    queue_length,
                    elapsed_ms = elapsed.as_millis() as u64,
                    backend = self.backend.name(),
                    "Published batch"
                );
                SubmitOutcome::Published {
                    commands,
                    queue_length,
                }
            }
            Err(e) => {
                error!(
                    queue,
                    commands,
                    backend = self.backend.name(),
                    error = %e,
                    "Failed to push batch, asking client to retry"
                );
                self.metrics.record_error(FailureKind::RedisPublishFailTemp);
                SubmitOutcome::RetryLater
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::emit::MemoryQueue;
    use scriber_core::{Command, CommandBatch, Envelope, MemoryMetrics, PublishParams};
    use serde_json::value::RawValue;

    fn translation(channels: &[&str]) -> Translation {
        let mut batch = CommandBatch::default();
        for channel in channels {
            batch.push(Command::new(Envelope::Publish(PublishParams {
                channel: channel.to_string(),
                data: RawValue::from_string(r#"{"n":1}"#.to_string()).unwrap(),
            })));
        }
        Translation {
            fanout: channels.len() as u64,
            batch,
            ..Translation::default()
        }
    }

    fn setup(mode: Mode) -> (Submitter, Arc<MemoryQueue>, Arc<MemoryMetrics>) {
        let queue = Arc::new(MemoryQueue::new());
        let metrics = Arc::new(MemoryMetrics::new());
        let submitter = Submitter::new(mode, queue.clone(), metrics.clone());
        (submitter, queue, metrics)
    }

    // ==========================================================================
    // Outcomes
    // ==========================================================================

    #[tokio::test]
    async fn test_empty_batch_skips_queue() {
        let (submitter, queue, metrics) = setup(Mode::Broadcast);

        let outcome = submitter.submit(&Translation::default(), "q").await;

        assert_eq!(outcome, SubmitOutcome::Empty);
        assert_eq!(queue.pushed_count(), 0);
        assert!(metrics.counter_names().is_empty());
    }

    #[tokio::test]
    async fn test_publish_writes_one_element() {
        let (submitter, queue, metrics) = setup(Mode::Publish);

        let outcome = submitter.submit(&translation(&["a", "b"]), "q").await;

        assert_eq!(
            outcome,
            SubmitOutcome::Published {
                commands: 2,
                queue_length: 1
            }
        );
        assert_eq!(
            queue.list("q"),
            vec![
                r#"{"data":[{"method":"publish","params":{"channel":"a","data":{"n":1}}},{"method":"publish","params":{"channel":"b","data":{"n":1}}}]}"#
                    .to_string()
            ]
        );
        assert_eq!(metrics.counter("published"), 2);
        assert_eq!(metrics.gauge("q.queue_length"), Some(1));
        // publish mode never reports fanout
        assert!(!metrics.emitted("broadcasts"));
    }

    #[tokio::test]
    async fn test_broadcast_mode_reports_fanout() {
        let (submitter, _queue, metrics) = setup(Mode::Broadcast);

        submitter.submit(&translation(&["a", "b", "c"]), "q").await;

        assert_eq!(metrics.counter("broadcasts"), 3);
        assert_eq!(metrics.counter("published"), 3);
    }

    #[tokio::test]
    async fn test_queue_length_tracks_pushes() {
        let (submitter, _queue, metrics) = setup(Mode::Publish);

        submitter.submit(&translation(&["a"]), "shard.pub.1").await;
        let outcome = submitter.submit(&translation(&["b"]), "shard.pub.1").await;

        assert_eq!(
            outcome,
            SubmitOutcome::Published {
                commands: 1,
                queue_length: 2
            }
        );
        assert_eq!(metrics.gauge("shard.pub.1.queue_length"), Some(2));
    }

    #[tokio::test]
    async fn test_backend_failure_asks_for_retry() {
        let (submitter, queue, metrics) = setup(Mode::Broadcast);
        queue.set_available(false);

        let outcome = submitter.submit(&translation(&["a"]), "q").await;

        assert_eq!(outcome, SubmitOutcome::RetryLater);
        assert_eq!(ResultCode::from(outcome), ResultCode::TryLater);
        assert_eq!(metrics.counter("error.redis_publish_fail_temp"), 1);
        assert!(!metrics.emitted("published"));
        assert!(!metrics.emitted("broadcasts"));
        assert_eq!(metrics.gauge("q.queue_length"), None);
    }

    #[tokio::test]
    async fn test_encode_failure_drops_batch_and_reports_ok() {
        let (submitter, queue, metrics) = setup(Mode::Broadcast);
        let encode_err = serde_json::from_str::<u8>("oops").unwrap_err();

        let outcome = submitter
            .push_encoded(Err(encode_err), &translation(&["a", "b"]), "q")
            .await;

        assert_eq!(outcome, SubmitOutcome::EncodeDropped { commands: 2 });
        assert_eq!(ResultCode::from(outcome), ResultCode::Ok);
        assert_eq!(metrics.counter("error.encode_fail"), 1);
        assert_eq!(metrics.counter("dropped.encode_fail"), 2);
        assert_eq!(queue.pushed_count(), 0);
    }

    #[test]
    fn test_outcome_to_result_code() {
        assert_eq!(ResultCode::from(SubmitOutcome::Empty), ResultCode::Ok);
        assert_eq!(
            ResultCode::from(SubmitOutcome::Published {
                commands: 1,
                queue_length: 1
            }),
            ResultCode::Ok
        );
        assert_eq!(
            ResultCode::from(SubmitOutcome::RetryLater),
            ResultCode::TryLater
        );
    }
}
