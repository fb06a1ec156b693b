//! Pipeline integration tests
//!
//! Drive whole batches through `Handler` (and, for the transport tests,
//! through a real loopback Scribe connection) and check what lands in the
//! queue, what the client is told, and which counters move.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use scriber_core::{BackendError, LogEntry, MemoryMetrics, Mode, QueueBackend, ResultCode};
use scriber_gateway::{Handler, MemoryQueue, QueueRouter, ScribeClient, ScribeServer};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Shared test backends
// ============================================================================

/// Backend that captures every push for later inspection
struct CaptureQueue {
    pushed: Mutex<Vec<(String, String)>>,
}

impl CaptureQueue {
    fn new() -> Self {
        Self {
            pushed: Mutex::new(Vec::new()),
        }
    }

    fn take_all(&self) -> Vec<(String, String)> {
        self.pushed.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl QueueBackend for CaptureQueue {
    fn name(&self) -> &'static str {
        "capture"
    }

    async fn push(&self, queue: &str, payload: String) -> Result<u64, BackendError> {
        let mut pushed = self.pushed.lock().unwrap();
        pushed.push((queue.to_string(), payload));
        Ok(pushed.len() as u64)
    }

    async fn health(&self) -> bool {
        true
    }
}

/// Backend whose pushes always fail as if Redis were unreachable
struct FailingQueue {
    attempts: AtomicU64,
}

impl FailingQueue {
    fn new() -> Self {
        Self {
            attempts: AtomicU64::new(0),
        }
    }
}

#[async_trait::async_trait]
impl QueueBackend for FailingQueue {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn push(&self, _queue: &str, _payload: String) -> Result<u64, BackendError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(BackendError::Connection("connection refused".to_string()))
    }

    async fn health(&self) -> bool {
        false
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

fn broadcast_handler(
    backend: Arc<dyn QueueBackend>,
    shards: usize,
) -> (Handler, Arc<MemoryMetrics>) {
    let metrics = Arc::new(MemoryMetrics::new());
    let handler = Handler::new(
        Mode::Broadcast,
        QueueRouter::new("centrifugo.api", shards),
        backend,
        metrics.clone(),
    );
    (handler, metrics)
}

fn entry(message: impl Into<String>) -> LogEntry {
    LogEntry::new("HUBD", message.into())
}

// ============================================================================
// End-to-end scenarios
// ============================================================================

#[tokio::test]
async fn single_valid_broadcast_is_published() {
    let queue = Arc::new(CaptureQueue::new());
    let (handler, metrics) = broadcast_handler(queue.clone(), 0);

    let code = handler
        .log(&[entry(r#"{"channels":["foo"],"data":{"foo":1234}}"#)])
        .await;

    assert_eq!(code, ResultCode::Ok);
    let pushed = queue.take_all();
    assert_eq!(pushed.len(), 1);
    assert_eq!(pushed[0].0, "centrifugo.api");

    let batch: Value = serde_json::from_str(&pushed[0].1).unwrap();
    assert_eq!(
        batch,
        serde_json::json!({
            "data": [{
                "method": "broadcast",
                "params": {"channels": ["foo"], "data": {"foo": 1234}}
            }]
        })
    );
    assert_eq!(metrics.counter("broadcasts"), 1);
    assert_eq!(metrics.counter("published"), 1);
    assert_eq!(metrics.gauge("centrifugo.api.queue_length"), Some(1));
}

#[tokio::test]
async fn expired_message_is_dropped_without_queue_write() {
    let queue = Arc::new(CaptureQueue::new());
    let (handler, metrics) = broadcast_handler(queue.clone(), 0);
    let hour_ago = unix_now() - 3600;

    let code = handler
        .log(&[entry(format!(
            r#"{{"channels":["foo"],"data":{{"ts":{hour_ago},"ttl":60,"data":{{"foo":1}}}}}}"#
        ))])
        .await;

    assert_eq!(code, ResultCode::Ok);
    assert!(queue.take_all().is_empty());
    assert_eq!(metrics.counter("dropped.stale_ttl"), 1);
    assert!(!metrics.emitted("published"));
}

#[tokio::test]
async fn expired_record_is_removed_from_mixed_batch() {
    let queue = Arc::new(CaptureQueue::new());
    let (handler, _) = broadcast_handler(queue.clone(), 0);
    let now = unix_now();

    let code = handler
        .log(&[
            entry(r#"{"channels":["first"],"data":{"n":1}}"#),
            entry(format!(
                r#"{{"channels":["stale"],"data":{{"ts":{},"ttl":10,"data":{{}}}}}}"#,
                now - 100
            )),
            entry(format!(
                r#"{{"channels":["second"],"data":{{"ts":{now},"ttl":600,"data":{{"n":2}}}}}}"#
            )),
        ])
        .await;

    assert_eq!(code, ResultCode::Ok);
    let pushed = queue.take_all();
    let batch: Value = serde_json::from_str(&pushed[0].1).unwrap();
    let channels: Vec<&str> = batch["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|cmd| cmd["params"]["channels"][0].as_str().unwrap())
        .collect();
    assert_eq!(channels, vec!["first", "second"]);

    // The ts/ttl wrapper is forwarded untouched
    assert_eq!(batch["data"][1]["params"]["data"]["ttl"], 600);
}

#[tokio::test]
async fn backend_failure_asks_client_to_retry() {
    let queue = Arc::new(FailingQueue::new());
    let (handler, metrics) = broadcast_handler(queue.clone(), 0);

    let code = handler
        .log(&[entry(r#"{"channels":["foo"],"data":{"foo":1234}}"#)])
        .await;

    assert_eq!(code, ResultCode::TryLater);
    assert_eq!(queue.attempts.load(Ordering::SeqCst), 1);
    assert_eq!(
        metrics.counter_names(),
        vec!["error.redis_publish_fail_temp".to_string()]
    );
    assert_eq!(metrics.gauge("centrifugo.api.queue_length"), None);
}

// ============================================================================
// Batching and sharding
// ============================================================================

#[tokio::test]
async fn invalid_records_never_fail_the_batch() {
    let queue = Arc::new(FailingQueue::new());
    let (handler, metrics) = broadcast_handler(queue.clone(), 0);

    let code = handler
        .log(&[
            entry("not json"),
            entry(r#"{"channels":[],"data":{"a":1}}"#),
            entry(r#"{"channels":["a"]}"#),
        ])
        .await;

    // Nothing survived, so the failing backend is never asked
    assert_eq!(code, ResultCode::Ok);
    assert_eq!(queue.attempts.load(Ordering::SeqCst), 0);
    assert_eq!(metrics.counter("dropped.invalid_format"), 3);
}

#[tokio::test]
async fn sharded_batches_spread_over_shard_keys() {
    let queue = Arc::new(MemoryQueue::new());
    let (handler, _) = broadcast_handler(queue.clone(), 4);

    for i in 0..200 {
        let code = handler
            .log(&[entry(format!(r#"{{"channels":["c{i}"],"data":{{}}}}"#))])
            .await;
        assert_eq!(code, ResultCode::Ok);
    }

    let queues = queue.queues();
    assert_eq!(
        queues,
        vec![
            "centrifugo.api.pub.0".to_string(),
            "centrifugo.api.pub.1".to_string(),
            "centrifugo.api.pub.2".to_string(),
            "centrifugo.api.pub.3".to_string(),
        ]
    );
    let total: usize = queues.iter().map(|q| queue.list(q).len()).sum();
    assert_eq!(total, 200);
}

#[tokio::test]
async fn publish_mode_emits_publish_commands() {
    let queue = Arc::new(MemoryQueue::new());
    let metrics = Arc::new(MemoryMetrics::new());
    let handler = Handler::new(
        Mode::Publish,
        QueueRouter::new("rt", 0),
        queue.clone(),
        metrics.clone(),
    );

    let code = handler
        .log(&[
            entry(r#"{"channel":"news","data":{"title":"hi"}}"#),
            // broadcast shape is not valid in publish mode
            entry(r#"{"channels":["news"],"data":{"title":"hi"}}"#),
        ])
        .await;

    assert_eq!(code, ResultCode::Ok);
    assert_eq!(
        queue.list("rt"),
        vec![r#"{"data":[{"method":"publish","params":{"channel":"news","data":{"title":"hi"}}}]}"#.to_string()]
    );
    assert_eq!(metrics.counter("dropped.invalid_format"), 1);
    assert!(!metrics.emitted("broadcasts"));
}

#[tokio::test]
async fn concurrent_batches_are_all_written() {
    let queue = Arc::new(MemoryQueue::new());
    let (handler, metrics) = broadcast_handler(queue.clone(), 0);
    let handler = Arc::new(handler);

    let mut tasks = Vec::new();
    for i in 0..16 {
        let handler = Arc::clone(&handler);
        tasks.push(tokio::spawn(async move {
            let entries: Vec<LogEntry> = (0..10)
                .map(|j| entry(format!(r#"{{"channels":["c{i}","d{j}"],"data":{{}}}}"#)))
                .collect();
            handler.log(&entries).await
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap(), ResultCode::Ok);
    }

    assert_eq!(queue.list("centrifugo.api").len(), 16);
    assert_eq!(metrics.counter("published"), 160);
    assert_eq!(metrics.counter("broadcasts"), 320);
}

// ============================================================================
// Over the wire
// ============================================================================

#[tokio::test]
async fn scribe_client_to_queue_over_tcp() {
    let queue = Arc::new(MemoryQueue::new());
    let (handler, _) = broadcast_handler(queue.clone(), 0);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let server = tokio::spawn(ScribeServer::new(Arc::new(handler)).serve(listener, shutdown.clone()));

    let mut client = ScribeClient::connect(addr).await.unwrap();
    let code = client
        .log(&[
            entry(r#"{"channels":["a","b"],"data":{"x":1}}"#),
            entry("garbage"),
        ])
        .await
        .unwrap();
    assert_eq!(code, ResultCode::Ok);
    assert_eq!(
        queue.list("centrifugo.api"),
        vec![r#"{"data":[{"method":"broadcast","params":{"channels":["a","b"],"data":{"x":1}}}]}"#.to_string()]
    );

    queue.set_available(false);
    let code = client
        .log(&[entry(r#"{"channels":["a"],"data":{"x":2}}"#)])
        .await
        .unwrap();
    assert_eq!(code, ResultCode::TryLater);

    shutdown.cancel();
    server.await.unwrap().unwrap();
}
