//! In-memory queue backend
//!
//! Keeps lists in process memory. Useful for development and for exercising
//! the pipeline without a Redis server; `set_available(false)` simulates an
//! outage.

use async_trait::async_trait;
use parking_lot::Mutex;
use scriber_core::{BackendError, QueueBackend};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// In-memory list store
pub struct MemoryQueue {
    lists: Mutex<HashMap<String, Vec<String>>>,
    available: AtomicBool,
    /// Count of elements pushed
    pushed_count: AtomicU64,
}

impl MemoryQueue {
    /// Create an empty, available queue
    pub fn new() -> Self {
        Self {
            lists: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
            pushed_count: AtomicU64::new(0),
        }
    }

    /// Make pushes succeed (`true`) or fail with a connection error (`false`)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Relaxed);
    }

    /// Elements of `queue`, head first
    pub fn list(&self, queue: &str) -> Vec<String> {
        self.lists.lock().get(queue).cloned().unwrap_or_default()
    }

    /// Names of non-empty queues, sorted
    pub fn queues(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lists.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Total elements pushed since creation
    pub fn pushed_count(&self) -> u64 {
        self.pushed_count.load(Ordering::Relaxed)
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueBackend for MemoryQueue {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn push(&self, queue: &str, payload: String) -> Result<u64, BackendError> {
        if !self.available.load(Ordering::Relaxed) {
            return Err(BackendError::Connection(
                "memory queue marked unavailable".to_string(),
            ));
        }

        let mut lists = self.lists.lock();
        let list = lists.entry(queue.to_string()).or_default();
        list.push(payload);
        self.pushed_count.fetch_add(1, Ordering::Relaxed);
        Ok(list.len() as u64)
    }

    async fn health(&self) -> bool {
        self.available.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_push_appends_to_tail() {
        let queue = MemoryQueue::new();

        assert_eq!(queue.push("q", "a".to_string()).await.unwrap(), 1);
        assert_eq!(queue.push("q", "b".to_string()).await.unwrap(), 2);
        assert_eq!(queue.push("other", "c".to_string()).await.unwrap(), 1);

        assert_eq!(queue.list("q"), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(queue.queues(), vec!["other".to_string(), "q".to_string()]);
        assert_eq!(queue.pushed_count(), 3);
    }

    #[tokio::test]
    async fn test_unavailable_queue_rejects_push() {
        let queue = MemoryQueue::new();
        queue.set_available(false);

        let err = queue.push("q", "a".to_string()).await.unwrap_err();
        assert!(matches!(err, BackendError::Connection(_)));
        assert!(queue.list("q").is_empty());
        assert!(!queue.health().await);

        queue.set_available(true);
        assert!(queue.health().await);
        assert_eq!(queue.push("q", "a".to_string()).await.unwrap(), 1);
    }
}
