//! Error types for queue backends

use std::time::Duration;
use thiserror::Error;

/// Error type for queue backend operations
///
/// Every variant describes a failure to append a batch to the destination
/// list. The bridge treats all of them as transient: the inbound caller is
/// told to redeliver the batch later.
///
/// # Example
///
/// ```
/// use scriber_core::BackendError;
///
/// fn push_to_backend() -> Result<u64, BackendError> {
///     // Simulate connection failure
///     Err(BackendError::Connection("refused".to_string()))
/// }
///
/// match push_to_backend() {
///     Ok(len) => println!("queue length now {}", len),
///     Err(BackendError::Connection(msg)) => println!("connection failed: {}", msg),
///     Err(e) => println!("other error: {}", e),
/// }
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Connection error
    ///
    /// Returned when the backend cannot be reached.
    /// Examples: DNS lookup failed, connection refused, connection reset.
    #[error("connection error: {0}")]
    Connection(String),

    /// Timeout
    ///
    /// Returned when connecting or waiting for a reply took longer than the
    /// configured bound.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Command failed
    ///
    /// Returned when the backend answered with an error reply.
    /// Examples: wrong type for key, out of memory, read-only replica.
    #[error("command failed: {0}")]
    Command(String),

    /// Not ready
    ///
    /// Returned by a backend that has been shut down.
    #[error("backend not ready")]
    NotReady,
}
