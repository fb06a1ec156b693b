//! Queue backend trait
//!
//! The [`QueueBackend`] trait is the output side of the bridge: it appends
//! one serialized batch to the tail of a named list.

use crate::error::BackendError;
use async_trait::async_trait;

/// QueueBackend trait - appends serialized batches to destination lists
///
/// # Implementation Requirements
///
/// - Backends must be `Send + Sync`; one instance is shared by every
///   concurrent inbound call
/// - `push` must be bounded in time so that a stalled backend turns into an
///   error instead of a stalled caller
/// - Health checks should be lightweight and not affect normal operation
///
/// # Example
///
/// ```ignore
/// use scriber_core::{BackendError, QueueBackend};
/// use async_trait::async_trait;
///
/// struct LoggingQueue;
///
/// #[async_trait]
/// impl QueueBackend for LoggingQueue {
///     fn name(&self) -> &'static str {
///         "logging"
///     }
///
///     async fn push(&self, queue: &str, payload: String) -> Result<u64, BackendError> {
///         println!("{queue} <- {payload}");
///         Ok(1)
///     }
///
///     async fn health(&self) -> bool {
///         true
///     }
/// }
/// ```
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Returns the backend's name for identification and logging
    fn name(&self) -> &'static str;

    /// Append `payload` as a single element to the tail of list `queue`
    ///
    /// # Returns
    ///
    /// * `Ok(len)` - the list length after the append
    /// * `Err(BackendError)` - the element was not written
    async fn push(&self, queue: &str, payload: String) -> Result<u64, BackendError>;

    /// Check if the backend is reachable and accepting writes
    async fn health(&self) -> bool;

    /// Graceful shutdown
    ///
    /// The default implementation returns `Ok(())` for backends that
    /// don't need cleanup.
    async fn shutdown(&self) -> Result<(), BackendError> {
        Ok(())
    }
}
