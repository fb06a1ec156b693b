//! Queue backends and batch submission
//!
//! Every translated batch is written as a single list element to one queue.
//! Backends implement [`QueueBackend`] from scriber-core so the rest of the
//! gateway never depends on a concrete store.

pub mod memory;
pub mod redis;
pub mod submit;

pub use scriber_core::{BackendError, QueueBackend};

pub use memory::MemoryQueue;
pub use self::redis::{RedisConfig, RedisQueue};
pub use submit::{SubmitOutcome, Submitter};
