//! scriber-core - Core types for the scriber bridge
//!
//! This crate provides the types shared between the bridge pipeline, its
//! queue backends and its metrics sinks:
//!
//! - [`LogEntry`] / [`ResultCode`] - the inbound Scribe call contract
//! - [`Envelope`], [`Command`], [`CommandBatch`] - the outbound wire format
//! - [`QueueBackend`] trait - async interface for appending batches to a list
//! - [`MetricsSink`] trait - counters and gauges reported by the pipeline
//! - [`BackendError`] - error type for backend operations
//!
//! # Why this crate exists
//!
//! Backends and sinks only need these types, not the Scribe transport or the
//! Prometheus registry. Keeping them here lets alternative backends be built
//! against a small, stable surface:
//!
//! ```text
//! scriber-core ◄── scriber-gateway ◄── scriber-runtime
//!      ▲
//!      └────────── custom backends / sinks
//! ```

#![deny(unsafe_code)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]
#![warn(missing_docs)]

mod emit;
mod error;
/// Inbound records and outbound commands
pub mod message;
/// Metrics sink trait and in-process sinks
pub mod metrics;

pub use emit::QueueBackend;
pub use error::BackendError;
pub use message::{
    BroadcastParams, Command, CommandBatch, Envelope, LogEntry, Method, Mode, PublishParams,
    ResultCode,
};
pub use metrics::{DropReason, FailureKind, MemoryMetrics, MetricsSink, NoopMetrics};
