//! scriber - Scribe to real-time fan-out queue bridge
//!
//! Receives batches of Scribe log entries, turns each entry's JSON payload
//! into a `publish` or `broadcast` command, and appends the whole batch as a
//! single element to a Redis list consumed by the fan-out service.
//!
//! # Pipeline
//!
//! ```text
//! Scribe ──► ScribeServer ──► Handler ──► Translator ──► QueueRouter ──► Submitter ──► QueueBackend
//!                                            │                              │
//!                                            └──────── MetricsSink ◄────────┘
//! ```
//!
//! Per-record problems (bad JSON, empty fields, expired ts/ttl) drop the
//! record and never fail the batch. Only a failed queue push makes the
//! client retry, via `TRY_LATER`.

#![deny(unsafe_code)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]

pub mod config;
pub mod emit;
pub mod error;
pub mod handler;
pub mod ingest;
pub mod metrics;
pub mod metrics_server;
pub mod router;
pub mod scribe;

pub use config::{BackendKind, Config, LogFormat, QueueConfig};
pub use emit::{
    MemoryQueue, QueueBackend, RedisConfig, RedisQueue, SubmitOutcome, Submitter,
};
pub use error::{BackendError, BridgeError, ParseError, Result, StaleMessage};
pub use handler::Handler;
pub use ingest::{MessageParser, Translation, Translator};
pub use metrics::{Metrics, PrometheusSink};
pub use metrics_server::MetricsServer;
pub use router::QueueRouter;
pub use scribe::{ScribeClient, ScribeServer};
