//! Error types for the scriber gateway

use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

pub use scriber_core::BackendError;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Main error type for startup and transport failures
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed Scribe frame
    #[error("protocol error: {0}")]
    Protocol(#[from] crate::scribe::ProtocolError),

    /// Queue backend error
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// Metrics error
    #[error("metrics error: {0}")]
    Metrics(String),
}

/// Why one inbound record was rejected
///
/// These never fail a batch; the translator counts them and moves on.
#[derive(Error, Debug)]
pub enum ParseError {
    /// Payload is not JSON, or not an object of the expected shape
    #[error("decode failed: {0}")]
    Decode(#[from] serde_json::Error),

    /// Payload decoded but a required field is empty or absent
    #[error("invalid message: {0}")]
    Validation(&'static str),

    /// Payload declared a ts/ttl that has already passed
    #[error(transparent)]
    Stale(#[from] StaleMessage),
}

impl ParseError {
    /// True for messages dropped because they expired
    pub fn is_stale(&self) -> bool {
        matches!(self, ParseError::Stale(_))
    }
}

/// A message whose `ts + ttl` lies in the past
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("message expired {expired_for:?} ago: sent at {sent_at}, with ttl {ttl:?}")]
pub struct StaleMessage {
    /// When the producer sent the message
    pub sent_at: DateTime<Utc>,
    /// Declared time-to-live
    pub ttl: Duration,
    /// How long ago the message expired
    pub expired_for: Duration,
}
