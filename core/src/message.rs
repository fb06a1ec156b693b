//! Inbound records and outbound queue commands
//!
//! ```text
//! LogEntry (category, message bytes)
//!        │  parse
//!        ▼
//! Envelope { channel | channels, data }
//!        │  wrap
//!        ▼
//! Command { method, params }  ──►  CommandBatch { data: [..] }  ──►  one list element
//! ```
//!
//! `data` is kept as raw JSON so the payload reaches the fan-out service
//! byte-for-byte as the producer wrote it.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::fmt;
use std::str::FromStr;

/// One record of an inbound Scribe batch
///
/// The category is carried for logging only; the pipeline ignores it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogEntry {
    /// Scribe category label
    pub category: String,
    /// Raw JSON payload
    pub message: Bytes,
}

impl LogEntry {
    /// Create a log entry
    pub fn new(category: impl Into<String>, message: impl Into<Bytes>) -> Self {
        Self {
            category: category.into(),
            message: message.into(),
        }
    }
}

/// Result returned to the inbound transport for a whole batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ResultCode {
    /// Batch accepted (including batches where every record was dropped)
    Ok = 0,
    /// Caller should redeliver the whole batch
    TryLater = 1,
}

impl ResultCode {
    /// Wire value of the code
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Metric/log label
    pub fn as_str(self) -> &'static str {
        match self {
            ResultCode::Ok => "ok",
            ResultCode::TryLater => "try_later",
        }
    }
}

/// Deployment mode: which command shape the bridge produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Single-channel `publish` commands
    Publish,
    /// Multi-channel `broadcast` commands
    #[default]
    Broadcast,
}

impl Mode {
    /// The command method produced in this mode
    pub fn method(self) -> Method {
        match self {
            Mode::Publish => Method::Publish,
            Mode::Broadcast => Method::Broadcast,
        }
    }

    /// Config/log label
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Publish => "publish",
            Mode::Broadcast => "broadcast",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "publish" => Ok(Mode::Publish),
            "broadcast" => Ok(Mode::Broadcast),
            other => Err(format!("unknown mode '{other}', expected 'publish' or 'broadcast'")),
        }
    }
}

/// Command method understood by the fan-out service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// Deliver to one channel
    Publish,
    /// Deliver to many channels
    Broadcast,
}

/// Parameters of a `publish` command
#[derive(Debug, Clone, Serialize)]
pub struct PublishParams {
    /// Destination channel
    pub channel: String,
    /// Opaque JSON payload
    pub data: Box<RawValue>,
}

/// Parameters of a `broadcast` command
#[derive(Debug, Clone, Serialize)]
pub struct BroadcastParams {
    /// Destination channels, in producer order
    pub channels: Vec<String>,
    /// Opaque JSON payload
    pub data: Box<RawValue>,
}

/// A validated inbound message, in one of the two addressing shapes
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Envelope {
    /// Single-channel addressing
    Publish(PublishParams),
    /// Multi-channel addressing
    Broadcast(BroadcastParams),
}

impl Envelope {
    /// The command method matching this shape
    pub fn method(&self) -> Method {
        match self {
            Envelope::Publish(_) => Method::Publish,
            Envelope::Broadcast(_) => Method::Broadcast,
        }
    }

    /// Number of channels this envelope addresses
    pub fn channel_count(&self) -> usize {
        match self {
            Envelope::Publish(_) => 1,
            Envelope::Broadcast(p) => p.channels.len(),
        }
    }

    /// The raw payload
    pub fn data(&self) -> &RawValue {
        match self {
            Envelope::Publish(p) => &p.data,
            Envelope::Broadcast(p) => &p.data,
        }
    }
}

/// One outbound command: `{"method": ..., "params": ...}`
#[derive(Debug, Clone, Serialize)]
pub struct Command {
    method: Method,
    params: Envelope,
}

impl Command {
    /// Wrap an envelope; the method always matches the envelope shape
    pub fn new(params: Envelope) -> Self {
        Self {
            method: params.method(),
            params,
        }
    }

    /// Command method
    pub fn method(&self) -> Method {
        self.method
    }

    /// Command parameters
    pub fn params(&self) -> &Envelope {
        &self.params
    }
}

/// Outbound request written as a single list element
///
/// Serializes as `{"data": [command, ...]}`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CommandBatch {
    /// Commands in the order of their source records
    pub data: Vec<Command>,
}

impl CommandBatch {
    /// Create an empty batch with room for `capacity` commands
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    /// Append a command
    pub fn push(&mut self, command: Command) {
        self.data.push(command);
    }

    /// Number of commands
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when there is nothing to publish
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Iterate commands in order
    pub fn iter(&self) -> std::slice::Iter<'_, Command> {
        self.data.iter()
    }

    /// Serialize to the wire form
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
