//! Message parser - one raw payload to one validated envelope
//!
//! Decoding happens in two steps. First the payload must be an object with
//! the channel field(s) of the deployment mode and a `data` field. Then
//! `data` itself is tried as a staleness wrapper:
//!
//! ```json
//! {"channels": ["feed:42"], "data": {"ts": 1700000000, "ttl": 60, "data": {...}}}
//! ```
//!
//! If the wrapper is present with a non-zero `ts` and `ttl` and
//! `ts + ttl` is before now, the message is stale. A `data` blob of any
//! other shape is opaque and forwarded untouched. The wrapper is never
//! unwrapped; the fan-out service receives `data` exactly as sent.

use crate::error::{ParseError, StaleMessage};
use chrono::{DateTime, Utc};
use scriber_core::{BroadcastParams, Envelope, Mode, PublishParams};
use serde::de::{DeserializeOwned, Error as _};
use serde::Deserialize;
use serde_json::value::RawValue;
use serde_json::{Map, Value};
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct WirePublish {
    #[serde(default)]
    channel: String,
    #[serde(default)]
    data: Option<Box<RawValue>>,
}

#[derive(Debug, Deserialize)]
struct WireBroadcast {
    #[serde(default)]
    channels: Vec<String>,
    #[serde(default)]
    data: Option<Box<RawValue>>,
}

/// What the `data` blob turned out to be
#[derive(Debug, PartialEq, Eq)]
enum Payload {
    /// Wrapper with both `ts` and `ttl` set
    Expiring { ts: u32, ttl: u32 },
    /// Wrapper-shaped, but `ts` or `ttl` is zero
    NonExpiring,
    /// Not a wrapper (array, scalar, mistyped fields)
    Opaque,
}

impl Payload {
    fn classify(data: &RawValue) -> Result<Self, ParseError> {
        // serde would happily read `[ts, ttl]` into a struct; only objects are wrappers
        if !data.get().trim_start().starts_with('{') {
            return Ok(Payload::Opaque);
        }
        // Map keeps the last of duplicated keys
        let fields: Map<String, Value> = serde_json::from_str(data.get())?;
        let (Some(ts), Some(ttl)) = (wrapper_field(&fields, "ts"), wrapper_field(&fields, "ttl"))
        else {
            // Mistyped ts/ttl: ordinary application payload
            return Ok(Payload::Opaque);
        };

        if ts == 0 || ttl == 0 {
            Ok(Payload::NonExpiring)
        } else {
            Ok(Payload::Expiring { ts, ttl })
        }
    }
}

/// Absent or null reads as zero; `None` when the field is not a u32
fn wrapper_field(fields: &Map<String, Value>, key: &str) -> Option<u32> {
    match fields.get(key) {
        None | Some(Value::Null) => Some(0),
        Some(value) => value.as_u64().and_then(|n| u32::try_from(n).ok()),
    }
}

/// Parses raw payloads into envelopes of the configured shape
#[derive(Debug, Clone, Copy)]
pub struct MessageParser {
    mode: Mode,
}

impl MessageParser {
    /// Create a parser for `mode`
    pub fn new(mode: Mode) -> Self {
        Self { mode }
    }

    /// The shape this parser accepts
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Parse `payload`, checking staleness against the current time
    pub fn parse(&self, payload: &[u8]) -> Result<Envelope, ParseError> {
        self.parse_at(payload, Utc::now())
    }

    /// Parse `payload`, checking staleness against `now`
    pub fn parse_at(&self, payload: &[u8], now: DateTime<Utc>) -> Result<Envelope, ParseError> {
        let envelope = match self.mode {
            Mode::Publish => decode_publish(payload)?,
            Mode::Broadcast => decode_broadcast(payload)?,
        };

        match Payload::classify(envelope.data())? {
            Payload::Opaque | Payload::NonExpiring => Ok(envelope),
            Payload::Expiring { ts, ttl } => {
                check_expiry(ts, ttl, now)?;
                Ok(envelope)
            }
        }
    }
}

fn decode_publish(payload: &[u8]) -> Result<Envelope, ParseError> {
    let wire: WirePublish = decode_object(payload)?;

    if wire.channel.is_empty() {
        return Err(ParseError::Validation("no channel in message"));
    }
    let data = non_empty(wire.data)?;

    Ok(Envelope::Publish(PublishParams {
        channel: wire.channel,
        data,
    }))
}

fn decode_broadcast(payload: &[u8]) -> Result<Envelope, ParseError> {
    let wire: WireBroadcast = decode_object(payload)?;

    if wire.channels.is_empty() {
        return Err(ParseError::Validation("no channels in message"));
    }
    if wire.channels.iter().any(String::is_empty) {
        return Err(ParseError::Validation("empty channel name in message"));
    }
    let data = non_empty(wire.data)?;

    Ok(Envelope::Broadcast(BroadcastParams {
        channels: wire.channels,
        data,
    }))
}

/// Derived struct impls also accept arrays; envelopes must be objects
fn decode_object<T: DeserializeOwned>(payload: &[u8]) -> Result<T, ParseError> {
    let first = payload.iter().find(|b| !b.is_ascii_whitespace());
    if first != Some(&b'{') {
        return Err(ParseError::Decode(serde_json::Error::custom(
            "message is not a JSON object",
        )));
    }
    Ok(serde_json::from_slice(payload)?)
}

/// `"data": null` deserializes to `None` and is rejected like a missing
/// field, rather than forwarding a literal `null` to subscribers
fn non_empty(data: Option<Box<RawValue>>) -> Result<Box<RawValue>, ParseError> {
    match data {
        Some(data) if !data.get().is_empty() => Ok(data),
        _ => Err(ParseError::Validation("no data payload in message")),
    }
}

fn check_expiry(ts: u32, ttl: u32, now: DateTime<Utc>) -> Result<(), StaleMessage> {
    // u64 so that ts near u32::MAX cannot wrap into the past
    let expiry = u64::from(ts) + u64::from(ttl);
    let now_secs = now.timestamp();

    if now_secs < 0 || expiry >= now_secs as u64 {
        return Ok(());
    }

    let sent_at = DateTime::from_timestamp(i64::from(ts), 0).unwrap_or(DateTime::UNIX_EPOCH);
    let expired_at = DateTime::from_timestamp(expiry as i64, 0).unwrap_or(DateTime::UNIX_EPOCH);
    Err(StaleMessage {
        sent_at,
        ttl: Duration::from_secs(u64::from(ttl)),
        expired_for: (now - expired_at).to_std().unwrap_or_default(),
    })
}
