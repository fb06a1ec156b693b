//! Thrift binary protocol subset for the Scribe service
//!
//! Only what `scribe.Log` needs: message headers (strict and non-strict),
//! structs, lists, strings and i32, plus generic skipping of every other
//! type. Frames carry a 4-byte big-endian length prefix; the functions here
//! operate on frame bodies and [`frame`] adds the prefix.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use scriber_core::{LogEntry, ResultCode};
use thiserror::Error;

/// Name of the only method served
pub const LOG_METHOD: &str = "Log";

/// Length prefix size
pub const FRAME_HEADER_SIZE: usize = 4;

const VERSION_1: u32 = 0x8001_0000;
const VERSION_MASK: u32 = 0xffff_0000;
const TYPE_MASK: u32 = 0x0000_00ff;

/// Nesting depth at which skipping gives up
const MAX_SKIP_DEPTH: usize = 64;

// Message types
const CALL: u8 = 1;
const REPLY: u8 = 2;
const EXCEPTION: u8 = 3;
const ONEWAY: u8 = 4;

// Field types
const T_STOP: u8 = 0;
const T_BOOL: u8 = 2;
const T_BYTE: u8 = 3;
const T_DOUBLE: u8 = 4;
const T_I16: u8 = 6;
const T_I32: u8 = 8;
const T_I64: u8 = 10;
const T_STRING: u8 = 11;
const T_STRUCT: u8 = 12;
const T_MAP: u8 = 13;
const T_SET: u8 = 14;
const T_LIST: u8 = 15;

/// `TApplicationException` type codes
pub mod exception {
    /// Method name not served
    pub const UNKNOWN_METHOD: i32 = 1;
    /// Malformed request
    pub const PROTOCOL_ERROR: i32 = 7;
}

/// Frame decoding failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame ended before the value being read
    #[error("truncated frame: needed {needed} bytes, {remaining} left")]
    Truncated {
        /// Bytes the read required
        needed: usize,
        /// Bytes left in the frame
        remaining: usize,
    },

    /// Strict header with an unsupported version
    #[error("bad protocol version: {0:#010x}")]
    BadVersion(u32),

    /// Message type outside CALL/REPLY/EXCEPTION/ONEWAY, or not valid here
    #[error("unexpected message type: {0}")]
    UnexpectedMessageType(u8),

    /// Negative or implausibly large length
    #[error("invalid size: {0}")]
    InvalidSize(i32),

    /// Unknown field type code
    #[error("invalid field type: {0}")]
    InvalidType(u8),

    /// Nested values deeper than the skip limit
    #[error("value nesting too deep")]
    DepthLimit,

    /// Frame length prefix above the configured limit
    #[error("frame of {size} bytes exceeds limit of {max}")]
    FrameTooLarge {
        /// Announced frame size
        size: usize,
        /// Configured limit
        max: usize,
    },

    /// Reply carried a result code this side does not know
    #[error("unknown result code: {0}")]
    UnknownResultCode(i32),

    /// Server answered with a `TApplicationException`
    #[error("remote exception {kind}: {message}")]
    RemoteException {
        /// Exception type code
        kind: i32,
        /// Message sent by the server
        message: String,
    },
}

/// A decoded inbound call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// `Log(messages)`
    Log {
        /// Sequence id to echo in the reply
        seq_id: i32,
        /// Decoded entries, in wire order
        entries: Vec<LogEntry>,
        /// Sent as ONEWAY; no reply expected
        oneway: bool,
    },
    /// Any other method
    Unknown {
        /// Method name as sent
        name: String,
        /// Sequence id to echo in the exception
        seq_id: i32,
    },
}

/// A decoded reply to a `Log` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Normal result
    Log {
        /// Sequence id of the call
        seq_id: i32,
        /// Result code
        code: ResultCode,
    },
    /// `TApplicationException`
    Exception {
        /// Sequence id of the call
        seq_id: i32,
        /// Exception type code
        kind: i32,
        /// Human-readable message
        message: String,
    },
}

struct MessageHeader {
    name: String,
    kind: u8,
    seq_id: i32,
}

/// Cursor over one frame body
struct Decoder {
    buf: Bytes,
}

impl Decoder {
    fn new(buf: Bytes) -> Self {
        Self { buf }
    }

    fn need(&self, n: usize) -> Result<(), ProtocolError> {
        if self.buf.remaining() < n {
            return Err(ProtocolError::Truncated {
                needed: n,
                remaining: self.buf.remaining(),
            });
        }
        Ok(())
    }

    fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    fn read_i16(&mut self) -> Result<i16, ProtocolError> {
        self.need(2)?;
        Ok(self.buf.get_i16())
    }

    fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        self.need(4)?;
        Ok(self.buf.get_i32())
    }

    fn advance(&mut self, n: usize) -> Result<(), ProtocolError> {
        self.need(n)?;
        self.buf.advance(n);
        Ok(())
    }

    /// Length followed by that many bytes; shares the frame's allocation
    fn read_binary(&mut self) -> Result<Bytes, ProtocolError> {
        let len = self.read_size()?;
        self.need(len)?;
        Ok(self.buf.split_to(len))
    }

    fn read_string(&mut self) -> Result<String, ProtocolError> {
        let raw = self.read_binary()?;
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }

    /// Non-negative i32 size that fits in what is left of the frame
    fn read_size(&mut self) -> Result<usize, ProtocolError> {
        let size = self.read_i32()?;
        if size < 0 || size as usize > self.buf.remaining() {
            return Err(ProtocolError::InvalidSize(size));
        }
        Ok(size as usize)
    }

    fn read_message_header(&mut self) -> Result<MessageHeader, ProtocolError> {
        let first = self.read_i32()?;
        let header = if first < 0 {
            let word = first as u32;
            if word & VERSION_MASK != VERSION_1 {
                return Err(ProtocolError::BadVersion(word));
            }
            let kind = (word & TYPE_MASK) as u8;
            let name = self.read_string()?;
            let seq_id = self.read_i32()?;
            MessageHeader { name, kind, seq_id }
        } else {
            // Non-strict: the first word is the name length
            let len = first as usize;
            self.need(len)?;
            let name = String::from_utf8_lossy(&self.buf.split_to(len)).into_owned();
            let kind = self.read_u8()?;
            let seq_id = self.read_i32()?;
            MessageHeader { name, kind, seq_id }
        };

        match header.kind {
            CALL | REPLY | EXCEPTION | ONEWAY => Ok(header),
            other => Err(ProtocolError::UnexpectedMessageType(other)),
        }
    }

    /// Field header; `None` at the struct's STOP
    fn read_field_header(&mut self) -> Result<Option<(u8, i16)>, ProtocolError> {
        let ty = self.read_u8()?;
        if ty == T_STOP {
            return Ok(None);
        }
        let id = self.read_i16()?;
        Ok(Some((ty, id)))
    }

    fn skip(&mut self, ty: u8, depth: usize) -> Result<(), ProtocolError> {
        if depth > MAX_SKIP_DEPTH {
            return Err(ProtocolError::DepthLimit);
        }
        match ty {
            T_BOOL | T_BYTE => self.advance(1),
            T_I16 => self.advance(2),
            T_I32 => self.advance(4),
            T_DOUBLE | T_I64 => self.advance(8),
            T_STRING => {
                let len = self.read_size()?;
                self.advance(len)
            }
            T_STRUCT => {
                while let Some((field_ty, _)) = self.read_field_header()? {
                    self.skip(field_ty, depth + 1)?;
                }
                Ok(())
            }
            T_MAP => {
                let key_ty = self.read_u8()?;
                let val_ty = self.read_u8()?;
                let size = self.read_size()?;
                for _ in 0..size {
                    self.skip(key_ty, depth + 1)?;
                    self.skip(val_ty, depth + 1)?;
                }
                Ok(())
            }
            T_SET | T_LIST => {
                let elem_ty = self.read_u8()?;
                let size = self.read_size()?;
                for _ in 0..size {
                    self.skip(elem_ty, depth + 1)?;
                }
                Ok(())
            }
            other => Err(ProtocolError::InvalidType(other)),
        }
    }

    fn read_log_entry(&mut self) -> Result<LogEntry, ProtocolError> {
        let mut category = String::new();
        let mut message = Bytes::new();

        while let Some((ty, id)) = self.read_field_header()? {
            match (id, ty) {
                (1, T_STRING) => category = self.read_string()?,
                (2, T_STRING) => message = self.read_binary()?,
                _ => self.skip(ty, 1)?,
            }
        }

        Ok(LogEntry { category, message })
    }

    fn read_log_args(&mut self) -> Result<Vec<LogEntry>, ProtocolError> {
        let mut entries = Vec::new();

        while let Some((ty, id)) = self.read_field_header()? {
            if id != 1 || ty != T_LIST {
                self.skip(ty, 1)?;
                continue;
            }
            let elem_ty = self.read_u8()?;
            // Every element takes at least one byte, so this bounds the allocation
            let size = self.read_size()?;
            if elem_ty != T_STRUCT {
                for _ in 0..size {
                    self.skip(elem_ty, 1)?;
                }
                continue;
            }
            entries.reserve(size);
            for _ in 0..size {
                entries.push(self.read_log_entry()?);
            }
        }

        Ok(entries)
    }
}

/// Decode one inbound frame body
pub fn decode_request(body: Bytes) -> Result<Request, ProtocolError> {
    let mut decoder = Decoder::new(body);
    let header = decoder.read_message_header()?;

    if header.kind != CALL && header.kind != ONEWAY {
        return Err(ProtocolError::UnexpectedMessageType(header.kind));
    }

    if header.name != LOG_METHOD {
        return Ok(Request::Unknown {
            name: header.name,
            seq_id: header.seq_id,
        });
    }

    let entries = decoder.read_log_args()?;
    Ok(Request::Log {
        seq_id: header.seq_id,
        entries,
        oneway: header.kind == ONEWAY,
    })
}

/// Decode the reply to a `Log` call
pub fn decode_reply(body: Bytes) -> Result<Reply, ProtocolError> {
    let mut decoder = Decoder::new(body);
    let header = decoder.read_message_header()?;

    match header.kind {
        REPLY => {
            let mut code = None;
            while let Some((ty, id)) = decoder.read_field_header()? {
                if id == 0 && ty == T_I32 {
                    code = Some(decoder.read_i32()?);
                } else {
                    decoder.skip(ty, 1)?;
                }
            }
            let code = match code {
                Some(0) => ResultCode::Ok,
                Some(1) => ResultCode::TryLater,
                Some(other) => return Err(ProtocolError::UnknownResultCode(other)),
                // A reply without a success field means the server sent nothing usable
                None => return Err(ProtocolError::UnknownResultCode(-1)),
            };
            Ok(Reply::Log {
                seq_id: header.seq_id,
                code,
            })
        }
        EXCEPTION => {
            let mut message = String::new();
            let mut kind = 0;
            while let Some((ty, id)) = decoder.read_field_header()? {
                match (id, ty) {
                    (1, T_STRING) => message = decoder.read_string()?,
                    (2, T_I32) => kind = decoder.read_i32()?,
                    _ => decoder.skip(ty, 1)?,
                }
            }
            Ok(Reply::Exception {
                seq_id: header.seq_id,
                kind,
                message,
            })
        }
        other => Err(ProtocolError::UnexpectedMessageType(other)),
    }
}

fn put_message_header(buf: &mut BytesMut, name: &str, kind: u8, seq_id: i32) {
    buf.put_u32(VERSION_1 | kind as u32);
    put_string(buf, name.as_bytes());
    buf.put_i32(seq_id);
}

fn put_string(buf: &mut BytesMut, value: &[u8]) {
    buf.put_i32(value.len() as i32);
    buf.put_slice(value);
}

fn put_field_header(buf: &mut BytesMut, ty: u8, id: i16) {
    buf.put_u8(ty);
    buf.put_i16(id);
}

/// Prefix `body` with its length
pub fn frame(body: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + body.len());
    buf.put_u32(body.len() as u32);
    buf.put_slice(body);
    buf.freeze()
}

/// Body of a `Log` reply carrying `code`
pub fn encode_log_reply(seq_id: i32, code: ResultCode) -> Bytes {
    let mut buf = BytesMut::with_capacity(32);
    put_message_header(&mut buf, LOG_METHOD, REPLY, seq_id);
    put_field_header(&mut buf, T_I32, 0);
    buf.put_i32(code.as_i32());
    buf.put_u8(T_STOP);
    buf.freeze()
}

/// Body of a `TApplicationException` reply
pub fn encode_exception(name: &str, seq_id: i32, kind: i32, message: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(32 + name.len() + message.len());
    put_message_header(&mut buf, name, EXCEPTION, seq_id);
    put_field_header(&mut buf, T_STRING, 1);
    put_string(&mut buf, message.as_bytes());
    put_field_header(&mut buf, T_I32, 2);
    buf.put_i32(kind);
    buf.put_u8(T_STOP);
    buf.freeze()
}

/// Body of a `Log` call
pub fn encode_log_call(seq_id: i32, entries: &[LogEntry]) -> Bytes {
    let payload: usize = entries
        .iter()
        .map(|e| e.category.len() + e.message.len() + 16)
        .sum();
    let mut buf = BytesMut::with_capacity(32 + payload);

    put_message_header(&mut buf, LOG_METHOD, CALL, seq_id);
    put_field_header(&mut buf, T_LIST, 1);
    buf.put_u8(T_STRUCT);
    buf.put_i32(entries.len() as i32);
    for entry in entries {
        put_field_header(&mut buf, T_STRING, 1);
        put_string(&mut buf, entry.category.as_bytes());
        put_field_header(&mut buf, T_STRING, 2);
        put_string(&mut buf, &entry.message);
        buf.put_u8(T_STOP);
    }
    buf.put_u8(T_STOP);
    buf.freeze()
}
