//! Minimal Scribe client
//!
//! Sends `Log` calls over one framed connection. Used by the integration
//! tests and handy for smoke-testing a running bridge.

use super::protocol::{self, ProtocolError, Reply};
use crate::error::{BridgeError, Result};
use bytes::BytesMut;
use scriber_core::{LogEntry, ResultCode};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};

/// One connection to a Scribe server
pub struct ScribeClient {
    stream: TcpStream,
    next_seq_id: i32,
    max_frame_bytes: usize,
}

impl ScribeClient {
    /// Connect to `addr`
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            next_seq_id: 0,
            max_frame_bytes: super::server::DEFAULT_MAX_FRAME_BYTES,
        })
    }

    /// Send `entries` and wait for the result code
    pub async fn log(&mut self, entries: &[LogEntry]) -> Result<ResultCode> {
        self.next_seq_id = self.next_seq_id.wrapping_add(1);
        let body = protocol::encode_log_call(self.next_seq_id, entries);

        match self.call_raw(&body).await? {
            Reply::Log { code, .. } => Ok(code),
            Reply::Exception { kind, message, .. } => Err(BridgeError::Protocol(
                ProtocolError::RemoteException { kind, message },
            )),
        }
    }

    /// Send a pre-encoded call body and read one reply
    pub async fn call_raw(&mut self, body: &[u8]) -> Result<Reply> {
        self.stream.write_all(&protocol::frame(body)).await?;

        let len = self.stream.read_u32().await? as usize;
        if len > self.max_frame_bytes {
            return Err(ProtocolError::FrameTooLarge {
                size: len,
                max: self.max_frame_bytes,
            }
            .into());
        }
        let mut reply = BytesMut::zeroed(len);
        self.stream.read_exact(&mut reply).await?;

        Ok(protocol::decode_reply(reply.freeze())?)
    }
}
