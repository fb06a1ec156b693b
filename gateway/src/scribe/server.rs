//! Scribe TCP server
//!
//! One task per connection. Each connection reads length-prefixed frames,
//! dispatches `Log` calls to the [`Handler`] and writes the reply before
//! reading the next frame, so calls on one connection are strictly
//! sequential while connections run concurrently.

use super::protocol::{self, ProtocolError, Request, exception};
use crate::error::{BridgeError, Result};
use crate::handler::Handler;
use bytes::BytesMut;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Default frame size limit (16 MiB)
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Serves the Scribe `Log` call over framed binary Thrift
pub struct ScribeServer {
    handler: Arc<Handler>,
    max_frame_bytes: usize,
}

impl ScribeServer {
    /// Create a server dispatching to `handler`
    pub fn new(handler: Arc<Handler>) -> Self {
        Self {
            handler,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }

    /// Close connections that announce frames larger than `max` bytes
    pub fn max_frame_bytes(mut self, max: usize) -> Self {
        self.max_frame_bytes = max;
        self
    }

    /// Accept connections until `shutdown` fires, then wait for open
    /// connections to finish their current call
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        let tracker = TaskTracker::new();
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "Scribe server listening");

        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            let (stream, peer) = match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    // Per-connection accept errors (e.g. EMFILE) must not stop the server
                    warn!(error = %e, "Failed to accept connection");
                    continue;
                }
            };

            let handler = Arc::clone(&self.handler);
            let token = shutdown.child_token();
            let max_frame_bytes = self.max_frame_bytes;

            tracker.spawn(async move {
                debug!(%peer, "Connection opened");
                match serve_connection(handler, stream, max_frame_bytes, token).await {
                    Ok(()) => debug!(%peer, "Connection closed"),
                    Err(e) => warn!(%peer, error = %e, "Connection closed with error"),
                }
            });
        }

        tracker.close();
        info!(
            open_connections = tracker.len(),
            "Scribe server stopping, draining connections"
        );
        tracker.wait().await;
        Ok(())
    }
}

async fn serve_connection(
    handler: Arc<Handler>,
    mut stream: TcpStream,
    max_frame_bytes: usize,
    shutdown: CancellationToken,
) -> Result<()> {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(error = %e, "Failed to set TCP_NODELAY");
    }

    loop {
        let len = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            len = stream.read_u32() => match len {
                Ok(len) => len as usize,
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(()),
                Err(e) => return Err(e.into()),
            },
        };

        if len > max_frame_bytes {
            return Err(ProtocolError::FrameTooLarge {
                size: len,
                max: max_frame_bytes,
            }
            .into());
        }

        // A peer stalling mid-frame must not hold up shutdown
        let mut body = BytesMut::zeroed(len);
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!(frame_bytes = len, "Dropping partial frame on shutdown");
                return Ok(());
            }
            read = stream.read_exact(&mut body) => {
                read?;
            }
        }

        let reply = match protocol::decode_request(body.freeze()) {
            Ok(Request::Log {
                seq_id,
                entries,
                oneway,
            }) => {
                let code = handler.log(&entries).await;
                if oneway {
                    continue;
                }
                protocol::encode_log_reply(seq_id, code)
            }
            Ok(Request::Unknown { name, seq_id }) => {
                warn!(method = %name, "Unknown Scribe method");
                protocol::encode_exception(
                    &name,
                    seq_id,
                    exception::UNKNOWN_METHOD,
                    &format!("unknown method {name}"),
                )
            }
            Err(e) => {
                error!(error = %e, frame_bytes = len, "Malformed Scribe frame");
                // Best effort; the connection is dropped either way
                let reply = protocol::encode_exception(
                    "",
                    0,
                    exception::PROTOCOL_ERROR,
                    &e.to_string(),
                );
                let _ = stream.write_all(&protocol::frame(&reply)).await;
                return Err(BridgeError::Protocol(e));
            }
        };

        stream.write_all(&protocol::frame(&reply)).await?;
    }
}

/// Bind `addr` and serve until `shutdown` fires
pub async fn bind_and_serve(
    addr: SocketAddr,
    server: ScribeServer,
    shutdown: CancellationToken,
) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    server.serve(listener, shutdown).await
}
