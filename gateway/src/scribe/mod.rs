//! Scribe transport
//!
//! Scribe clients send `Log(list<LogEntry>)` over framed binary Thrift and
//! expect `OK` or `TRY_LATER` back. This module speaks just enough of that
//! protocol to serve the call; everything else is answered with an exception.

pub mod client;
pub mod protocol;
pub mod server;

pub use client::ScribeClient;
pub use protocol::{ProtocolError, Reply, Request};
pub use server::{DEFAULT_MAX_FRAME_BYTES, ScribeServer, bind_and_serve};
