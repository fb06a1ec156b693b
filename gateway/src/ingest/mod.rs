//! Ingest side of the bridge
//!
//! Turns raw Scribe log entries into outbound commands.
//!
//! # Architecture
//!
//! ```text
//! [LogEntry] ──► Translator ──► MessageParser (per entry) ──► Translation
//!                    │                                          (batch, fanout)
//!                    └── drop counters ──► MetricsSink
//! ```

mod parse;
mod translate;

pub use parse::MessageParser;
pub use translate::{Translation, Translator};
