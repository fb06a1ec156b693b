//! Batch translator - Scribe log entries to one outbound command batch

use super::parse::MessageParser;
use crate::error::ParseError;
use chrono::{DateTime, Utc};
use scriber_core::{Command, CommandBatch, DropReason, LogEntry, MetricsSink, Mode};
use std::sync::Arc;
use tracing::warn;

/// Output of translating one inbound batch
#[derive(Debug, Default)]
pub struct Translation {
    /// Surviving commands in source order
    pub batch: CommandBatch,
    /// Sum of channel counts over broadcast commands (0 in publish mode)
    pub fanout: u64,
    /// Records dropped as stale
    pub stale: u64,
    /// Records dropped as malformed
    pub invalid: u64,
}

/// Maps log entries to commands, dropping entries that fail to parse
///
/// Translation never fails as a whole. Bad records are client data errors;
/// redelivering the batch would not fix them.
pub struct Translator {
    parser: MessageParser,
    metrics: Arc<dyn MetricsSink>,
}

impl Translator {
    /// Create a translator for `mode` reporting drops to `metrics`
    pub fn new(mode: Mode, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            parser: MessageParser::new(mode),
            metrics,
        }
    }

    /// The deployment mode
    pub fn mode(&self) -> Mode {
        self.parser.mode()
    }

    /// Translate `entries` against the current time
    pub fn translate(&self, entries: &[LogEntry]) -> Translation {
        self.translate_at(entries, Utc::now())
    }

    /// Translate `entries`, checking staleness against `now`
    pub fn translate_at(&self, entries: &[LogEntry], now: DateTime<Utc>) -> Translation {
        let mut out = Translation {
            batch: CommandBatch::with_capacity(entries.len()),
            ..Translation::default()
        };
        let broadcast = self.parser.mode() == Mode::Broadcast;

        for entry in entries {
            match self.parser.parse_at(&entry.message, now) {
                Ok(envelope) => {
                    if broadcast {
                        out.fanout += envelope.channel_count() as u64;
                    }
                    out.batch.push(Command::new(envelope));
                }
                Err(ParseError::Stale(stale)) => {
                    warn!(category = %entry.category, "Dropping stale message: {stale}");
                    out.stale += 1;
                }
                Err(e) => {
                    warn!(
                        category = %entry.category,
                        message = %String::from_utf8_lossy(&entry.message),
                        error = %e,
                        "Failed to parse incoming JSON, dropping message"
                    );
                    out.invalid += 1;
                }
            }
        }

        // One sink call per reason per batch, not per record
        if out.stale > 0 {
            self.metrics.record_dropped(DropReason::StaleTtl, out.stale);
        }
        if out.invalid > 0 {
            self.metrics
                .record_dropped(DropReason::InvalidFormat, out.invalid);
        }

        out
    }
}
