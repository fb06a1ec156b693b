//! Log handler - one inbound Scribe batch in, one result code out
//!
//! ```text
//! [LogEntry] ──► Translator ──► QueueRouter::select ──► Submitter ──► ResultCode
//! ```
//!
//! The handler is shared by every connection; nothing in it is mutated per
//! call except the router's random source and the backend connection.

use crate::emit::{SubmitOutcome, Submitter};
use crate::ingest::Translator;
use crate::metrics::try_record_batch;
use crate::router::QueueRouter;
use scriber_core::{LogEntry, MetricsSink, Mode, QueueBackend, ResultCode};
use std::sync::Arc;
use tracing::trace;

/// Scribe `Log` implementation
pub struct Handler {
    translator: Translator,
    router: QueueRouter,
    submitter: Submitter,
}

impl Handler {
    /// Wire a handler from its collaborators
    pub fn new(
        mode: Mode,
        router: QueueRouter,
        backend: Arc<dyn QueueBackend>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            translator: Translator::new(mode, metrics.clone()),
            router,
            submitter: Submitter::new(mode, backend, metrics),
        }
    }

    /// The deployment mode
    pub fn mode(&self) -> Mode {
        self.translator.mode()
    }

    /// The backend batches are written to
    pub fn backend(&self) -> &Arc<dyn QueueBackend> {
        self.submitter.backend()
    }

    /// Handle one `Log` call
    pub async fn log(&self, entries: &[LogEntry]) -> ResultCode {
        let outcome = self.process(entries).await;
        let code = ResultCode::from(outcome);
        try_record_batch(entries.len(), code);
        code
    }

    /// Handle one `Log` call, returning the detailed outcome
    pub async fn process(&self, entries: &[LogEntry]) -> SubmitOutcome {
        if entries.is_empty() {
            return SubmitOutcome::Empty;
        }

        let translation = self.translator.translate(entries);
        let queue = self.router.select();
        trace!(
            entries = entries.len(),
            commands = translation.batch.len(),
            queue,
            "Translated batch"
        );

        self.submitter.submit(&translation, queue).await
    }
}
