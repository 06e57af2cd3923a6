//! Log sinks.

use std::sync::{Arc, Mutex, PoisonError};

use crate::observability::record::{LogRecord, RecordKind};

/// `tracing` target used for access-log events.
pub const ACCESS_LOG_TARGET: &str = "httpserver::access";

/// Destination for access-log records.
///
/// Called inline on the request path; implementations should not block.
pub trait LogSink: Send + Sync + 'static {
    fn emit(&self, record: &LogRecord);
}

/// Emits each record as one `tracing` event at INFO.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&self, record: &LogRecord) {
        let header = record.headers.as_ref().map(|h| format!("{h:?}"));
        let body = record.body.to_text();
        match &record.kind {
            RecordKind::Inbound {
                method,
                uri,
                remote,
            } => tracing::info!(
                target: ACCESS_LOG_TARGET,
                service = %record.service,
                request_id = record.request_id.as_deref(),
                method = %method,
                uri = %uri,
                remote = %remote,
                header = header.as_deref(),
                body = %body,
                "{}",
                record.message()
            ),
            RecordKind::Outbound { status } => tracing::info!(
                target: ACCESS_LOG_TARGET,
                service = %record.service,
                request_id = record.request_id.as_deref(),
                status = %status,
                header = header.as_deref(),
                body = %body,
                "{}",
                record.message()
            ),
        }
    }
}

/// Keeps records in memory. Clones share the same store.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far.
    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LogSink for MemorySink {
    fn emit(&self, record: &LogRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
    }
}

impl<S: LogSink + ?Sized> LogSink for Arc<S> {
    fn emit(&self, record: &LogRecord) {
        (**self).emit(record)
    }
}
