//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Access-log middleware produces:
//!     → record.rs (one LogRecord per request phase)
//!     → sink.rs (LogSink capability: tracing, or in-memory for embedders/tests)
//!
//! Everything else logs through `tracing` directly;
//! logging.rs installs the subscriber once at process start.
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing, pretty for development
//! - Request ID flows into every access-log record
//! - Emission is fire-and-forget: a sink never fails the request

pub mod logging;
pub mod record;
pub mod sink;

pub use record::{header_fields, status_line, HeaderFields, LogRecord, RecordKind};
pub use sink::{LogSink, MemorySink, TracingSink, ACCESS_LOG_TARGET};
