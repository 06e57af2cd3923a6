//! Access-log record shape.

use std::collections::BTreeMap;

use axum::http::{HeaderMap, StatusCode};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::http::capture::TruncatedBody;

/// Header snapshot: lowercase name → every value sent under that name.
pub type HeaderFields = BTreeMap<String, Vec<String>>;

/// Phase-specific fields of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum RecordKind {
    Inbound {
        method: String,
        uri: String,
        remote: String,
    },
    Outbound {
        status: String,
    },
}

/// One structured record per request phase.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: RecordKind,
    pub service: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(rename = "header", skip_serializing_if = "Option::is_none")]
    pub headers: Option<HeaderFields>,
    pub body: TruncatedBody,
}

impl LogRecord {
    pub fn message(&self) -> &'static str {
        match self.kind {
            RecordKind::Inbound { .. } => "incoming http request",
            RecordKind::Outbound { .. } => "outgoing http response",
        }
    }

    pub fn is_inbound(&self) -> bool {
        matches!(self.kind, RecordKind::Inbound { .. })
    }

    /// The `"<code> <reason>"` string of an outbound record.
    pub fn status(&self) -> Option<&str> {
        match &self.kind {
            RecordKind::Outbound { status } => Some(status),
            RecordKind::Inbound { .. } => None,
        }
    }
}

/// Render a status as `"<code> <reason>"`. Unregistered codes have an empty reason.
pub fn status_line(status: StatusCode) -> String {
    format!(
        "{} {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or_default()
    )
}

/// Snapshot a header map, keeping repeated headers in arrival order.
pub fn header_fields(headers: &HeaderMap) -> HeaderFields {
    let mut fields = HeaderFields::new();
    for (name, value) in headers {
        fields
            .entry(name.as_str().to_owned())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    fields
}
