//! Request-scoped context carried into access-log records.

use std::fmt;
use std::sync::Arc;

use axum::http::{Extensions, HeaderMap};

/// Header holding the per-request correlation id.
pub const X_REQUEST_ID: &str = "x-request-id";

const DEFAULT_SERVICE_NAME: &str = "httpserver";

/// Name of the service, attached to every request as an extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceName(Arc<str>);

impl ServiceName {
    /// An empty name falls back to `httpserver`.
    pub fn new(name: &str) -> Self {
        if name.is_empty() {
            Self(Arc::from(DEFAULT_SERVICE_NAME))
        } else {
            Self(Arc::from(name))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ServiceName {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE_NAME)
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Correlation data read from a request head.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub request_id: Option<String>,
    pub service: String,
}

impl RequestContext {
    pub fn from_head(headers: &HeaderMap, extensions: &Extensions) -> Self {
        let request_id = headers
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let service = extensions
            .get::<ServiceName>()
            .cloned()
            .unwrap_or_default()
            .to_string();
        Self {
            request_id,
            service,
        }
    }
}
