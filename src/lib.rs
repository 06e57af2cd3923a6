//! HTTP server toolkit: body-capturing access logs and lifecycle management
//! on top of Axum.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;

pub use config::schema::ServerConfig;
pub use http::{HttpServer, RunMode, ServerError};
pub use lifecycle::{Lifecycle, ServerState};
pub use observability::{LogRecord, LogSink, MemorySink, TracingSink};
