//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (listener, lifecycle, layer stack)
//!     → request id / body limit / service name
//!     → middleware/logging.rs (inbound record, capture/request.rs)
//!     → middleware/logging.rs (outbound tee, capture/response.rs)
//!     → routed handler
//!     → Send to client
//! ```

pub mod capture;
pub mod context;
pub mod middleware;
pub mod server;

pub use context::{RequestContext, ServiceName};
pub use middleware::{log_request, log_response, RequestLogger, ResponseLogger};
pub use server::{HttpServer, HttpServerBuilder, RunMode, ServerError};
