//! Middleware layered onto the server's router.

pub mod logging;

pub use logging::{log_request, log_response, RequestLogger, ResponseLogger};
