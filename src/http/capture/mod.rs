//! Non-destructive body capture.
//!
//! # Data Flow
//! ```text
//! inbound body
//!     → request.rs (drain once, keep bytes, hand on a replay body)
//!     → handler
//!     → response.rs (tee every outbound frame into a local buffer)
//!     → client
//!
//! truncate.rs caps whatever was captured to MAX_LOGGED_BODY bytes at log time.
//! ```
//!
//! # Design Decisions
//! - Capture never changes what the handler reads or what the client receives
//! - Truncation only ever applies to the logged copy
//! - Read failures are recorded as text, not escalated

pub mod request;
pub mod response;
pub mod truncate;

pub use request::CapturedBody;
pub use response::TeeBody;
pub use truncate::{TruncatedBody, MAX_LOGGED_BODY};
