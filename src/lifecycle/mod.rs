//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! State machine (shutdown.rs):
//!     Created → Running → ShuttingDown → Closed
//!     Created → Closed (shutdown before start)
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT/SIGQUIT → request_shutdown() (idempotent)
//! ```
//!
//! # Design Decisions
//! - One watch channel holds the state; every transition goes through it
//! - Only the first shutdown request starts a drain, later ones are no-ops
//! - Shutdown has timeout: in-flight connections dropped after deadline

pub mod shutdown;
pub mod signals;

pub use shutdown::{Lifecycle, ServerState};
pub use signals::spawn_signal_observer;
