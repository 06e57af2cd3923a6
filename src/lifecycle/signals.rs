//! OS signal handling.
//!
//! # Responsibilities
//! - Register handlers for SIGTERM, SIGINT and SIGQUIT (Ctrl-C off unix)
//! - Translate each received signal into a shutdown request
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Handlers are registered before the observer task is spawned, so a
//!   signal raised right after startup is never missed
//! - The observer exits once the server is Closed

use tokio::task::JoinHandle;

use crate::lifecycle::shutdown::Lifecycle;

/// Install termination handlers and spawn a task that requests shutdown on
/// each received signal.
///
/// Must be called from within a Tokio runtime.
pub fn spawn_signal_observer(lifecycle: Lifecycle) -> std::io::Result<JoinHandle<()>> {
    let mut signals = TerminationSignals::install()?;

    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                name = signals.recv() => {
                    tracing::info!(signal = name, "Shutdown signal received");
                    lifecycle.request_shutdown();
                }
                _ = lifecycle.closed() => break,
            }
        }
        tracing::debug!("signal observer stopped");
    }))
}

#[cfg(unix)]
struct TerminationSignals {
    terminate: tokio::signal::unix::Signal,
    interrupt: tokio::signal::unix::Signal,
    quit: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl TerminationSignals {
    fn install() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            terminate: signal(SignalKind::terminate())?,
            interrupt: signal(SignalKind::interrupt())?,
            quit: signal(SignalKind::quit())?,
        })
    }

    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.terminate.recv() => "SIGTERM",
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.quit.recv() => "SIGQUIT",
        }
    }
}

#[cfg(not(unix))]
struct TerminationSignals;

#[cfg(not(unix))]
impl TerminationSignals {
    fn install() -> std::io::Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> &'static str {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
        "ctrl-c"
    }
}
