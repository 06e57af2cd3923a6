//! Shutdown coordination for the server.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

/// Where a server instance is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Built, not yet listening.
    Created,
    /// Accepting connections.
    Running,
    /// No longer accepting; in-flight requests are draining.
    ShuttingDown,
    /// Terminal.
    Closed,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServerState::Created => "created",
            ServerState::Running => "running",
            ServerState::ShuttingDown => "shutting_down",
            ServerState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Coordinator for start and graceful shutdown.
///
/// Cheap to clone; clones observe and drive the same state.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    tx: Arc<watch::Sender<ServerState>>,
}

impl Lifecycle {
    /// Create a coordinator in [`ServerState::Created`].
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ServerState::Created);
        Self { tx: Arc::new(tx) }
    }

    /// Current state.
    pub fn state(&self) -> ServerState {
        *self.tx.borrow()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<ServerState> {
        self.tx.subscribe()
    }

    /// Created → Running.
    ///
    /// Returns the state that blocked the transition otherwise.
    pub fn mark_running(&self) -> Result<(), ServerState> {
        self.transition(|state| match state {
            ServerState::Created => Some(ServerState::Running),
            _ => None,
        })
        .map(|_| ())
    }

    /// Begin shutdown.
    ///
    /// Running → ShuttingDown, or Created → Closed for a server that never
    /// started. Returns `true` only for the call that performed the
    /// transition; every later call is a no-op.
    pub fn request_shutdown(&self) -> bool {
        match self.transition(|state| match state {
            ServerState::Running => Some(ServerState::ShuttingDown),
            ServerState::Created => Some(ServerState::Closed),
            ServerState::ShuttingDown | ServerState::Closed => None,
        }) {
            Ok(ServerState::Running) => {
                tracing::info!("graceful shutdown started");
                true
            }
            Ok(_) => {
                tracing::debug!("shutdown requested before start");
                true
            }
            Err(state) => {
                tracing::debug!(state = %state, "shutdown already requested");
                false
            }
        }
    }

    /// Any state → Closed.
    pub fn mark_closed(&self) {
        self.tx.send_if_modified(|state| {
            if *state == ServerState::Closed {
                false
            } else {
                *state = ServerState::Closed;
                true
            }
        });
    }

    /// Resolves once shutdown has been requested (ShuttingDown or Closed).
    pub async fn shutdown_requested(&self) {
        self.wait_for(|s| matches!(s, ServerState::ShuttingDown | ServerState::Closed))
            .await
    }

    /// Resolves once the server is Closed.
    pub async fn closed(&self) {
        self.wait_for(|s| *s == ServerState::Closed).await
    }

    async fn wait_for(&self, predicate: impl FnMut(&ServerState) -> bool) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot observe a closed channel.
        let _ = rx.wait_for(predicate).await;
    }

    /// Apply `next` atomically. Returns the previous state on success and
    /// the unchanged current state when `next` declines.
    fn transition(
        &self,
        next: impl FnOnce(ServerState) -> Option<ServerState>,
    ) -> Result<ServerState, ServerState> {
        let mut outcome = Err(ServerState::Created);
        self.tx.send_if_modified(|state| {
            let previous = *state;
            match next(previous) {
                Some(to) => {
                    *state = to;
                    outcome = Ok(previous);
                    true
                }
                None => {
                    outcome = Err(previous);
                    false
                }
            }
        });
        outcome
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
