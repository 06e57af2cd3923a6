//! HTTP server setup and lifecycle.
//!
//! # Responsibilities
//! - Create the Axum Router: built-in health route, caller routes, layers
//! - Wire up middleware (tracing, request ID, limits, access logging)
//! - Bind the listener and run the accept loop (one task per connection)
//!   in the foreground or as a background task
//! - Drive graceful shutdown from explicit calls or OS signals, bounded by
//!   a deadline

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Extension},
    http::Request,
    middleware,
    routing::get,
    Router,
};
use hyper::body::Incoming;
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto::Builder,
    service::TowerToHyperService,
};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tower::ServiceExt;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ServerConfig;
use crate::http::context::ServiceName;
use crate::http::middleware::{log_request, log_response, RequestLogger, ResponseLogger};
use crate::lifecycle::{spawn_signal_observer, Lifecycle, ServerState};
use crate::observability::{LogSink, TracingSink};

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("server is already running")]
    AlreadyRunning,

    #[error("server task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// How [`HttpServer::start`] runs the accept loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Resolve only once the listener has stopped.
    Foreground,
    /// Spawn the accept loop and return as soon as the listener is bound.
    Daemon,
}

impl RunMode {
    pub fn from_daemon(daemon: bool) -> Self {
        if daemon {
            RunMode::Daemon
        } else {
            RunMode::Foreground
        }
    }
}

/// Builder for [`HttpServer`].
pub struct HttpServerBuilder {
    config: ServerConfig,
    routes: Router,
    sink: Arc<dyn LogSink>,
}

impl HttpServerBuilder {
    /// Merge caller routes into the server's router.
    pub fn merge(mut self, routes: Router) -> Self {
        self.routes = self.routes.merge(routes);
        self
    }

    /// Replace the access-log sink (default: [`TracingSink`]).
    pub fn sink<S: LogSink>(mut self, sink: S) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    pub fn build(self) -> HttpServer {
        let app = build_router(&self.config, self.routes, self.sink);
        HttpServer {
            inner: Arc::new(Inner {
                config: self.config,
                app,
                lifecycle: Lifecycle::new(),
                local_addr: OnceLock::new(),
                daemon: Mutex::new(None),
            }),
        }
    }
}

struct Inner {
    config: ServerConfig,
    app: Router,
    lifecycle: Lifecycle,
    local_addr: OnceLock<SocketAddr>,
    daemon: Mutex<Option<JoinHandle<Result<(), ServerError>>>>,
}

/// HTTP server with access logging and graceful shutdown.
///
/// Cheap to clone; clones control the same listener.
#[derive(Clone)]
pub struct HttpServer {
    inner: Arc<Inner>,
}

impl HttpServer {
    pub fn builder(config: ServerConfig) -> HttpServerBuilder {
        HttpServerBuilder {
            config,
            routes: Router::new(),
            sink: Arc::new(TracingSink),
        }
    }

    /// A server with only the built-in routes.
    pub fn new(config: ServerConfig) -> Self {
        Self::builder(config).build()
    }

    /// Display name, `httpserver[<service>]`.
    pub fn name(&self) -> String {
        format!("httpserver[{}]", ServiceName::new(&self.inner.config.service.name))
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ServerState {
        self.inner.lifecycle.state()
    }

    /// Address actually bound, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.local_addr.get().copied()
    }

    /// Bind the configured address and start serving.
    ///
    /// Starting a server whose shutdown was already requested is the
    /// "server closed" terminal state and returns `Ok(())`.
    pub async fn start(&self, mode: RunMode) -> Result<(), ServerError> {
        match self.state() {
            ServerState::Created => {}
            ServerState::Running => return Err(ServerError::AlreadyRunning),
            ServerState::ShuttingDown | ServerState::Closed => {
                tracing::info!(server = %self.name(), "http server closed");
                return Ok(());
            }
        }

        let addr = &self.inner.config.listener.bind_address;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        match self.inner.lifecycle.mark_running() {
            Ok(()) => {}
            Err(ServerState::Running) => return Err(ServerError::AlreadyRunning),
            Err(_) => {
                tracing::info!(server = %self.name(), "http server closed");
                return Ok(());
            }
        }
        let _ = self.inner.local_addr.set(local_addr);

        tracing::info!(
            server = %self.name(),
            address = %local_addr,
            mode = ?mode,
            "HTTP server starting"
        );

        let grace = Duration::from_secs(self.inner.config.lifecycle.shutdown_timeout_secs);
        let serving = serve(
            listener,
            self.inner.app.clone(),
            self.inner.lifecycle.clone(),
            grace,
        );

        match mode {
            RunMode::Foreground => serving.await,
            RunMode::Daemon => {
                let handle = tokio::spawn(async move {
                    let result = serving.await;
                    if let Err(e) = &result {
                        tracing::error!(error = %e, "HTTP server stopped with error");
                    }
                    result
                });
                *self
                    .inner
                    .daemon
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(handle);
                Ok(())
            }
        }
    }

    /// Start in the mode selected by `lifecycle.daemon`.
    pub async fn run(&self) -> Result<(), ServerError> {
        self.start(RunMode::from_daemon(self.inner.config.lifecycle.daemon))
            .await
    }

    /// Like [`run`](Self::run), with SIGTERM, SIGINT and SIGQUIT each
    /// requesting shutdown.
    ///
    /// A server that is already running is rejected before any handler is
    /// installed and keeps running.
    pub async fn run_with_signals(&self) -> Result<(), ServerError> {
        if self.state() == ServerState::Running {
            return Err(ServerError::AlreadyRunning);
        }

        spawn_signal_observer(self.inner.lifecycle.clone())?;
        let result = self.run().await;
        if result.is_err() && self.state() == ServerState::Created {
            // never started: close so the observer exits
            self.request_shutdown();
        }
        result
    }

    /// Begin graceful shutdown. Idempotent; returns `true` only for the call
    /// that started the sequence.
    pub fn request_shutdown(&self) -> bool {
        self.inner.lifecycle.request_shutdown()
    }

    /// Wait for the server to close, surfacing any failure of a background
    /// accept loop.
    pub async fn wait(&self) -> Result<(), ServerError> {
        let handle = self
            .inner
            .daemon
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.await??;
        }
        self.inner.lifecycle.closed().await;
        Ok(())
    }

    /// Request shutdown and wait until the server is closed.
    ///
    /// Closing a server that never started, or one already closed, is not
    /// an error.
    pub async fn close(&self) -> Result<(), ServerError> {
        self.request_shutdown();
        self.wait().await
    }
}

/// Build the Axum router with all middleware layers.
///
/// The request timeout wraps the inbound logger so that reading the request
/// body counts against it; the outbound logger sits outside the timeout and
/// records the `408` of a request that ran out of time.
#[allow(deprecated)]
fn build_router(config: &ServerConfig, routes: Router, sink: Arc<dyn LogSink>) -> Router {
    let access = &config.access_log;

    let mut router = Router::new().route("/health", get(health)).merge(routes);

    if access.requests {
        let logger = RequestLogger::with_headers(Arc::clone(&sink), access.request_headers);
        router = router.layer(middleware::from_fn_with_state(logger, log_request));
    }
    router = router.layer(TimeoutLayer::new(Duration::from_secs(
        config.timeouts.request_secs,
    )));
    if access.responses {
        let logger = ResponseLogger::with_headers(sink, access.response_headers);
        router = router.layer(middleware::from_fn_with_state(logger, log_response));
    }

    router = router
        .layer(Extension(ServiceName::new(&config.service.name)))
        .layer(RequestBodyLimitLayer::new(config.limits.max_body_bytes))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

    if access.route_log {
        router = router.layer(TraceLayer::new_for_http());
    }
    router
}

async fn health() -> &'static str {
    "ok"
}

/// Consecutive accept failures tolerated before the listener is reported failed.
const MAX_ACCEPT_FAILURES: u32 = 10;

const ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

/// Run the accept loop until shutdown is requested, then drain in-flight
/// connections. Connections still open when the grace period runs out are
/// aborted.
async fn serve(
    listener: TcpListener,
    app: Router,
    lifecycle: Lifecycle,
    grace: Duration,
) -> Result<(), ServerError> {
    let (drain_tx, drain_rx) = watch::channel(());
    let mut connections = JoinSet::new();
    let mut failures = 0u32;

    let outcome = loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            Some(_) = connections.join_next() => continue,
            _ = lifecycle.shutdown_requested() => break Ok(()),
        };

        let (stream, peer_addr) = match accepted {
            Ok(pair) => {
                failures = 0;
                pair
            }
            Err(e) if is_connection_error(&e) => {
                tracing::debug!(error = %e, "connection dropped during accept");
                continue;
            }
            Err(e) => {
                failures += 1;
                if failures >= MAX_ACCEPT_FAILURES {
                    break Err(e);
                }
                tracing::error!(error = %e, failures, "failed to accept connection");
                if !accept_backoff(&lifecycle).await {
                    break Ok(());
                }
                continue;
            }
        };

        tracing::trace!(peer = %peer_addr, "connection accepted");
        connections.spawn(serve_connection(
            stream,
            peer_addr,
            app.clone(),
            drain_rx.clone(),
        ));
    };

    drop(listener);
    let _ = drain_tx.send(());
    tracing::debug!(in_flight = connections.len(), "draining connections");

    let drained = tokio::time::timeout(grace, async {
        while connections.join_next().await.is_some() {}
    })
    .await
    .is_ok();
    if !drained {
        tracing::warn!(
            grace_secs = grace.as_secs(),
            remaining = connections.len(),
            "shutdown deadline elapsed, aborting in-flight connections"
        );
        connections.shutdown().await;
    }

    let requested = lifecycle.state() != ServerState::Running;
    lifecycle.mark_closed();
    classify(outcome, requested)
}

/// Pause after a failed accept. Returns `false` if shutdown was requested
/// while waiting.
async fn accept_backoff(lifecycle: &Lifecycle) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(ACCEPT_BACKOFF) => true,
        _ = lifecycle.shutdown_requested() => false,
    }
}

/// Serve one connection, switching to graceful close once draining starts.
async fn serve_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    app: Router,
    mut drain: watch::Receiver<()>,
) {
    let service = TowerToHyperService::new(app.map_request(
        move |mut request: Request<Incoming>| {
            request.extensions_mut().insert(ConnectInfo(peer_addr));
            request
        },
    ));

    let builder = Builder::new(TokioExecutor::new());
    let conn = builder.serve_connection_with_upgrades(TokioIo::new(stream), service);
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        _ = drain.changed() => {
            conn.as_mut().graceful_shutdown();
            conn.as_mut().await
        }
    };
    if let Err(e) = result {
        tracing::debug!(peer = %peer_addr, error = %e, "connection closed with error");
    }
}

fn is_connection_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionReset
            | ErrorKind::Interrupted
    )
}

/// Separate the expected end of a listener from genuine failures.
fn classify(outcome: std::io::Result<()>, shutdown_requested: bool) -> Result<(), ServerError> {
    match outcome {
        Ok(()) => {
            tracing::info!("http server closed");
            Ok(())
        }
        Err(e) if shutdown_requested => {
            tracing::info!(error = %e, "http server closed");
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "http server listener failed");
            Err(ServerError::Io(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::MemorySink;
    use axum::{body::Body, http::StatusCode};
    use bytes::Bytes;
    use futures_util::{stream, StreamExt};
    use http_body_util::BodyExt;
    use std::convert::Infallible;

    fn test_config() -> ServerConfig {
        let mut config = ServerConfig::default();
        config.listener.bind_address = "127.0.0.1:0".into();
        config.access_log.route_log = false;
        config
    }

    #[test]
    fn name_includes_service() {
        let mut config = test_config();
        config.service.name = "orders".into();
        assert_eq!(HttpServer::new(config).name(), "httpserver[orders]");
    }

    #[test]
    fn empty_service_name_falls_back() {
        let mut config = test_config();
        config.service.name = String::new();
        assert_eq!(HttpServer::new(config).name(), "httpserver[httpserver]");
    }

    #[tokio::test]
    async fn accept_backoff_cut_short_by_shutdown() {
        let lifecycle = Lifecycle::new();
        lifecycle.mark_running().unwrap();

        let waiting = tokio::time::timeout(Duration::from_millis(100), accept_backoff(&lifecycle));
        assert!(waiting.await.is_err(), "backs off while running");

        lifecycle.request_shutdown();
        let resumed = tokio::time::timeout(Duration::from_millis(100), accept_backoff(&lifecycle))
            .await
            .expect("shutdown ends the back-off");
        assert!(!resumed);
    }

    #[test]
    fn classify_outcomes() {
        assert!(classify(Ok(()), false).is_ok());
        assert!(classify(Err(std::io::Error::other("closed")), true).is_ok());
        assert!(matches!(
            classify(Err(std::io::Error::other("boom")), false),
            Err(ServerError::Io(_))
        ));
    }

    #[tokio::test]
    async fn health_route_logged_with_request_id() {
        let sink = MemorySink::new();
        let mut config = test_config();
        config.service.name = "orders".into();
        let app = build_router(&config, Router::new(), Arc::new(sink.clone()));

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let request_id = response.headers()["x-request-id"].to_str().unwrap().to_owned();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body.as_ref(), b"ok");

        let records = sink.records();
        assert_eq!(records.len(), 2);
        for record in &records {
            assert_eq!(record.service, "orders");
            assert_eq!(record.request_id.as_deref(), Some(request_id.as_str()));
        }
    }

    #[tokio::test]
    async fn access_log_toggles_respected() {
        let sink = MemorySink::new();
        let mut config = test_config();
        config.access_log.requests = false;
        let app = build_router(&config, Router::new(), Arc::new(sink.clone()));

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        response.into_body().collect().await.unwrap();

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert!(!records[0].is_inbound());
    }

    #[tokio::test]
    async fn close_before_start_is_ok() {
        let server = HttpServer::new(test_config());
        server.close().await.unwrap();
        assert_eq!(server.state(), ServerState::Closed);

        // closing again and starting after close are both normal completions
        server.close().await.unwrap();
        server.start(RunMode::Daemon).await.unwrap();
        assert_eq!(server.state(), ServerState::Closed);
        assert!(server.local_addr().is_none());
    }

    #[tokio::test]
    async fn second_start_rejected() {
        let server = HttpServer::new(test_config());
        server.start(RunMode::Daemon).await.unwrap();
        assert!(matches!(
            server.start(RunMode::Daemon).await,
            Err(ServerError::AlreadyRunning)
        ));
        server.close().await.unwrap();
    }

    #[tokio::test]
    async fn signal_run_on_running_server_rejected() {
        let server = HttpServer::new(test_config());
        server.start(RunMode::Daemon).await.unwrap();
        assert!(matches!(
            server.run_with_signals().await,
            Err(ServerError::AlreadyRunning)
        ));
        assert_eq!(server.state(), ServerState::Running);

        let client = TcpStream::connect(server.local_addr().unwrap()).await;
        assert!(client.is_ok(), "listener still accepting");
        server.close().await.unwrap();
    }

    #[tokio::test]
    async fn stalled_request_body_times_out() {
        let sink = MemorySink::new();
        let mut config = test_config();
        config.timeouts.request_secs = 1;
        let app = build_router(&config, Router::new(), Arc::new(sink.clone()));

        let chunks = stream::iter(vec![Ok::<_, Infallible>(Bytes::from_static(b"ab"))])
            .chain(stream::pending());
        let request = Request::builder()
            .method("POST")
            .uri("/health")
            .body(Body::from_stream(chunks))
            .unwrap();

        let response = tokio::time::timeout(Duration::from_secs(5), app.oneshot(request))
            .await
            .expect("request timeout applies while the body is read")
            .unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        response.into_body().collect().await.unwrap();

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status(), Some("408 Request Timeout"));
    }

    #[tokio::test]
    async fn bind_failure_reported() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = test_config();
        config.listener.bind_address = taken.local_addr().unwrap().to_string();

        let server = HttpServer::new(config);
        assert!(matches!(
            server.start(RunMode::Daemon).await,
            Err(ServerError::Bind { .. })
        ));
        assert_eq!(server.state(), ServerState::Created);
    }
}
