//! Shared utilities for integration tests.

use std::time::Duration;

use axum::Router;
use httpserver::config::ServerConfig;
use httpserver::{HttpServer, LogRecord, MemorySink, RunMode};

/// Loopback config with an ephemeral port and quiet route logging.
pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.access_log.route_log = false;
    config.lifecycle.shutdown_timeout_secs = 5;
    config
}

/// Start a server in daemon mode and return it with its base URL.
pub async fn start_server(config: ServerConfig, routes: Router, sink: &MemorySink) -> (HttpServer, String) {
    let server = HttpServer::builder(config)
        .merge(routes)
        .sink(sink.clone())
        .build();
    server.start(RunMode::Daemon).await.unwrap();
    let addr = server.local_addr().expect("bound address");
    (server, format!("http://{}", addr))
}

/// Non-pooled client so every request opens its own connection.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Outbound records are emitted when the server finishes streaming the body,
/// which can land just after the client has read it.
#[allow(dead_code)]
pub async fn wait_for_records(sink: &MemorySink, count: usize) -> Vec<LogRecord> {
    for _ in 0..100 {
        if sink.len() >= count {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let records = sink.records();
    assert!(
        records.len() >= count,
        "expected {} records, got {}",
        count,
        records.len()
    );
    records
}
