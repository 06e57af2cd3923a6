//! Access-log middleware.
//!
//! Two independent steps, each optionally including headers:
//! - [`log_request`] captures the inbound body and emits the inbound record
//!   before the rest of the chain runs.
//! - [`log_response`] tees the outbound body and emits the outbound record
//!   once the body has been fully streamed (or dropped).
//!
//! Mount with `axum::middleware::from_fn_with_state`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::Uri,
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use crate::http::capture::{CapturedBody, TeeBody, TruncatedBody};
use crate::http::context::RequestContext;
use crate::observability::{header_fields, status_line, LogRecord, LogSink, RecordKind};

/// State for [`log_request`].
#[derive(Clone)]
pub struct RequestLogger {
    sink: Arc<dyn LogSink>,
    include_headers: bool,
}

impl RequestLogger {
    /// Log inbound requests including their headers.
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self::with_headers(sink, true)
    }

    pub fn without_headers(sink: Arc<dyn LogSink>) -> Self {
        Self::with_headers(sink, false)
    }

    pub fn with_headers(sink: Arc<dyn LogSink>, include_headers: bool) -> Self {
        Self {
            sink,
            include_headers,
        }
    }
}

/// State for [`log_response`].
#[derive(Clone)]
pub struct ResponseLogger {
    sink: Arc<dyn LogSink>,
    include_headers: bool,
}

impl ResponseLogger {
    /// Log outbound responses including their headers.
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self::with_headers(sink, true)
    }

    pub fn without_headers(sink: Arc<dyn LogSink>) -> Self {
        Self::with_headers(sink, false)
    }

    pub fn with_headers(sink: Arc<dyn LogSink>, include_headers: bool) -> Self {
        Self {
            sink,
            include_headers,
        }
    }
}

pub async fn log_request(
    State(logger): State<RequestLogger>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();
    let captured = CapturedBody::capture(body).await;

    let ctx = RequestContext::from_head(&parts.headers, &parts.extensions);
    let remote = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_default();

    logger.sink.emit(&LogRecord {
        timestamp: Utc::now(),
        kind: RecordKind::Inbound {
            method: parts.method.to_string(),
            uri: request_uri(&parts.uri),
            remote,
        },
        service: ctx.service,
        request_id: ctx.request_id,
        headers: logger.include_headers.then(|| header_fields(&parts.headers)),
        body: captured.logged().clone(),
    });

    next.run(Request::from_parts(parts, captured.into_replay()))
        .await
}

pub async fn log_response(
    State(logger): State<ResponseLogger>,
    request: Request,
    next: Next,
) -> Response {
    let ctx = RequestContext::from_head(request.headers(), request.extensions());
    let response = next.run(request).await;

    let status = status_line(response.status());
    let headers = logger
        .include_headers
        .then(|| header_fields(response.headers()));
    let sink = logger.sink;

    let (parts, body) = response.into_parts();
    let body = TeeBody::new(body, move |captured| {
        sink.emit(&LogRecord {
            timestamp: Utc::now(),
            kind: RecordKind::Outbound { status },
            service: ctx.service,
            request_id: ctx.request_id,
            headers,
            body: TruncatedBody::new(&captured),
        });
    });
    Response::from_parts(parts, Body::new(body))
}

/// Path and query, as sent on the request line.
fn request_uri(uri: &Uri) -> String {
    uri.path_and_query()
        .map(|pq| pq.as_str().to_owned())
        .unwrap_or_else(|| "/".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::capture::MAX_LOGGED_BODY;
    use crate::observability::MemorySink;
    use axum::{
        http::{header, StatusCode},
        middleware::from_fn_with_state,
        routing::{get, post},
        Router,
    };
    use bytes::Bytes;
    use futures_util::stream;
    use http_body_util::BodyExt;
    use std::convert::Infallible;
    use tower::ServiceExt;

    fn app(sink: &MemorySink, headers: bool) -> Router {
        let shared: Arc<dyn LogSink> = Arc::new(sink.clone());
        let probe = sink.clone();
        Router::new()
            .route(
                "/x",
                post(move |body: Bytes| async move {
                    // records emitted by the time the handler runs
                    format!("{}:{}", body.len(), probe.len())
                }),
            )
            .route("/missing", get(|| async { StatusCode::NOT_FOUND }))
            .route(
                "/chunks",
                get(|| async {
                    let chunks: Vec<Result<Bytes, Infallible>> = vec![
                        Ok(Bytes::from(vec![b'a'; 500])),
                        Ok(Bytes::from(vec![b'b'; 500])),
                        Ok(Bytes::from(vec![b'c'; 30])),
                    ];
                    Body::from_stream(stream::iter(chunks))
                }),
            )
            .layer(from_fn_with_state(
                ResponseLogger::with_headers(Arc::clone(&shared), headers),
                log_response,
            ))
            .layer(from_fn_with_state(
                RequestLogger::with_headers(shared, headers),
                log_request,
            ))
    }

    async fn send(app: Router, request: Request) -> (StatusCode, Bytes) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body)
    }

    #[tokio::test]
    async fn large_request_truncated_in_log_only() {
        let sink = MemorySink::new();
        let request = Request::builder()
            .method("POST")
            .uri("/x?trace=1")
            .body(Body::from(vec![7u8; 2000]))
            .unwrap();

        let (status, body) = send(app(&sink, true), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_ref(), b"2000:1");

        let records = sink.records();
        assert_eq!(records.len(), 2);
        let inbound = &records[0];
        assert_eq!(
            inbound.kind,
            RecordKind::Inbound {
                method: "POST".into(),
                uri: "/x?trace=1".into(),
                remote: String::new(),
            }
        );
        assert_eq!(inbound.body.len(), MAX_LOGGED_BODY);
        assert_eq!(inbound.service, "httpserver");

        let outbound = &records[1];
        assert_eq!(outbound.status(), Some("200 OK"));
        assert_eq!(outbound.body.to_text(), "2000:1");
    }

    #[tokio::test]
    async fn chunked_response_logged_capped() {
        let sink = MemorySink::new();
        let request = Request::builder().uri("/chunks").body(Body::empty()).unwrap();

        let (_, body) = send(app(&sink, false), request).await;
        assert_eq!(body.len(), 1030);
        assert!(body[..500].iter().all(|b| *b == b'a'));
        assert!(body[500..1000].iter().all(|b| *b == b'b'));
        assert!(body[1000..].iter().all(|b| *b == b'c'));

        let outbound = &sink.records()[1];
        assert_eq!(outbound.body.len(), MAX_LOGGED_BODY);
        assert_eq!(outbound.body.as_bytes().as_ref(), &body[..MAX_LOGGED_BODY]);
    }

    #[tokio::test]
    async fn not_found_status_line() {
        let sink = MemorySink::new();
        let request = Request::builder().uri("/missing").body(Body::empty()).unwrap();

        let (status, _) = send(app(&sink, false), request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(sink.records()[1].status(), Some("404 Not Found"));
    }

    #[tokio::test]
    async fn absent_body_logged_empty() {
        let sink = MemorySink::new();
        let request = Request::builder().uri("/missing").body(Body::empty()).unwrap();

        send(app(&sink, false), request).await;
        let inbound = &sink.records()[0];
        assert!(inbound.is_inbound());
        assert!(inbound.body.is_empty());
        assert_eq!(inbound.body.to_text(), "");
    }

    #[tokio::test]
    async fn header_toggle() {
        let with = MemorySink::new();
        let request = Request::builder()
            .method("POST")
            .uri("/x")
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from("hi"))
            .unwrap();
        send(app(&with, true), request).await;
        let records = with.records();
        let inbound_headers = records[0].headers.as_ref().unwrap();
        assert_eq!(inbound_headers["content-type"], vec!["text/plain"]);
        assert!(records[1].headers.is_some());

        let without = MemorySink::new();
        let request = Request::builder()
            .method("POST")
            .uri("/x")
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from("hi"))
            .unwrap();
        send(app(&without, false), request).await;
        assert!(without.records().iter().all(|r| r.headers.is_none()));
    }

    #[tokio::test]
    async fn failing_request_body_does_not_become_log_error() {
        let sink = MemorySink::new();
        let chunks = vec![
            Ok(Bytes::from_static(b"abc")),
            Err(std::io::Error::other("client went away")),
        ];
        let request = Request::builder()
            .method("POST")
            .uri("/x")
            .body(Body::from_stream(stream::iter(chunks)))
            .unwrap();

        let (status, _) = send(app(&sink, false), request).await;
        // the handler's own extractor rejects the body, the logger does not
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let inbound = sink.records()[0].body.to_text();
        assert!(inbound.starts_with("read request body err: "));
        assert!(inbound.contains("client went away"));
    }
}
