//! Inbound body capture with replay.

use axum::{body::Body, http::HeaderMap};
use bytes::{Bytes, BytesMut};
use futures_util::stream;
use http_body::{Body as HttpBody, Frame};
use http_body_util::{BodyExt, StreamBody};

use crate::http::capture::truncate::TruncatedBody;

/// A request body that has been read once for inspection.
///
/// Holds the bytes read from the source together with a freshly built body
/// that yields the same frames, so the downstream handler still sees the
/// complete payload.
#[derive(Debug)]
pub struct CapturedBody {
    bytes: Bytes,
    logged: TruncatedBody,
    read_error: Option<String>,
    replay: Body,
}

impl CapturedBody {
    /// Drain `body` into memory and build its replay.
    ///
    /// A body that is already at end of stream is passed through untouched.
    /// If a frame fails to arrive, the logged text becomes
    /// `read request body err: <error>` and the replay yields the bytes read
    /// so far followed by that same error.
    pub async fn capture(mut body: Body) -> Self {
        if body.is_end_stream() {
            return Self {
                bytes: Bytes::new(),
                logged: TruncatedBody::default(),
                read_error: None,
                replay: body,
            };
        }

        let mut buf = BytesMut::new();
        let mut trailers = None;
        let mut failure = None;

        while let Some(frame) = body.frame().await {
            match frame {
                Ok(frame) => match frame.into_data() {
                    Ok(data) => buf.extend_from_slice(&data),
                    Err(frame) => {
                        if let Ok(map) = frame.into_trailers() {
                            trailers = Some(map);
                        }
                    }
                },
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        let bytes = buf.freeze();
        let read_error = failure
            .as_ref()
            .map(|err| format!("read request body err: {err}"));
        let logged = match &read_error {
            Some(message) => TruncatedBody::diagnostic(message.clone()),
            None => TruncatedBody::new(&bytes),
        };

        tracing::trace!(
            captured = bytes.len(),
            failed = read_error.is_some(),
            "request body captured"
        );

        let replay = replay_body(bytes.clone(), trailers, failure);
        Self {
            bytes,
            logged,
            read_error,
            replay,
        }
    }

    /// Every byte read from the source, untruncated.
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// What goes into the log record.
    pub fn logged(&self) -> &TruncatedBody {
        &self.logged
    }

    /// The diagnostic text when the source failed mid-read.
    pub fn read_error(&self) -> Option<&str> {
        self.read_error.as_deref()
    }

    /// Body to hand to the next handler in place of the drained original.
    pub fn into_replay(self) -> Body {
        self.replay
    }
}

fn replay_body(bytes: Bytes, trailers: Option<HeaderMap>, failure: Option<axum::Error>) -> Body {
    if trailers.is_none() && failure.is_none() {
        return Body::from(bytes);
    }

    let mut frames: Vec<Result<Frame<Bytes>, axum::Error>> = Vec::with_capacity(3);
    if !bytes.is_empty() {
        frames.push(Ok(Frame::data(bytes)));
    }
    if let Some(map) = trailers {
        frames.push(Ok(Frame::trailers(map)));
    }
    if let Some(err) = failure {
        frames.push(Err(err));
    }
    Body::new(StreamBody::new(stream::iter(frames)))
}
