//! Outbound body tee.

use std::fmt;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use axum::body::Body;
use bytes::{Bytes, BytesMut};
use http_body::{Body as HttpBody, Frame, SizeHint};

type OnComplete = Box<dyn FnOnce(Bytes) + Send + 'static>;

/// Response body wrapper that mirrors every data frame into a local buffer.
///
/// Frames are forwarded unchanged and in order, and errors from the wrapped
/// body surface exactly as the wrapped body produced them. The buffer is not
/// bounded; callers cap it when formatting. Once the stream ends, or the body
/// is dropped early, the completion callback receives the captured bytes.
/// It runs at most once.
pub struct TeeBody {
    inner: Body,
    buffer: BytesMut,
    on_complete: Option<OnComplete>,
}

impl TeeBody {
    pub fn new<F>(inner: Body, on_complete: F) -> Self
    where
        F: FnOnce(Bytes) + Send + 'static,
    {
        Self {
            inner,
            buffer: BytesMut::new(),
            on_complete: Some(Box::new(on_complete)),
        }
    }

    /// Bytes mirrored so far.
    pub fn captured_len(&self) -> usize {
        self.buffer.len()
    }

    fn finish(&mut self) {
        if let Some(on_complete) = self.on_complete.take() {
            on_complete(std::mem::take(&mut self.buffer).freeze());
        }
    }
}

impl HttpBody for TeeBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = &mut *self;
        match ready!(Pin::new(&mut this.inner).poll_frame(cx)) {
            Some(Ok(frame)) => {
                if let Some(data) = frame.data_ref() {
                    this.buffer.extend_from_slice(data);
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Some(Err(err)) => Poll::Ready(Some(Err(err))),
            None => {
                this.finish();
                Poll::Ready(None)
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for TeeBody {
    fn drop(&mut self) {
        self.finish();
    }
}

impl fmt::Debug for TeeBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TeeBody")
            .field("captured", &self.buffer.len())
            .field("completed", &self.on_complete.is_none())
            .finish()
    }
}
