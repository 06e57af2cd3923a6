//! Byte-length cap applied to captured bodies before they are logged.
//!
//! The cap is a raw byte count. A multi-byte UTF-8 sequence straddling the
//! boundary is cut in half; [`TruncatedBody::to_text`] renders the fragment
//! lossily instead of failing.

use bytes::Bytes;
use serde::{Serialize, Serializer};

/// Maximum number of body bytes carried by a single log record.
pub const MAX_LOGGED_BODY: usize = 1024;

/// A view over at most [`MAX_LOGGED_BODY`] leading bytes of a captured body.
///
/// Built with [`Bytes::slice`], so the source buffer is shared rather than
/// copied and is never mutated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TruncatedBody(Bytes);

impl TruncatedBody {
    /// Cap `body` to the logging limit.
    pub fn new(body: &Bytes) -> Self {
        let len = body.len().min(MAX_LOGGED_BODY);
        Self(body.slice(..len))
    }

    /// Wrap a diagnostic message in place of body content.
    pub fn diagnostic(message: impl Into<String>) -> Self {
        Self::new(&Bytes::from(message.into()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.0
    }

    /// Render the fragment as text, replacing invalid sequences.
    pub fn to_text(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }
}

impl Serialize for TruncatedBody {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_text())
    }
}
