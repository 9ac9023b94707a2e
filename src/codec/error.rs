//! Error types for the framing layer.
//!
//! - [`FramingError`]: the byte stream cannot be split into frames. The
//!   connection is terminated because resynchronisation is impossible.
//! - [`FrameDecodeError`]: a complete frame was not valid JSON. The frame is
//!   dropped and decoding resumes at the next delimiter.
//! - [`EofError`]: the stream ended part-way through a frame.

use std::io;

use thiserror::Error;

/// Longest prefix of a rejected frame kept for diagnostics.
const PREVIEW_LIMIT: usize = 64;

/// Framing-level errors occurring during frame boundary detection.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    /// Buffered data exceeds the configured maximum without a delimiter.
    #[error("frame exceeds max length: {size} > {max}")]
    OversizedFrame {
        /// Bytes buffered for the frame.
        size: usize,
        /// Maximum allowed frame size.
        max: usize,
    },

    /// An outbound payload contains the delimiter byte.
    #[error("payload contains the frame delimiter")]
    EmbeddedDelimiter,
}

impl From<FramingError> for io::Error {
    fn from(err: FramingError) -> Self { io::Error::new(io::ErrorKind::InvalidData, err) }
}

/// A complete frame whose payload is not valid JSON.
#[derive(Debug, Error)]
#[error("malformed JSON frame ({len} bytes, starting {preview:?}): {source}")]
pub struct FrameDecodeError {
    len: usize,
    preview: String,
    #[source]
    source: serde_json::Error,
}

impl FrameDecodeError {
    pub(crate) fn new(frame: &[u8], source: serde_json::Error) -> Self {
        let end = frame.len().min(PREVIEW_LIMIT);
        Self {
            len: frame.len(),
            preview: String::from_utf8_lossy(&frame[..end]).into_owned(),
            source,
        }
    }

    /// Length of the rejected frame in bytes.
    #[must_use]
    pub fn len(&self) -> usize { self.len }

    /// Whether the rejected frame was empty.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.len == 0 }

    /// Lossy UTF-8 rendering of the first bytes of the frame.
    #[must_use]
    pub fn preview(&self) -> &str { &self.preview }
}

/// End-of-stream conditions.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum EofError {
    /// The stream ended with an unterminated frame in the buffer.
    #[error("premature EOF: {bytes_received} bytes of an unterminated frame received")]
    MidFrame {
        /// Bytes received since the last delimiter.
        bytes_received: usize,
    },
}
