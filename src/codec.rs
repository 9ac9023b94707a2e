//! NUL-delimited JSON framing for the QRC wire protocol.
//!
//! Every frame on the wire is UTF-8 JSON text followed by a single `0x00`
//! byte. Frames are concatenated with no other separator and the transport may
//! split or coalesce them arbitrarily, so inbound bytes are buffered until a
//! delimiter arrives.
//!
//! [`NulDelimitedCodec`] plugs into `tokio_util`'s [`FramedRead`] and
//! [`FramedWrite`] and yields raw frame payloads. [`FrameBuffer`] offers the
//! same reassembly for callers that push chunks by hand and want parsed JSON
//! back.
//!
//! # Error Handling
//!
//! A frame that is not valid JSON yields a [`FrameDecodeError`] without
//! disturbing the frames that follow it. A frame that grows beyond the
//! configured maximum without a delimiter is a [`FramingError`]; the stream can
//! no longer be resynchronised safely, so the connection is terminated.
//!
//! [`FramedRead`]: tokio_util::codec::FramedRead
//! [`FramedWrite`]: tokio_util::codec::FramedWrite

use std::io;

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;
use serde_json::Value;
use tokio_util::codec::{Decoder, Encoder};

pub mod error;

pub use error::{EofError, FrameDecodeError, FramingError};

/// Byte terminating every frame.
pub const FRAME_DELIMITER: u8 = 0x00;

/// Minimum accepted maximum frame length in bytes.
pub const MIN_FRAME_LENGTH: usize = 64;

/// Maximum frame length in bytes (16 MiB).
///
/// Frame lengths passed to codec constructors are clamped to at most this
/// value to prevent unbounded buffering of a peer that never sends a delimiter.
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

pub(crate) fn clamp_frame_length(value: usize) -> usize {
    value.clamp(MIN_FRAME_LENGTH, MAX_FRAME_LENGTH)
}

/// Serialize `message` and append the frame delimiter.
///
/// JSON text never contains a raw NUL byte, so no escaping is required.
///
/// # Errors
///
/// Returns the serializer error if `message` cannot be represented as JSON.
///
/// # Examples
///
/// ```
/// use qrc::codec::encode_frame;
/// use serde_json::json;
///
/// let frame = encode_frame(&json!({"method": "NoOp"})).expect("encode");
/// assert_eq!(frame.last(), Some(&0));
/// ```
pub fn encode_frame<T: Serialize + ?Sized>(message: &T) -> Result<Bytes, serde_json::Error> {
    let mut buf = serde_json::to_vec(message)?;
    buf.push(FRAME_DELIMITER);
    Ok(Bytes::from(buf))
}

/// Serialize `message` as a frame payload for [`NulDelimitedCodec`].
///
/// The codec appends the delimiter when the payload is written.
///
/// # Errors
///
/// Returns the serializer error if `message` cannot be represented as JSON.
pub fn encode_payload<T: Serialize + ?Sized>(message: &T) -> Result<Bytes, serde_json::Error> {
    serde_json::to_vec(message).map(Bytes::from)
}

/// Codec splitting a byte stream on [`FRAME_DELIMITER`].
///
/// Decoding yields each frame's payload without its delimiter. Empty frames
/// (two consecutive delimiters) are skipped. Encoding appends the delimiter to
/// the supplied payload.
#[derive(Clone, Debug)]
pub struct NulDelimitedCodec {
    max_frame_length: usize,
    /// Offset already scanned for a delimiter in the current buffer.
    next_index: usize,
}

impl NulDelimitedCodec {
    /// Construct a codec bounded by `max_frame_length` bytes per frame.
    #[must_use]
    pub fn new(max_frame_length: usize) -> Self {
        Self {
            max_frame_length: clamp_frame_length(max_frame_length),
            next_index: 0,
        }
    }

    /// Return the maximum frame length accepted by this codec.
    #[must_use]
    pub fn max_frame_length(&self) -> usize { self.max_frame_length }
}

impl Default for NulDelimitedCodec {
    fn default() -> Self { Self::new(MAX_FRAME_LENGTH) }
}

impl Decoder for NulDelimitedCodec {
    type Item = Bytes;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let scanned = self.next_index.min(src.len());
            let Some(offset) = src[scanned..].iter().position(|b| *b == FRAME_DELIMITER) else {
                if src.len() > self.max_frame_length {
                    return Err(FramingError::OversizedFrame {
                        size: src.len(),
                        max: self.max_frame_length,
                    }
                    .into());
                }
                self.next_index = src.len();
                return Ok(None);
            };

            let end = scanned + offset;
            self.next_index = 0;
            if end > self.max_frame_length {
                return Err(FramingError::OversizedFrame {
                    size: end,
                    max: self.max_frame_length,
                }
                .into());
            }

            let mut frame = src.split_to(end + 1);
            frame.truncate(end);
            if frame.is_empty() {
                continue;
            }
            return Ok(Some(frame.freeze()));
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if !src.is_empty() {
            // The peer is gone; an unterminated tail can never complete.
            let err = EofError::MidFrame {
                bytes_received: src.len(),
            };
            tracing::debug!(error = %err, "discarding partial frame at end of stream");
            src.clear();
            self.next_index = 0;
        }
        Ok(None)
    }
}

impl Encoder<Bytes> for NulDelimitedCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() > self.max_frame_length {
            return Err(FramingError::OversizedFrame {
                size: item.len(),
                max: self.max_frame_length,
            }
            .into());
        }
        if item.contains(&FRAME_DELIMITER) {
            return Err(FramingError::EmbeddedDelimiter.into());
        }
        dst.reserve(item.len() + 1);
        dst.put_slice(&item);
        dst.put_u8(FRAME_DELIMITER);
        Ok(())
    }
}

/// Outcome of decoding one frame: parsed JSON or the reason it was rejected.
pub type Decoded = Result<Value, FrameDecodeError>;

/// Incremental decoder turning arbitrary byte chunks into JSON values.
///
/// Bytes after the last delimiter stay buffered until a later chunk completes
/// the frame.
///
/// # Examples
///
/// ```
/// use qrc::codec::FrameBuffer;
///
/// let mut buffer = FrameBuffer::default();
/// assert!(buffer.feed(b"{\"id\":").expect("feed").is_empty());
/// let frames = buffer.feed(b"1}\0").expect("feed");
/// assert_eq!(frames.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct FrameBuffer {
    codec: NulDelimitedCodec,
    buffer: BytesMut,
}

impl FrameBuffer {
    /// Create a buffer whose frames may not exceed `max_frame_length` bytes.
    #[must_use]
    pub fn new(max_frame_length: usize) -> Self {
        Self {
            codec: NulDelimitedCodec::new(max_frame_length),
            buffer: BytesMut::new(),
        }
    }

    /// Append `chunk` and return every frame it completed, in wire order.
    ///
    /// Malformed frames appear in the output as `Err` entries; frames after
    /// them are still decoded.
    ///
    /// # Errors
    ///
    /// Returns [`FramingError::OversizedFrame`] when buffered data exceeds the
    /// maximum frame length. The buffer is cleared in that case.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Decoded>, FramingError> {
        self.buffer.extend_from_slice(chunk);
        let mut decoded = Vec::new();
        loop {
            match self.codec.decode(&mut self.buffer) {
                Ok(Some(frame)) => decoded.push(parse_frame(&frame)),
                Ok(None) => return Ok(decoded),
                Err(_) => {
                    let size = self.buffer.len();
                    self.reset();
                    return Err(FramingError::OversizedFrame {
                        size,
                        max: self.codec.max_frame_length(),
                    });
                }
            }
        }
    }

    /// Number of bytes waiting for a delimiter.
    #[must_use]
    pub fn pending_len(&self) -> usize { self.buffer.len() }

    /// Discard any partially received frame.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.codec.next_index = 0;
    }
}

/// Parse one frame payload as JSON.
///
/// # Errors
///
/// Returns [`FrameDecodeError`] if the payload is not valid UTF-8 JSON.
pub fn parse_frame(frame: &[u8]) -> Decoded {
    serde_json::from_slice(frame).map_err(|source| FrameDecodeError::new(frame, source))
}
