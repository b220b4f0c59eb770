//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management. Each socket read is
//! appended and the [`FrameCodec`] is drained in a loop, so one read that carries
//! several frames yields all of them, and a trailing partial frame stays
//! buffered for the next read.
//!
//! # Example
//!
//! ```
//! use smartnet::protocol::{CodecKind, FrameBuffer, FrameCodec, ProtocolMessage};
//!
//! let codec = FrameCodec::default();
//! let wire = codec.encode(&ProtocolMessage::new(7, CodecKind::Raw, &b"x"[..])).unwrap();
//!
//! let mut buffer = FrameBuffer::new(codec);
//! assert!(buffer.push(&wire[..5]).unwrap().is_empty());
//! assert_eq!(buffer.push(&wire[5..]).unwrap().len(), 1);
//! ```

use bytes::BytesMut;

use super::frame::Frame;
use super::frame_codec::FrameCodec;
use crate::error::Result;

/// Default initial capacity of the inbound buffer.
pub const DEFAULT_BUFFER_CAPACITY: usize = 64 * 1024;

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Layout used to cut frames.
    codec: FrameCodec,
}

impl FrameBuffer {
    /// Create a new frame buffer with the default capacity.
    pub fn new(codec: FrameCodec) -> Self {
        Self::with_capacity(codec, DEFAULT_BUFFER_CAPACITY)
    }

    /// Create a new frame buffer with a custom initial capacity.
    pub fn with_capacity(codec: FrameCodec, capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            codec,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// # Errors
    ///
    /// Returns the codec's protocol error (oversize or malformed frame). Frames
    /// completed earlier in the same push are discarded: the caller closes the
    /// connection and nothing from that read reaches a handler.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.codec.decode(&mut self.buffer)? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// The codec cutting frames out of this buffer.
    #[inline]
    pub fn codec(&self) -> &FrameCodec {
        &self.codec
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop buffered bytes.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
