//! Frame struct with typed accessors.
//!
//! A [`Frame`] is one length-prefixed unit lifted off the wire: its fixed head
//! (meta block or route code) plus the body bytes that followed it.
//! Uses `bytes::Bytes` for zero-copy body sharing.
//!
//! # Example
//!
//! ```
//! use smartnet::protocol::{Frame, FrameHead, FrameMeta};
//! use bytes::Bytes;
//!
//! let frame = Frame::new(FrameHead::Route(1001), Bytes::from_static(b"{}"));
//! assert_eq!(frame.route(), Some(1001));
//! assert_eq!(frame.body(), b"{}");
//!
//! let frame = Frame::new(FrameHead::Meta(FrameMeta::ENVELOPE), Bytes::new());
//! assert_eq!(frame.route(), None);
//! ```

use bytes::Bytes;

use super::wire_format::FrameMeta;

/// Fixed part of a frame following the length prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameHead {
    /// Smart framing: protocol, compress and flags.
    Meta(FrameMeta),
    /// Route framing: the route code.
    Route(i32),
}

/// A complete protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Decoded head.
    pub head: FrameHead,
    /// Body bytes (zero-copy via `bytes::Bytes`).
    pub body: Bytes,
}

impl Frame {
    /// Create a new frame from head and body.
    pub fn new(head: FrameHead, body: Bytes) -> Self {
        Self { head, body }
    }

    /// Get a reference to the body bytes.
    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Value the length field carried for this frame.
    #[inline]
    pub fn declared_len(&self) -> usize {
        super::wire_format::META_SIZE + self.body.len()
    }

    /// Route code, for route-framed frames.
    #[inline]
    pub fn route(&self) -> Option<i32> {
        match self.head {
            FrameHead::Route(route) => Some(route),
            FrameHead::Meta(_) => None,
        }
    }

    /// Meta block, for smart-framed frames.
    #[inline]
    pub fn meta(&self) -> Option<FrameMeta> {
        match self.head {
            FrameHead::Meta(meta) => Some(meta),
            FrameHead::Route(_) => None,
        }
    }
}
