//! Stateless frame encoder/decoder.
//!
//! [`FrameCodec::decode`] is a pure function of the buffered bytes: it returns
//! `Ok(None)` and leaves the buffer untouched until a complete frame is present,
//! so the next read can append more bytes and retry from the start of the same
//! frame. A length at or above the configured maximum is a protocol violation
//! and the caller must close the connection.
//!
//! # Example
//!
//! ```
//! use smartnet::protocol::{ByteOrder, CodecKind, FrameCodec, Framing, ProtocolMessage};
//! use bytes::BytesMut;
//!
//! let codec = FrameCodec::new(Framing::Smart, ByteOrder::Little);
//! let msg = ProtocolMessage::new(1001, CodecKind::Json, &b"{\"ping\":1}"[..]);
//! let wire = codec.encode(&msg).unwrap();
//!
//! let mut buf = BytesMut::from(&wire[..3]);
//! assert!(codec.decode(&mut buf).unwrap().is_none());
//! assert_eq!(buf.len(), 3);
//!
//! buf.extend_from_slice(&wire[3..]);
//! let frame = codec.decode(&mut buf).unwrap().unwrap();
//! let mut decoded = ProtocolMessage::default();
//! codec.read_message(frame, &mut decoded).unwrap();
//! assert_eq!(decoded, msg);
//! ```

use bytes::{Bytes, BytesMut};

use super::buffer::ReadBuffer;
use super::frame::{Frame, FrameHead};
use super::message::{CodecKind, ProtocolMessage};
use super::wire_format::{
    ByteOrder, FrameMeta, Framing, DEFAULT_MAX_FRAME_SIZE, HEAD_SIZE, LENGTH_SIZE, META_SIZE,
};
use crate::error::{Result, SmartError};

/// Frame layout fixed for the lifetime of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCodec {
    framing: Framing,
    order: ByteOrder,
    max_frame_size: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(Framing::default(), ByteOrder::default())
    }
}

impl FrameCodec {
    /// Create a codec with the default maximum frame size.
    pub fn new(framing: Framing, order: ByteOrder) -> Self {
        Self {
            framing,
            order,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Override the exclusive upper bound on the length field.
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    #[inline]
    pub fn framing(&self) -> Framing {
        self.framing
    }

    #[inline]
    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    #[inline]
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Try to extract one frame from `buf`.
    ///
    /// Returns:
    /// - `Ok(Some(frame))` if a complete frame was consumed
    /// - `Ok(None)` if more data is needed (nothing consumed)
    /// - `Err(...)` on a protocol violation (nothing consumed)
    pub fn decode<B: ReadBuffer + ?Sized>(&self, buf: &mut B) -> Result<Option<Frame>> {
        let length = match buf.peek(LENGTH_SIZE) {
            Some(prefix) => self.order.read_u32(prefix) as usize,
            None => return Ok(None),
        };

        // Reject as soon as the prefix is visible
        if length >= self.max_frame_size {
            return Err(SmartError::FrameTooBig {
                length,
                max: self.max_frame_size,
            });
        }
        if length < META_SIZE {
            return Err(SmartError::Protocol(format!(
                "frame length {} shorter than meta block",
                length
            )));
        }

        if buf.len() < LENGTH_SIZE + length {
            return Ok(None);
        }

        let head = match buf.peek(HEAD_SIZE) {
            Some(raw) => self.decode_head(&raw[LENGTH_SIZE..])?,
            None => return Ok(None),
        };

        buf.skip(HEAD_SIZE);
        let body = buf
            .read_exact(length - META_SIZE)
            .ok_or_else(|| SmartError::Protocol("buffer shrank during decode".into()))?;

        Ok(Some(Frame::new(head, body)))
    }

    fn decode_head(&self, raw: &[u8]) -> Result<FrameHead> {
        match self.framing {
            Framing::Smart => FrameMeta::decode(self.order, raw)
                .map(FrameHead::Meta)
                .ok_or_else(|| SmartError::Protocol("truncated meta block".into())),
            Framing::Route => Ok(FrameHead::Route(self.order.read_i32(raw))),
        }
    }

    /// Lift a decoded frame into `msg`, replacing every field.
    pub fn read_message(&self, frame: Frame, msg: &mut ProtocolMessage) -> Result<()> {
        match frame.head {
            FrameHead::Meta(meta) => {
                if meta.compress != 0 {
                    return Err(SmartError::Protocol(format!(
                        "unsupported compression flag {}",
                        meta.compress
                    )));
                }
                msg.decode_body(self.order, frame.body)
            }
            FrameHead::Route(route) => {
                msg.sequence = 0;
                msg.route = route;
                msg.header.clear();
                msg.codec = CodecKind::ServerDefault;
                msg.payload = frame.body;
                Ok(())
            }
        }
    }

    /// Serialize `msg` into one length-prefixed frame.
    ///
    /// Fails with [`SmartError::FrameTooBig`] rather than emitting a frame the
    /// peer would have to reject.
    pub fn encode(&self, msg: &ProtocolMessage) -> Result<Bytes> {
        let body_len = match self.framing {
            Framing::Smart => msg.body_len(),
            Framing::Route => msg.payload.len(),
        };
        let length = META_SIZE + body_len;
        if length >= self.max_frame_size {
            return Err(SmartError::FrameTooBig {
                length,
                max: self.max_frame_size,
            });
        }

        let mut out = BytesMut::with_capacity(LENGTH_SIZE + length);
        self.order.put_u32(&mut out, length as u32);
        match self.framing {
            Framing::Smart => {
                FrameMeta::ENVELOPE.encode_into(self.order, &mut out);
                msg.encode_body(self.order, &mut out)?;
            }
            Framing::Route => {
                self.order.put_i32(&mut out, msg.route);
                out.extend_from_slice(&msg.payload);
            }
        }
        Ok(out.freeze())
    }
}
