//! Protocol module - wire format, framing, and envelope types.
//!
//! This module implements the binary protocol:
//! - Length-prefixed frames in smart (meta + envelope) or route layout
//! - Stateless frame codec that never consumes a partial frame
//! - Frame buffer for accumulating partial reads
//! - Pooled [`ProtocolMessage`] envelopes

mod buffer;
mod frame;
mod frame_buffer;
mod frame_codec;
mod message;
mod wire_format;

pub use buffer::ReadBuffer;
pub use frame::{Frame, FrameHead};
pub use frame_buffer::{FrameBuffer, DEFAULT_BUFFER_CAPACITY};
pub use frame_codec::FrameCodec;
pub use message::{CodecKind, ProtocolMessage, HEADER_FROM, ROUTE_CLOSING};
pub use wire_format::{
    ByteOrder, FrameMeta, Framing, DEFAULT_MAX_FRAME_SIZE, HEAD_SIZE, LENGTH_SIZE, META_SIZE,
    PROTOCOL_ENVELOPE,
};
