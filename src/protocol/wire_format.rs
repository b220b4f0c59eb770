//! Wire format constants and fixed-size frame heads.
//!
//! Every frame starts with a 4-byte length that counts the bytes following it.
//! The next 4 bytes depend on the framing:
//!
//! ```text
//! Smart framing
//! ┌──────────┬──────────┬──────────┬───────┬──────────────┐
//! │ Length   │ Protocol │ Compress │ Flags │ Envelope body│
//! │ 4 bytes  │ 2 bytes  │ 1 byte   │1 byte │ Length - 4   │
//! └──────────┴──────────┴──────────┴───────┴──────────────┘
//!
//! Route framing
//! ┌──────────┬──────────┬──────────────┐
//! │ Length   │ Route    │ Raw body     │
//! │ 4 bytes  │ i32      │ Length - 4   │
//! └──────────┴──────────┴──────────────┘
//! ```
//!
//! Multi-byte integers use the channel's [`ByteOrder`], little endian unless
//! configured otherwise.

use bytes::BufMut;
use serde::Deserialize;

/// Size of the length prefix.
pub const LENGTH_SIZE: usize = 4;

/// Size of the meta (or route) block following the length prefix.
pub const META_SIZE: usize = 4;

/// Full fixed head size: length prefix plus meta block.
pub const HEAD_SIZE: usize = LENGTH_SIZE + META_SIZE;

/// Default maximum value of the length field (exclusive).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 65535;

/// Protocol id carried by envelope frames.
pub const PROTOCOL_ENVELOPE: u16 = 0;

/// Byte order used for every multi-byte integer on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    /// Big endian (network order).
    Big,
    /// Little endian.
    #[default]
    Little,
}

impl ByteOrder {
    /// Read a `u16` from the first two bytes of `buf`.
    #[inline]
    pub fn read_u16(self, buf: &[u8]) -> u16 {
        let raw = [buf[0], buf[1]];
        match self {
            ByteOrder::Big => u16::from_be_bytes(raw),
            ByteOrder::Little => u16::from_le_bytes(raw),
        }
    }

    /// Read a `u32` from the first four bytes of `buf`.
    #[inline]
    pub fn read_u32(self, buf: &[u8]) -> u32 {
        let raw = [buf[0], buf[1], buf[2], buf[3]];
        match self {
            ByteOrder::Big => u32::from_be_bytes(raw),
            ByteOrder::Little => u32::from_le_bytes(raw),
        }
    }

    /// Read an `i32` from the first four bytes of `buf`.
    #[inline]
    pub fn read_i32(self, buf: &[u8]) -> i32 {
        self.read_u32(buf) as i32
    }

    #[inline]
    pub fn put_u16<B: BufMut>(self, out: &mut B, value: u16) {
        match self {
            ByteOrder::Big => out.put_u16(value),
            ByteOrder::Little => out.put_u16_le(value),
        }
    }

    #[inline]
    pub fn put_u32<B: BufMut>(self, out: &mut B, value: u32) {
        match self {
            ByteOrder::Big => out.put_u32(value),
            ByteOrder::Little => out.put_u32_le(value),
        }
    }

    #[inline]
    pub fn put_i32<B: BufMut>(self, out: &mut B, value: i32) {
        match self {
            ByteOrder::Big => out.put_i32(value),
            ByteOrder::Little => out.put_i32_le(value),
        }
    }
}

/// How frames are laid out on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    /// Length + protocol/compress/flags meta + envelope body.
    #[default]
    Smart,
    /// Length + route code + raw body.
    Route,
}

/// Meta block of a smart frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameMeta {
    /// Protocol id (see [`PROTOCOL_ENVELOPE`]).
    pub protocol: u16,
    /// Compression flag. Zero means uncompressed.
    pub compress: u8,
    /// Reserved flags.
    pub flags: u8,
}

impl FrameMeta {
    /// Meta block for an uncompressed envelope frame.
    pub const ENVELOPE: FrameMeta = FrameMeta {
        protocol: PROTOCOL_ENVELOPE,
        compress: 0,
        flags: 0,
    };

    /// Encode into `out` using `order`.
    pub fn encode_into<B: BufMut>(&self, order: ByteOrder, out: &mut B) {
        order.put_u16(out, self.protocol);
        out.put_u8(self.compress);
        out.put_u8(self.flags);
    }

    /// Decode from the first [`META_SIZE`] bytes of `buf`.
    ///
    /// Returns `None` if the buffer is too short.
    pub fn decode(order: ByteOrder, buf: &[u8]) -> Option<Self> {
        if buf.len() < META_SIZE {
            return None;
        }
        Some(Self {
            protocol: order.read_u16(buf),
            compress: buf[2],
            flags: buf[3],
        })
    }
}
