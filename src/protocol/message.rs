//! Decoded envelope carried by smart frames.
//!
//! Body layout (all integers in the channel's byte order):
//!
//! ```text
//! sequence:i32 | route:i32 | codec:u8 | header_count:u16
//! (key_len:u16 | key | value_len:u16 | value) * header_count
//! payload (remaining bytes)
//! ```

use std::collections::HashMap;

use bytes::{BufMut, Bytes, BytesMut};
use serde::Deserialize;

use super::wire_format::ByteOrder;
use crate::error::{Result, SmartError};
use crate::pool::Resettable;

/// Route code of the envelope sent to peers while the server is stopping.
pub const ROUTE_CLOSING: i32 = -1;

/// Header key carrying the originating connection id.
pub const HEADER_FROM: &str = "from";

const FIXED_BODY_SIZE: usize = 4 + 4 + 1 + 2;

/// Payload codec declared by an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum CodecKind {
    Json = 0,
    Proto = 1,
    MsgPack = 2,
    FastPb = 3,
    Raw = 4,
    /// Use the channel's default codec.
    #[default]
    ServerDefault = 5,
}

impl TryFrom<u8> for CodecKind {
    type Error = SmartError;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            0 => CodecKind::Json,
            1 => CodecKind::Proto,
            2 => CodecKind::MsgPack,
            3 => CodecKind::FastPb,
            4 => CodecKind::Raw,
            5 => CodecKind::ServerDefault,
            other => {
                return Err(SmartError::Protocol(format!("unknown codec tag {}", other)))
            }
        })
    }
}

/// One decoded protocol message.
///
/// Instances are pooled: the read path checks one out per frame and it goes back
/// to the pool, reset, once the dispatch closure finishes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProtocolMessage {
    /// Caller-assigned correlation id.
    pub sequence: i32,
    /// Handler selector.
    pub route: i32,
    /// Out-of-band metadata.
    pub header: HashMap<String, String>,
    /// How `payload` is encoded.
    pub codec: CodecKind,
    /// Encoded payload.
    pub payload: Bytes,
}

impl Resettable for ProtocolMessage {
    fn reset(&mut self) {
        self.sequence = 0;
        self.route = 0;
        self.header.clear();
        self.codec = CodecKind::default();
        self.payload = Bytes::new();
    }
}

impl ProtocolMessage {
    /// Create a message with the given route, codec and payload.
    pub fn new(route: i32, codec: CodecKind, payload: impl Into<Bytes>) -> Self {
        Self {
            sequence: 0,
            route,
            header: HashMap::new(),
            codec,
            payload: payload.into(),
        }
    }

    /// The "server closing" envelope sent to peers during shutdown.
    pub fn closing() -> Self {
        Self::new(ROUTE_CLOSING, CodecKind::Json, Bytes::from_static(b"{}"))
    }

    /// Set the correlation id.
    pub fn with_sequence(mut self, sequence: i32) -> Self {
        self.sequence = sequence;
        self
    }

    /// Add a header entry.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.header.insert(key.into(), value.into());
        self
    }

    /// Size of the encoded envelope body.
    pub fn body_len(&self) -> usize {
        FIXED_BODY_SIZE
            + self
                .header
                .iter()
                .map(|(k, v)| 4 + k.len() + v.len())
                .sum::<usize>()
            + self.payload.len()
    }

    /// Append the envelope body to `out`.
    pub fn encode_body(&self, order: ByteOrder, out: &mut BytesMut) -> Result<()> {
        if self.header.len() > u16::MAX as usize {
            return Err(SmartError::Protocol(format!(
                "too many header entries: {}",
                self.header.len()
            )));
        }
        out.reserve(self.body_len());
        order.put_i32(out, self.sequence);
        order.put_i32(out, self.route);
        out.put_u8(self.codec as u8);
        order.put_u16(out, self.header.len() as u16);
        for (key, value) in &self.header {
            put_str(order, out, key)?;
            put_str(order, out, value)?;
        }
        out.extend_from_slice(&self.payload);
        Ok(())
    }

    /// Populate `self` from an envelope body, replacing every field.
    ///
    /// The payload is a zero-copy slice of `body`.
    pub fn decode_body(&mut self, order: ByteOrder, body: Bytes) -> Result<()> {
        if body.len() < FIXED_BODY_SIZE {
            return Err(SmartError::Protocol(format!(
                "envelope body too short: {} bytes",
                body.len()
            )));
        }
        self.sequence = order.read_i32(&body[0..4]);
        self.route = order.read_i32(&body[4..8]);
        self.codec = CodecKind::try_from(body[8])?;
        let count = order.read_u16(&body[9..11]) as usize;

        self.header.clear();
        let mut pos = FIXED_BODY_SIZE;
        for _ in 0..count {
            let key = read_str(order, &body, &mut pos)?;
            let value = read_str(order, &body, &mut pos)?;
            self.header.insert(key, value);
        }
        self.payload = body.slice(pos..);
        Ok(())
    }
}

fn put_str(order: ByteOrder, out: &mut BytesMut, s: &str) -> Result<()> {
    let len = u16::try_from(s.len())
        .map_err(|_| SmartError::Protocol(format!("header field too long: {}", s.len())))?;
    order.put_u16(out, len);
    out.extend_from_slice(s.as_bytes());
    Ok(())
}

fn read_str(order: ByteOrder, body: &[u8], pos: &mut usize) -> Result<String> {
    let len_end = *pos + 2;
    let len_bytes = body
        .get(*pos..len_end)
        .ok_or_else(|| SmartError::Protocol("truncated header length".into()))?;
    let len = order.read_u16(len_bytes) as usize;
    let raw = body
        .get(len_end..len_end + len)
        .ok_or_else(|| SmartError::Protocol("truncated header field".into()))?;
    let s = std::str::from_utf8(raw)
        .map_err(|e| SmartError::Protocol(format!("header field is not utf-8: {}", e)))?;
    *pos = len_end + len;
    Ok(s.to_owned())
}
