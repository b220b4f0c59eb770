//! Codec module - serialization/deserialization for payloads.
//!
//! This module provides codecs for encoding/decoding envelope payloads:
//!
//! - [`JsonCodec`] - JSON using `serde_json`
//! - [`MsgPackCodec`] - MessagePack using `rmp-serde` (`to_vec_named`)
//! - [`RawCodec`] - Pass-through for raw bytes (zero-copy)
//!
//! # Design
//!
//! Each codec is a marker struct with static methods. [`Codec`] is the runtime
//! selector a channel stores as its default and that an envelope's
//! [`CodecKind`] resolves to. Protobuf kinds are recognized on the wire but
//! have no codec; resolving them fails and the channel is closed.
//!
//! # Example
//!
//! ```
//! use smartnet::codec::Codec;
//! use smartnet::protocol::CodecKind;
//!
//! let codec = Codec::resolve(CodecKind::ServerDefault, Codec::MsgPack).unwrap();
//! assert_eq!(codec, Codec::MsgPack);
//!
//! let bytes = codec.encode(&"hello").unwrap();
//! let mut out = String::new();
//! codec.decode_into(&bytes, &mut out).unwrap();
//! assert_eq!(out, "hello");
//! ```

mod json;
mod msgpack;
mod raw;

pub use json::JsonCodec;
pub use msgpack::MsgPackCodec;
pub use raw::{RawCodec, RawPayload};

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SmartError};
use crate::protocol::CodecKind;

/// Runtime-selected payload codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Codec {
    Json,
    #[serde(alias = "msgpack")]
    MsgPack,
    /// Opaque bytes.
    #[default]
    Raw,
}

impl Codec {
    /// Resolve an envelope's declared codec, falling back to `channel_default`
    /// for [`CodecKind::ServerDefault`].
    pub fn resolve(kind: CodecKind, channel_default: Codec) -> Result<Codec> {
        match kind {
            CodecKind::Json => Ok(Codec::Json),
            CodecKind::MsgPack => Ok(Codec::MsgPack),
            CodecKind::Raw => Ok(Codec::Raw),
            CodecKind::ServerDefault => Ok(channel_default),
            CodecKind::Proto | CodecKind::FastPb => Err(SmartError::Codec(format!(
                "no codec available for {:?}",
                kind
            ))),
        }
    }

    /// Tag written into outbound envelopes encoded with this codec.
    pub fn kind(self) -> CodecKind {
        match self {
            Codec::Json => CodecKind::Json,
            Codec::MsgPack => CodecKind::MsgPack,
            Codec::Raw => CodecKind::Raw,
        }
    }

    /// Encode a typed value.
    ///
    /// The raw codec only carries bytes that are already encoded; use
    /// [`RawCodec::serialize_bytes`] for those.
    pub fn encode<T: Serialize + ?Sized>(self, value: &T) -> Result<Bytes> {
        match self {
            Codec::Json => JsonCodec::encode(value).map(Bytes::from),
            Codec::MsgPack => MsgPackCodec::encode(value).map(Bytes::from),
            Codec::Raw => Err(SmartError::Codec(
                "raw codec cannot encode typed values".into(),
            )),
        }
    }

    /// Decode a payload into a new value.
    pub fn decode<T: DeserializeOwned>(self, bytes: &[u8]) -> Result<T> {
        match self {
            Codec::Json => JsonCodec::decode(bytes),
            Codec::MsgPack => MsgPackCodec::decode(bytes),
            Codec::Raw => RawCodec::decode(bytes),
        }
    }

    /// Decode a payload into an existing (pooled) target.
    ///
    /// Fields are deserialized in place, so strings and vectors keep their
    /// buffers. On error `target` may be partially overwritten.
    pub fn decode_into<T: DeserializeOwned>(self, bytes: &[u8], target: &mut T) -> Result<()> {
        match self {
            Codec::Json => JsonCodec::decode_into(bytes, target),
            Codec::MsgPack => MsgPackCodec::decode_into(bytes, target),
            Codec::Raw => RawCodec::decode_into(bytes, target),
        }
    }
}
