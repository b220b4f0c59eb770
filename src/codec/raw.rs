//! Raw codec - pass-through for binary payloads.
//!
//! Used when the payload is already serialized or is opaque bytes. Typed
//! handler inputs decode from raw payloads through [`RawPayload`] (or any type
//! whose `Deserialize` accepts a byte string, such as `String`).
//!
//! # Example
//!
//! ```
//! use smartnet::codec::RawCodec;
//! use bytes::Bytes;
//!
//! let bytes = Bytes::from_static(b"zero copy");
//! let passed = RawCodec::serialize_bytes(bytes.clone());
//! assert_eq!(passed.as_ptr(), bytes.as_ptr());
//! ```

use std::fmt;

use bytes::Bytes;
use serde::de::{self, Deserialize, Deserializer, SeqAccess, Visitor};

use crate::error::{Result, SmartError};
use crate::pool::Resettable;

/// Raw codec that passes bytes through without transformation.
pub struct RawCodec;

impl RawCodec {
    /// Serialize raw bytes (copies data into Bytes).
    #[inline]
    pub fn serialize(data: &[u8]) -> Bytes {
        Bytes::copy_from_slice(data)
    }

    /// Serialize Bytes (zero-copy, returns the input).
    #[inline]
    pub fn serialize_bytes(data: Bytes) -> Bytes {
        data
    }

    /// Decode a payload into any type that deserializes from a byte string.
    pub fn decode<T: de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        let deserializer = de::value::BytesDeserializer::<de::value::Error>::new(data);
        T::deserialize(deserializer).map_err(|e| SmartError::Codec(format!("raw decode: {}", e)))
    }

    /// Decode a payload into an existing value.
    pub fn decode_into<T: de::DeserializeOwned>(data: &[u8], target: &mut T) -> Result<()> {
        let deserializer = de::value::BytesDeserializer::<de::value::Error>::new(data);
        T::deserialize_in_place(deserializer, target)
            .map_err(|e| SmartError::Codec(format!("raw decode: {}", e)))
    }
}

/// Opaque payload bytes, usable as a handler input with the raw codec.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawPayload(pub Bytes);

impl Resettable for RawPayload {}

impl std::ops::Deref for RawPayload {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl<'de> Deserialize<'de> for RawPayload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct RawVisitor;

        impl<'de> Visitor<'de> for RawVisitor {
            type Value = RawPayload;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a byte string")
            }

            fn visit_bytes<E: de::Error>(self, v: &[u8]) -> std::result::Result<RawPayload, E> {
                Ok(RawPayload(Bytes::copy_from_slice(v)))
            }

            fn visit_byte_buf<E: de::Error>(
                self,
                v: Vec<u8>,
            ) -> std::result::Result<RawPayload, E> {
                Ok(RawPayload(Bytes::from(v)))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<RawPayload, E> {
                Ok(RawPayload(Bytes::copy_from_slice(v.as_bytes())))
            }

            fn visit_seq<A: SeqAccess<'de>>(
                self,
                mut seq: A,
            ) -> std::result::Result<RawPayload, A::Error> {
                let mut out = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(b) = seq.next_element::<u8>()? {
                    out.push(b);
                }
                Ok(RawPayload(Bytes::from(out)))
            }
        }

        deserializer.deserialize_byte_buf(RawVisitor)
    }

    fn deserialize_in_place<D: Deserializer<'de>>(
        deserializer: D,
        place: &mut Self,
    ) -> std::result::Result<(), D::Error> {
        place.0 = RawPayload::deserialize(deserializer)?.0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_copies() {
        let serialized = RawCodec::serialize(b"hello world");
        assert_eq!(&serialized[..], b"hello world");
    }

    #[test]
    fn test_decode_raw_payload() {
        let all_bytes: Vec<u8> = (0..=255).collect();
        let decoded: RawPayload = RawCodec::decode(&all_bytes).unwrap();
        assert_eq!(&decoded[..], &all_bytes[..]);
    }

    #[test]
    fn test_decode_into_raw_payload() {
        let mut payload = RawPayload(Bytes::from_static(b"old"));
        RawCodec::decode_into(b"new bytes", &mut payload).unwrap();
        assert_eq!(&payload[..], b"new bytes");
    }

    #[test]
    fn test_decode_string() {
        let decoded: String = RawCodec::decode(b"plain text").unwrap();
        assert_eq!(decoded, "plain text");
    }

    #[test]
    fn test_decode_struct_fails() {
        #[derive(serde::Deserialize, Debug)]
        #[allow(dead_code)]
        struct Typed {
            id: u32,
        }
        let result: Result<Typed> = RawCodec::decode(b"\x01\x02");
        assert!(matches!(result, Err(SmartError::Codec(_))));
    }

    #[test]
    fn test_raw_payload_from_json_array() {
        let decoded: RawPayload = serde_json::from_str("[1,2,3]").unwrap();
        assert_eq!(&decoded[..], &[1, 2, 3]);
    }
}
