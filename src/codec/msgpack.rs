//! MsgPack codec using `rmp-serde`.
//!
//! Always encodes with `to_vec_named`, so structs go over the wire as maps
//! keyed by field name. Peers written in dynamic languages decode those
//! without knowing the Rust field order.
//!
//! # Example
//!
//! ```
//! use smartnet::codec::MsgPackCodec;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Move {
//!     x: i32,
//!     y: i32,
//! }
//!
//! let m = Move { x: 3, y: -1 };
//! let encoded = MsgPackCodec::encode(&m).unwrap();
//! let decoded: Move = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, m);
//! ```

use crate::error::Result;

/// MessagePack codec for structured payloads.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes (struct-as-map).
    #[inline]
    pub fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MsgPack bytes to a value.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }

    /// Decode MsgPack bytes into an existing value, reusing its allocations.
    pub fn decode_into<T: serde::de::DeserializeOwned>(bytes: &[u8], target: &mut T) -> Result<()> {
        let mut de = rmp_serde::Deserializer::new(bytes);
        T::deserialize_in_place(&mut de, target)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Login {
        account: String,
        token: u64,
        relogin: bool,
    }

    #[test]
    fn test_encode_decode_struct() {
        let original = Login {
            account: "p1".to_string(),
            token: 42,
            relogin: true,
        };
        let encoded = MsgPackCodec::encode(&original).unwrap();
        let decoded: Login = MsgPackCodec::decode(&encoded).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_struct_encodes_as_map() {
        let encoded = MsgPackCodec::encode(&Login {
            account: String::new(),
            token: 0,
            relogin: false,
        })
        .unwrap();
        // fixmap with 3 entries, not fixarray (0x93)
        assert_eq!(encoded[0], 0x83);
    }

    #[test]
    fn test_decode_into_overwrites_fields() {
        let encoded = MsgPackCodec::encode(&Login {
            account: "p2".to_string(),
            token: 7,
            relogin: false,
        })
        .unwrap();
        let mut login = Login {
            account: String::from("stale account name"),
            token: 1,
            relogin: true,
        };
        MsgPackCodec::decode_into(&encoded, &mut login).unwrap();
        assert_eq!(login.account, "p2");
        assert_eq!(login.token, 7);
        assert!(!login.relogin);
    }

    #[test]
    fn test_decode_error_on_invalid_data() {
        let result: Result<Login> = MsgPackCodec::decode(b"not valid msgpack");
        assert!(result.is_err());
    }

    #[test]
    fn test_binary_payload() {
        let data: Vec<u8> = vec![1, 2, 3, 4, 5];
        let encoded = MsgPackCodec::encode(&serde_bytes::Bytes::new(&data)).unwrap();
        // bin8
        assert_eq!(encoded[0], 0xc4);
        let decoded: serde_bytes::ByteBuf = MsgPackCodec::decode(&encoded).unwrap();
        assert_eq!(decoded.as_ref(), &data);
    }

    #[test]
    fn test_none_is_nil() {
        let encoded = MsgPackCodec::encode(&None::<i32>).unwrap();
        assert_eq!(encoded, vec![0xc0]);
    }
}
