//! Integration tests for the smartnet wire protocol.
//!
//! These tests drive the frame codec, frame buffer and payload codecs
//! together, the way a channel's read path does.

use bytes::{Bytes, BytesMut};
use proptest::prelude::*;
use smartnet::codec::{Codec, MsgPackCodec, RawPayload};
use smartnet::protocol::{
    ByteOrder, CodecKind, FrameBuffer, FrameCodec, Framing, ProtocolMessage, HEADER_FROM,
};
use smartnet::SmartError;

fn smart(order: ByteOrder) -> FrameCodec {
    FrameCodec::new(Framing::Smart, order)
}

fn lift(codec: &FrameCodec, frames: Vec<smartnet::protocol::Frame>) -> Vec<ProtocolMessage> {
    frames
        .into_iter()
        .map(|frame| {
            let mut msg = ProtocolMessage::default();
            codec.read_message(frame, &mut msg).unwrap();
            msg
        })
        .collect()
}

/// Full encode/decode cycle with a MsgPack payload.
#[test]
fn test_envelope_with_msgpack_payload() {
    #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
    struct Login {
        account: String,
        level: u16,
    }

    let login = Login {
        account: "mira".to_string(),
        level: 12,
    };
    let payload = MsgPackCodec::encode(&login).unwrap();
    let msg = ProtocolMessage::new(2001, CodecKind::MsgPack, payload)
        .with_sequence(12345)
        .with_header("trace", "t-1");

    let codec = smart(ByteOrder::Big);
    let wire = codec.encode(&msg).unwrap();

    let mut buffer = FrameBuffer::new(codec);
    let decoded = lift(&codec, buffer.push(&wire).unwrap());
    assert_eq!(decoded.len(), 1);
    assert_eq!(decoded[0], msg);

    let resolved = Codec::resolve(decoded[0].codec, Codec::Raw).unwrap();
    let back: Login = resolved.decode(&decoded[0].payload).unwrap();
    assert_eq!(back, login);
}

/// Several frames arriving in one read.
#[test]
fn test_multiple_frames_sequence() {
    let codec = smart(ByteOrder::Little);
    let mut all = BytesMut::new();
    for i in 1..=5 {
        let msg = ProtocolMessage::new(
            1000 + i,
            CodecKind::Json,
            Bytes::from(format!("{{\"n\":{}}}", i)),
        )
        .with_sequence(i * 100);
        all.extend_from_slice(&codec.encode(&msg).unwrap());
    }

    let mut buffer = FrameBuffer::new(codec);
    let messages = lift(&codec, buffer.push(&all).unwrap());
    assert_eq!(messages.len(), 5);
    for (i, msg) in messages.iter().enumerate() {
        let i = i as i32 + 1;
        assert_eq!(msg.route, 1000 + i);
        assert_eq!(msg.sequence, i * 100);
        let value: serde_json::Value = Codec::Json.decode(&msg.payload).unwrap();
        assert_eq!(value["n"], i);
    }
    assert!(buffer.is_empty());
}

/// Byte-at-a-time delivery never yields a partial frame.
#[test]
fn test_fragmented_frame_parsing() {
    let codec = smart(ByteOrder::Big);
    let msg = ProtocolMessage::new(7, CodecKind::Raw, &b"fragmented payload"[..])
        .with_header(HEADER_FROM, "3");
    let wire = codec.encode(&msg).unwrap();

    let mut buffer = FrameBuffer::new(codec);
    for byte in &wire[..wire.len() - 1] {
        assert!(buffer.push(std::slice::from_ref(byte)).unwrap().is_empty());
    }
    let messages = lift(&codec, buffer.push(&wire[wire.len() - 1..]).unwrap());
    assert_eq!(messages, vec![msg]);
}

/// The declared length alone rejects an oversize frame.
#[test]
fn test_oversize_prefix_rejected() {
    let codec = smart(ByteOrder::Little);
    let mut buffer = FrameBuffer::new(codec);
    let mut prefix = BytesMut::new();
    ByteOrder::Little.put_u32(&mut prefix, 100_000);

    match buffer.push(&prefix) {
        Err(SmartError::FrameTooBig { length, max }) => {
            assert_eq!(length, 100_000);
            assert_eq!(max, 65_535);
        }
        other => panic!("expected FrameTooBig, got {:?}", other),
    }
}

/// Route framing carries the body verbatim as a raw payload.
#[test]
fn test_route_framing_raw_payload() {
    let codec = FrameCodec::new(Framing::Route, ByteOrder::Little);
    let msg = ProtocolMessage::new(42, CodecKind::Raw, &b"\x00\x01\x02"[..]);
    let wire = codec.encode(&msg).unwrap();

    let mut buffer = FrameBuffer::new(codec);
    let messages = lift(&codec, buffer.push(&wire).unwrap());
    assert_eq!(messages[0].route, 42);
    assert_eq!(messages[0].codec, CodecKind::ServerDefault);

    let raw: RawPayload = Codec::resolve(messages[0].codec, Codec::Raw)
        .unwrap()
        .decode(&messages[0].payload)
        .unwrap();
    assert_eq!(&raw[..], b"\x00\x01\x02");
}

/// Raw payloads also decode into `serde_bytes` buffers.
#[test]
fn test_raw_payload_into_serde_bytes() {
    let payload = Bytes::from_static(b"opaque");
    let buf: serde_bytes::ByteBuf = Codec::Raw.decode(&payload).unwrap();
    assert_eq!(buf.as_ref(), b"opaque");
}

fn arb_message() -> impl Strategy<Value = ProtocolMessage> {
    (
        any::<i32>(),
        1..i32::MAX,
        prop::collection::hash_map("[a-z]{1,8}", "[ -~]{0,16}", 0..4),
        prop::sample::select(vec![CodecKind::Json, CodecKind::MsgPack, CodecKind::Raw]),
        prop::collection::vec(any::<u8>(), 0..512),
    )
        .prop_map(|(sequence, route, header, codec, payload)| ProtocolMessage {
            sequence,
            route,
            header,
            codec,
            payload: Bytes::from(payload),
        })
}

proptest! {
    /// However a stream of frames is split into reads, the same envelopes come
    /// out, in order, and nothing is left over.
    #[test]
    fn prop_partial_reads_preserve_frames(
        messages in prop::collection::vec(arb_message(), 1..8),
        cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..16),
        big_endian in any::<bool>(),
    ) {
        let order = if big_endian { ByteOrder::Big } else { ByteOrder::Little };
        let codec = smart(order);

        let mut wire = Vec::new();
        for msg in &messages {
            wire.extend_from_slice(&codec.encode(msg).unwrap());
        }

        let mut points: Vec<usize> = cuts.iter().map(|i| i.index(wire.len() + 1)).collect();
        points.push(0);
        points.push(wire.len());
        points.sort_unstable();
        points.dedup();

        let mut buffer = FrameBuffer::new(codec);
        let mut decoded = Vec::new();
        for pair in points.windows(2) {
            let frames = buffer.push(&wire[pair[0]..pair[1]]).unwrap();
            decoded.extend(lift(&codec, frames));
        }

        prop_assert_eq!(decoded, messages);
        prop_assert!(buffer.is_empty());
    }

    /// A truncated frame is never surfaced.
    #[test]
    fn prop_truncated_frame_needs_more_data(msg in arb_message(), cut in any::<prop::sample::Index>()) {
        let codec = smart(ByteOrder::Little);
        let wire = codec.encode(&msg).unwrap();
        let keep = cut.index(wire.len());

        let mut buffer = FrameBuffer::new(codec);
        prop_assert!(buffer.push(&wire[..keep]).unwrap().is_empty());
        prop_assert_eq!(buffer.len(), keep);
    }
}
