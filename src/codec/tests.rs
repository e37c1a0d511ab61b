//! Engine.IO Codec Tests
//!
//! Covers the text packet form, text batch payloads, binary payload records
//! and WebSocket binary frames.

use bytes::{Bytes, BytesMut};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

use crate::codec::{
    binary_encode, decode_binary_frame, decode_binary_payload, decode_packet, decode_payload,
    encode_binary_frame, encode_binary_payload, encode_packet, encode_payload,
};
use crate::protocol::{DecodeError, EnginePacket, PacketData, PacketType};

// ============================================================================
// Text packets
// ============================================================================

#[test]
fn test_text_packet() {
    let packet = EnginePacket::message("hello");
    assert_eq!(encode_packet(&packet), "4hello");
    assert_eq!(decode_packet("4hello").unwrap(), packet);
}

#[test]
fn test_empty_control_packets() {
    assert_eq!(encode_packet(&EnginePacket::noop()), "6");
    assert_eq!(encode_packet(&EnginePacket::close()), "1");
    assert_eq!(decode_packet("2").unwrap(), EnginePacket::ping(""));
    assert_eq!(decode_packet("2probe").unwrap(), EnginePacket::ping("probe"));
}

#[test]
fn test_binary_packet_as_base64() {
    let packet = EnginePacket::binary_message(vec![1u8, 2, 3, 4]);
    assert_eq!(encode_packet(&packet), "b4AQIDBA==");
    assert_eq!(decode_packet("b4AQIDBA==").unwrap(), packet);
}

#[test]
fn test_decode_packet_errors() {
    assert_eq!(decode_packet(""), Err(DecodeError::EmptyPacket));
    assert_eq!(decode_packet("b"), Err(DecodeError::EmptyPacket));
    assert_eq!(decode_packet("9x"), Err(DecodeError::InvalidPacketType(b'9')));
    assert_eq!(decode_packet("b4***"), Err(DecodeError::InvalidBase64));
}

#[test]
fn test_decode_packet_reports_non_ascii_type_byte() {
    // U+0133 is C4 B3 in UTF-8; the reported byte is the lead byte, not a
    // truncated code point
    assert_eq!(decode_packet("ĳx"), Err(DecodeError::InvalidPacketType(0xC4)));
    assert_eq!(decode_packet("bĳx"), Err(DecodeError::InvalidPacketType(0xC4)));
}

// ============================================================================
// Text batch payloads
// ============================================================================

#[test]
fn test_payload_multiple_packets() {
    let packets = decode_payload("6:4hello2:4x1:2").unwrap();
    assert_eq!(
        packets,
        vec![
            EnginePacket::message("hello"),
            EnginePacket::message("x"),
            EnginePacket::ping(""),
        ]
    );
}

#[test]
fn test_payload_packet_containing_colon() {
    let packets = decode_payload("8:4a:b:c:d").unwrap();
    assert_eq!(packets, vec![EnginePacket::message("a:b:c:d")]);
}

#[test]
fn test_payload_counts_utf16_units() {
    // "é" is one unit, the emoji is a surrogate pair (two units)
    let packet = EnginePacket::message("é😀");
    let encoded = encode_payload(std::slice::from_ref(&packet));
    assert_eq!(encoded, "4:4é😀");
    assert_eq!(decode_payload(&encoded).unwrap(), vec![packet]);
}

#[test]
fn test_payload_length_splitting_surrogate_pair() {
    // Length ends in the middle of the emoji
    assert_eq!(decode_payload("3:4é😀"), Err(DecodeError::LengthMismatch));
}

#[test]
fn test_payload_framing_errors() {
    assert_eq!(decode_payload("4hello"), Err(DecodeError::InvalidLength));
    assert_eq!(decode_payload(":4hello"), Err(DecodeError::InvalidLength));
    assert_eq!(decode_payload("x:4hello"), Err(DecodeError::InvalidLength));
    assert_eq!(decode_payload("9:4hello"), Err(DecodeError::InsufficientData));
    assert_eq!(decode_payload("0:"), Err(DecodeError::EmptyPacket));
    // A bad second record fails the whole batch
    assert_eq!(
        decode_payload("6:4hello3:9xx"),
        Err(DecodeError::InvalidPacketType(b'9'))
    );
}

#[test]
fn test_empty_payload() {
    assert_eq!(decode_payload("").unwrap(), Vec::<EnginePacket>::new());
}

#[test]
fn test_payload_with_base64_packet() {
    let packets = vec![
        EnginePacket::message("a"),
        EnginePacket::binary_message(vec![0xFFu8, 0x00]),
    ];
    let encoded = encode_payload(&packets);
    assert_eq!(encoded, "2:4a6:b4/wA=");
    assert_eq!(decode_payload(&encoded).unwrap(), packets);
}

// ============================================================================
// Binary payload records
// ============================================================================

#[test]
fn test_binary_record_text_packet() {
    let mut buf = BytesMut::new();
    binary_encode(&EnginePacket::message("hello"), &mut buf);
    assert_eq!(
        &buf[..],
        &[0x00, 6, 0xFF, b'4', b'h', b'e', b'l', b'l', b'o'][..]
    );
}

#[test]
fn test_binary_record_binary_packet() {
    let mut buf = BytesMut::new();
    binary_encode(&EnginePacket::binary_message(vec![9u8; 11]), &mut buf);
    assert_eq!(&buf[..4], &[0x01, 1, 2, 0xFF][..]);
    assert_eq!(buf[4], PacketType::Message as u8);
    assert_eq!(&buf[5..], &[9u8; 11][..]);
}

#[test]
fn test_binary_payload_preserves_order() {
    let packets = vec![
        EnginePacket::message("first"),
        EnginePacket::binary_message(vec![1u8, 2, 3]),
        EnginePacket::noop(),
        EnginePacket::message("last"),
    ];
    let encoded = encode_binary_payload(&packets).freeze();
    assert_eq!(decode_binary_payload(&encoded).unwrap(), packets);
}

#[test]
fn test_binary_payload_errors() {
    let bad_marker = Bytes::from_static(&[0x02, 1, 0xFF, b'6']);
    assert!(matches!(
        decode_binary_payload(&bad_marker),
        Err(DecodeError::MalformedPacket(_))
    ));

    let truncated = Bytes::from_static(&[0x00, 5, 0xFF, b'4', b'a']);
    assert_eq!(
        decode_binary_payload(&truncated),
        Err(DecodeError::InsufficientData)
    );

    let no_digits = Bytes::from_static(&[0x00, 0xFF, b'6']);
    assert_eq!(
        decode_binary_payload(&no_digits),
        Err(DecodeError::InvalidLength)
    );

    let bad_digit = Bytes::from_static(&[0x00, 12, 0xFF, b'6']);
    assert_eq!(
        decode_binary_payload(&bad_digit),
        Err(DecodeError::InvalidLength)
    );
}

// ============================================================================
// WebSocket binary frames
// ============================================================================

#[test]
fn test_binary_frame() {
    let packet = EnginePacket::binary_message(vec![7u8, 8]);
    let frame = encode_binary_frame(&packet);
    assert_eq!(&frame[..], &[4, 7, 8][..]);
    assert_eq!(decode_binary_frame(frame).unwrap(), packet);
}

#[test]
fn test_binary_frame_errors() {
    assert_eq!(
        decode_binary_frame(Bytes::new()),
        Err(DecodeError::EmptyPacket)
    );
    assert_eq!(
        decode_binary_frame(Bytes::from_static(&[42, 1])),
        Err(DecodeError::InvalidPacketType(42))
    );
}

// ============================================================================
// Round trips over arbitrary packets
// ============================================================================

fn any_packet_type() -> impl Strategy<Value = PacketType> {
    (0u8..=6).prop_map(|v| PacketType::from_u8(v).unwrap())
}

fn any_packet() -> impl Strategy<Value = EnginePacket> {
    let data = prop_oneof![
        any::<String>().prop_map(PacketData::Text),
        proptest::collection::vec(any::<u8>(), 0..64)
            .prop_map(|v| PacketData::Binary(Bytes::from(v))),
    ];
    (any_packet_type(), data).prop_map(|(t, d)| EnginePacket::new(t, d))
}

proptest! {
    #[test]
    fn prop_text_packet_roundtrip(packet in any_packet()) {
        prop_assert_eq!(decode_packet(&encode_packet(&packet)).unwrap(), packet);
    }

    #[test]
    fn prop_text_payload_roundtrip(packets in proptest::collection::vec(any_packet(), 0..8)) {
        prop_assert_eq!(decode_payload(&encode_payload(&packets)).unwrap(), packets);
    }

    #[test]
    fn prop_binary_payload_roundtrip(packets in proptest::collection::vec(any_packet(), 0..8)) {
        let encoded = encode_binary_payload(&packets).freeze();
        prop_assert_eq!(decode_binary_payload(&encoded).unwrap(), packets);
    }
}
