//! Engine.IO packet encoding

use std::fmt::Write;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::{BufMut, Bytes, BytesMut};

use super::{utf16_len, BASE64_PREFIX, RECORD_BINARY, RECORD_LENGTH_END, RECORD_TEXT};
use crate::protocol::{EnginePacket, PacketData};

/// Encode a packet in text form
pub fn encode_packet(packet: &EnginePacket) -> String {
    match &packet.data {
        PacketData::Text(text) => {
            let mut out = String::with_capacity(text.len() + 1);
            out.push(packet.packet_type.as_char());
            out.push_str(text);
            out
        }
        PacketData::Binary(data) => {
            let mut out = String::with_capacity(data.len() * 4 / 3 + 6);
            out.push(BASE64_PREFIX);
            out.push(packet.packet_type.as_char());
            STANDARD.encode_string(data, &mut out);
            out
        }
    }
}

/// Encode a batch of packets as a text payload of `<len>:<packet>` records
pub fn encode_payload(packets: &[EnginePacket]) -> String {
    let mut out = String::new();
    for packet in packets {
        let encoded = encode_packet(packet);
        let _ = write!(out, "{}:{}", utf16_len(&encoded), encoded);
    }
    out
}

/// Append one binary payload record for `packet` to `buf`
///
/// Record layout: marker byte (text or binary), the decimal digits of the
/// body length as raw byte values 0-9, `0xFF`, then the body. A text body
/// is the UTF-8 text encoding of the packet; a binary body is the packet
/// type byte followed by the raw data.
pub fn binary_encode(packet: &EnginePacket, buf: &mut BytesMut) {
    match &packet.data {
        PacketData::Text(text) => {
            buf.reserve(text.len() + 14);
            buf.put_u8(RECORD_TEXT);
            write_length_digits(buf, text.len() + 1);
            buf.put_u8(RECORD_LENGTH_END);
            buf.put_u8(packet.packet_type.as_char() as u8);
            buf.put_slice(text.as_bytes());
        }
        PacketData::Binary(data) => {
            buf.reserve(data.len() + 14);
            buf.put_u8(RECORD_BINARY);
            write_length_digits(buf, data.len() + 1);
            buf.put_u8(RECORD_LENGTH_END);
            buf.put_u8(packet.packet_type as u8);
            buf.put_slice(data);
        }
    }
}

/// Encode a batch of packets as consecutive binary payload records
pub fn encode_binary_payload(packets: &[EnginePacket]) -> BytesMut {
    let mut buf = BytesMut::new();
    for packet in packets {
        binary_encode(packet, &mut buf);
    }
    buf
}

/// Encode a packet as a WebSocket binary frame: type byte, then data
pub fn encode_binary_frame(packet: &EnginePacket) -> Bytes {
    let data: &[u8] = match &packet.data {
        PacketData::Text(text) => text.as_bytes(),
        PacketData::Binary(data) => data,
    };
    let mut buf = BytesMut::with_capacity(data.len() + 1);
    buf.put_u8(packet.packet_type as u8);
    buf.put_slice(data);
    buf.freeze()
}

#[inline]
fn write_length_digits(buf: &mut BytesMut, len: usize) {
    let digits = len.to_string();
    for d in digits.bytes() {
        buf.put_u8(d - b'0');
    }
}
