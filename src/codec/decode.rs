//! Engine.IO packet decoding

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;

use super::{BASE64_PREFIX, MAX_LENGTH_DIGITS, RECORD_BINARY, RECORD_LENGTH_END, RECORD_TEXT};
use crate::protocol::{DecodeError, EnginePacket, PacketData, PacketType};

/// Decode a single packet in text form
pub fn decode_packet(text: &str) -> Result<EnginePacket, DecodeError> {
    let mut chars = text.chars();
    let first = chars.next().ok_or(DecodeError::EmptyPacket)?;

    if first == BASE64_PREFIX {
        let tag = chars.next().ok_or(DecodeError::EmptyPacket)?;
        let packet_type = packet_type_from_char(tag)?;
        let data = STANDARD
            .decode(chars.as_str())
            .map_err(|_| DecodeError::InvalidBase64)?;
        return Ok(EnginePacket::binary(packet_type, data));
    }

    let packet_type = packet_type_from_char(first)?;
    Ok(EnginePacket::text(packet_type, chars.as_str()))
}

/// Decode a text batch payload of `<len>:<packet>` records
///
/// `len` counts UTF-16 code units. Any framing error fails the whole batch.
pub fn decode_payload(payload: &str) -> Result<Vec<EnginePacket>, DecodeError> {
    let mut packets = Vec::new();
    let mut rest = payload;

    while !rest.is_empty() {
        let colon = rest.find(':').ok_or(DecodeError::InvalidLength)?;
        let len = parse_length(&rest[..colon])?;
        rest = &rest[colon + 1..];

        let end = utf16_offset(rest, len)?;
        packets.push(decode_packet(&rest[..end])?);
        rest = &rest[end..];
    }

    Ok(packets)
}

/// Decode consecutive binary payload records
pub fn decode_binary_payload(payload: &Bytes) -> Result<Vec<EnginePacket>, DecodeError> {
    let mut packets = Vec::new();
    let mut pos = 0;

    while pos < payload.len() {
        let marker = payload[pos];
        if marker != RECORD_TEXT && marker != RECORD_BINARY {
            return Err(DecodeError::MalformedPacket("invalid record marker"));
        }
        pos += 1;

        let mut len: usize = 0;
        let mut digits = 0;
        loop {
            let byte = *payload.get(pos).ok_or(DecodeError::InsufficientData)?;
            pos += 1;
            if byte == RECORD_LENGTH_END {
                break;
            }
            if byte > 9 || digits == MAX_LENGTH_DIGITS {
                return Err(DecodeError::InvalidLength);
            }
            len = len * 10 + byte as usize;
            digits += 1;
        }
        if digits == 0 {
            return Err(DecodeError::InvalidLength);
        }

        if payload.len() - pos < len {
            return Err(DecodeError::InsufficientData);
        }
        let body = payload.slice(pos..pos + len);
        pos += len;

        let packet = if marker == RECORD_TEXT {
            let text = std::str::from_utf8(&body).map_err(|_| DecodeError::InvalidUtf8)?;
            decode_packet(text)?
        } else {
            decode_binary_frame(body)?
        };
        packets.push(packet);
    }

    Ok(packets)
}

/// Decode a WebSocket binary frame: type byte, then data
pub fn decode_binary_frame(frame: Bytes) -> Result<EnginePacket, DecodeError> {
    let tag = *frame.first().ok_or(DecodeError::EmptyPacket)?;
    let packet_type = PacketType::from_u8(tag).ok_or(DecodeError::InvalidPacketType(tag))?;
    Ok(EnginePacket::new(
        packet_type,
        PacketData::Binary(frame.slice(1..)),
    ))
}

#[inline]
fn packet_type_from_char(c: char) -> Result<PacketType, DecodeError> {
    // Report the leading UTF-8 byte of the offending tag
    let mut utf8 = [0u8; 4];
    let lead = c.encode_utf8(&mut utf8).as_bytes()[0];
    PacketType::from_char(c).ok_or(DecodeError::InvalidPacketType(lead))
}

#[inline]
fn parse_length(digits: &str) -> Result<usize, DecodeError> {
    if digits.is_empty()
        || digits.len() > MAX_LENGTH_DIGITS
        || !digits.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(DecodeError::InvalidLength);
    }
    digits.parse().map_err(|_| DecodeError::InvalidLength)
}

/// Byte offset in `s` after `units` UTF-16 code units
fn utf16_offset(s: &str, units: usize) -> Result<usize, DecodeError> {
    let mut counted = 0;
    for (offset, c) in s.char_indices() {
        if counted == units {
            return Ok(offset);
        }
        counted += c.len_utf16();
        if counted > units {
            return Err(DecodeError::LengthMismatch);
        }
    }
    if counted == units {
        Ok(s.len())
    } else {
        Err(DecodeError::InsufficientData)
    }
}
