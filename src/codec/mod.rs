//! Engine.IO Packet Codec
//!
//! Provides the framings used by the two transports:
//!
//! - text packets (`4hello`, `b4aGVsbG8=` for binary data)
//! - text batch payloads posted by polling clients (`6:4hello2:2x`)
//! - binary payload records returned to polling clients
//! - WebSocket binary frames (`[type byte][data]`)

mod decode;
mod encode;

#[cfg(test)]
mod tests;

pub use decode::{decode_binary_frame, decode_binary_payload, decode_packet, decode_payload};
pub use encode::{
    binary_encode, encode_binary_frame, encode_binary_payload, encode_packet, encode_payload,
};

/// Binary payload record marker for a text packet
pub const RECORD_TEXT: u8 = 0x00;

/// Binary payload record marker for a binary packet
pub const RECORD_BINARY: u8 = 0x01;

/// Terminates the length digits of a binary payload record
pub const RECORD_LENGTH_END: u8 = 0xFF;

/// Prefix of a binary packet in text form
pub const BASE64_PREFIX: char = 'b';

/// Longest accepted length prefix (in digits)
pub const MAX_LENGTH_DIGITS: usize = 10;

/// Length of a string in UTF-16 code units, the unit browsers count in
#[inline]
pub fn utf16_len(s: &str) -> usize {
    s.chars().map(char::len_utf16).sum()
}
