//! Engine.IO Protocol definitions and types
//!
//! Defines the packet types carried by every transport, plus the
//! Socket.IO envelope that rides inside MESSAGE packets.

mod error;
mod socketio;

pub use error::{DecodeError, EncodeError, ProtocolError};
pub use socketio::{SocketIoPacket, SocketIoPacketType};

use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Engine.IO protocol revision spoken by this crate
pub const PROTOCOL_REVISION: u8 = 3;

/// Engine.IO Packet Type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    Open = 0,
    Close = 1,
    Ping = 2,
    Pong = 3,
    Message = 4,
    Upgrade = 5,
    /// Used by the server to release a blocked long-poll without data
    Noop = 6,
}

impl PacketType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(PacketType::Open),
            1 => Some(PacketType::Close),
            2 => Some(PacketType::Ping),
            3 => Some(PacketType::Pong),
            4 => Some(PacketType::Message),
            5 => Some(PacketType::Upgrade),
            6 => Some(PacketType::Noop),
            _ => None,
        }
    }

    /// Parse the ASCII digit used in text encodings
    pub fn from_char(c: char) -> Option<Self> {
        c.to_digit(10).and_then(|d| Self::from_u8(d as u8))
    }

    /// ASCII digit used in text encodings
    pub fn as_char(self) -> char {
        (b'0' + self as u8) as char
    }
}

/// Packet payload: either UTF-8 text or raw bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketData {
    Text(String),
    Binary(Bytes),
}

impl PacketData {
    pub fn is_binary(&self) -> bool {
        matches!(self, PacketData::Binary(_))
    }

    pub fn len(&self) -> usize {
        match self {
            PacketData::Text(s) => s.len(),
            PacketData::Binary(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PacketData {
    fn default() -> Self {
        PacketData::Text(String::new())
    }
}

/// A single Engine.IO packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnginePacket {
    pub packet_type: PacketType,
    pub data: PacketData,
}

impl EnginePacket {
    pub fn new(packet_type: PacketType, data: PacketData) -> Self {
        Self { packet_type, data }
    }

    pub fn text(packet_type: PacketType, text: impl Into<String>) -> Self {
        Self::new(packet_type, PacketData::Text(text.into()))
    }

    pub fn binary(packet_type: PacketType, data: impl Into<Bytes>) -> Self {
        Self::new(packet_type, PacketData::Binary(data.into()))
    }

    /// OPEN packet carrying the JSON handshake
    pub fn open(handshake: &Handshake) -> Result<Self, EncodeError> {
        let json =
            serde_json::to_string(handshake).map_err(|e| EncodeError::Json(e.to_string()))?;
        Ok(Self::text(PacketType::Open, json))
    }

    pub fn close() -> Self {
        Self::text(PacketType::Close, "")
    }

    pub fn ping(data: impl Into<String>) -> Self {
        Self::text(PacketType::Ping, data)
    }

    pub fn pong(data: PacketData) -> Self {
        Self::new(PacketType::Pong, data)
    }

    pub fn noop() -> Self {
        Self::text(PacketType::Noop, "")
    }

    pub fn message(text: impl Into<String>) -> Self {
        Self::text(PacketType::Message, text)
    }

    pub fn binary_message(data: impl Into<Bytes>) -> Self {
        Self::binary(PacketType::Message, data)
    }

    pub fn is_binary(&self) -> bool {
        self.data.is_binary()
    }
}

/// Handshake data sent inside the OPEN packet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    pub upgrades: Vec<String>,
    /// Milliseconds
    pub ping_interval: u64,
    /// Milliseconds
    pub ping_timeout: u64,
}

impl Handshake {
    pub fn new(
        sid: impl Into<String>,
        upgrades: Vec<String>,
        ping_interval: Duration,
        ping_timeout: Duration,
    ) -> Self {
        Self {
            sid: sid.into(),
            upgrades,
            ping_interval: ping_interval.as_millis() as u64,
            ping_timeout: ping_timeout.as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_type_chars() {
        for v in 0..=6u8 {
            let t = PacketType::from_u8(v).unwrap();
            assert_eq!(PacketType::from_char(t.as_char()), Some(t));
        }
        assert_eq!(PacketType::from_u8(7), None);
        assert_eq!(PacketType::from_char('x'), None);
        assert_eq!(PacketType::Noop.as_char(), '6');
    }

    #[test]
    fn test_handshake_json() {
        let handshake = Handshake::new(
            "abc",
            vec![],
            Duration::from_secs(25),
            Duration::from_secs(60),
        );
        let packet = EnginePacket::open(&handshake).unwrap();
        assert_eq!(packet.packet_type, PacketType::Open);
        assert_eq!(
            packet.data,
            PacketData::Text(
                r#"{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":60000}"#
                    .to_string()
            )
        );
    }
}
