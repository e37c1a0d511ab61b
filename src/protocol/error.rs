//! Protocol error types

use std::fmt;

/// Errors that can occur during packet decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Empty packet where a type tag was expected
    EmptyPacket,
    /// Unknown packet type tag
    InvalidPacketType(u8),
    /// Record length prefix is missing or not a number
    InvalidLength,
    /// Record length exceeds the remaining payload
    InsufficientData,
    /// Record length does not fall on a character boundary
    LengthMismatch,
    /// Invalid UTF-8 string
    InvalidUtf8,
    /// Invalid base64 in a text-encoded binary packet
    InvalidBase64,
    /// Invalid JSON in a Socket.IO envelope
    InvalidJson(String),
    /// Malformed packet
    MalformedPacket(&'static str),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyPacket => write!(f, "empty packet"),
            Self::InvalidPacketType(t) => write!(f, "invalid packet type: {}", t),
            Self::InvalidLength => write!(f, "invalid record length"),
            Self::InsufficientData => write!(f, "insufficient data in payload"),
            Self::LengthMismatch => write!(f, "record length does not match payload"),
            Self::InvalidUtf8 => write!(f, "invalid UTF-8 string"),
            Self::InvalidBase64 => write!(f, "invalid base64 data"),
            Self::InvalidJson(msg) => write!(f, "invalid JSON: {}", msg),
            Self::MalformedPacket(msg) => write!(f, "malformed packet: {}", msg),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Errors that can occur during packet encoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// JSON serialization failed
    Json(String),
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(msg) => write!(f, "JSON encoding failed: {}", msg),
        }
    }
}

impl std::error::Error for EncodeError {}

/// Protocol violations reported back to whoever sent the offending request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Decode error
    Decode(DecodeError),
    /// Encode error
    Encode(EncodeError),
    /// Polling POST with a non-text content type
    UnsupportedContentType(String),
    /// Request body exceeds the configured limit
    PayloadTooLarge,
    /// HTTP request on an upgraded WebSocket connection
    UnexpectedRequest,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(e) => write!(f, "decode error: {}", e),
            Self::Encode(e) => write!(f, "encode error: {}", e),
            Self::UnsupportedContentType(ct) => write!(
                f,
                "unsupported request content type for incoming polling request: {}",
                ct
            ),
            Self::PayloadTooLarge => write!(f, "payload too large"),
            Self::UnexpectedRequest => {
                write!(f, "unexpected request on upgraded WebSocket connection")
            }
        }
    }
}

impl std::error::Error for ProtocolError {}

impl From<DecodeError> for ProtocolError {
    fn from(e: DecodeError) -> Self {
        ProtocolError::Decode(e)
    }
}

impl From<EncodeError> for ProtocolError {
    fn from(e: EncodeError) -> Self {
        ProtocolError::Encode(e)
    }
}
