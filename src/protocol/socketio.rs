//! Socket.IO envelope
//!
//! Application-level packets travel as the text payload of an Engine.IO
//! MESSAGE packet. Transports never look inside them.
//!
//! Wire form: `<type>[<namespace>,][<ack id>][<json data>]`, where the
//! namespace is omitted for the root namespace `/`.

use std::fmt::Write;

use serde_json::Value;

use super::DecodeError;

pub const ROOT_NAMESPACE: &str = "/";

/// Socket.IO Packet Type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SocketIoPacketType {
    Connect = 0,
    Disconnect = 1,
    Event = 2,
    Ack = 3,
    Error = 4,
    BinaryEvent = 5,
    BinaryAck = 6,
}

impl SocketIoPacketType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(SocketIoPacketType::Connect),
            1 => Some(SocketIoPacketType::Disconnect),
            2 => Some(SocketIoPacketType::Event),
            3 => Some(SocketIoPacketType::Ack),
            4 => Some(SocketIoPacketType::Error),
            5 => Some(SocketIoPacketType::BinaryEvent),
            6 => Some(SocketIoPacketType::BinaryAck),
            _ => None,
        }
    }
}

/// A Socket.IO packet
#[derive(Debug, Clone, PartialEq)]
pub struct SocketIoPacket {
    pub packet_type: SocketIoPacketType,
    pub namespace: String,
    pub id: Option<u64>,
    pub data: Option<Value>,
}

impl SocketIoPacket {
    pub fn new(packet_type: SocketIoPacketType, namespace: impl Into<String>) -> Self {
        Self {
            packet_type,
            namespace: namespace.into(),
            id: None,
            data: None,
        }
    }

    pub fn connect(namespace: impl Into<String>) -> Self {
        Self::new(SocketIoPacketType::Connect, namespace)
    }

    pub fn disconnect(namespace: impl Into<String>) -> Self {
        Self::new(SocketIoPacketType::Disconnect, namespace)
    }

    /// EVENT packet: data is `[name, args...]`
    pub fn event(namespace: impl Into<String>, name: &str, args: Vec<Value>) -> Self {
        let mut data = Vec::with_capacity(args.len() + 1);
        data.push(Value::String(name.to_string()));
        data.extend(args);
        Self {
            data: Some(Value::Array(data)),
            ..Self::new(SocketIoPacketType::Event, namespace)
        }
    }

    pub fn ack(namespace: impl Into<String>, id: u64, args: Vec<Value>) -> Self {
        Self {
            id: Some(id),
            data: Some(Value::Array(args)),
            ..Self::new(SocketIoPacketType::Ack, namespace)
        }
    }

    pub fn error(namespace: impl Into<String>, message: &str) -> Self {
        Self {
            data: Some(Value::String(message.to_string())),
            ..Self::new(SocketIoPacketType::Error, namespace)
        }
    }

    /// Request an acknowledgement with the given id
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    /// Event name for EVENT packets
    pub fn event_name(&self) -> Option<&str> {
        if self.packet_type != SocketIoPacketType::Event {
            return None;
        }
        match &self.data {
            Some(Value::Array(items)) => items.first().and_then(Value::as_str),
            _ => None,
        }
    }

    /// Event arguments (EVENT) or acknowledgement values (ACK)
    pub fn args(&self) -> &[Value] {
        let items = match &self.data {
            Some(Value::Array(items)) => items.as_slice(),
            _ => return &[],
        };
        match self.packet_type {
            SocketIoPacketType::Event => items.get(1..).unwrap_or(&[]),
            _ => items,
        }
    }

    /// Encode to the text carried in a MESSAGE packet
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(16);
        out.push((b'0' + self.packet_type as u8) as char);

        if self.namespace != ROOT_NAMESPACE && !self.namespace.is_empty() {
            out.push_str(&self.namespace);
            out.push(',');
        }

        if let Some(id) = self.id {
            let _ = write!(out, "{}", id);
        }

        if let Some(data) = &self.data {
            out.push_str(&data.to_string());
        }

        out
    }

    /// Decode from the text of a MESSAGE packet
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let first = *text.as_bytes().first().ok_or(DecodeError::EmptyPacket)?;
        let packet_type = first
            .checked_sub(b'0')
            .and_then(SocketIoPacketType::from_u8)
            .ok_or(DecodeError::InvalidPacketType(first))?;

        if matches!(
            packet_type,
            SocketIoPacketType::BinaryEvent | SocketIoPacketType::BinaryAck
        ) {
            return Err(DecodeError::MalformedPacket(
                "binary attachments are not supported",
            ));
        }

        let mut rest = &text[1..];

        let namespace = if rest.starts_with('/') {
            match rest.find(',') {
                Some(i) => {
                    let ns = &rest[..i];
                    rest = &rest[i + 1..];
                    ns
                }
                None => {
                    let ns = rest;
                    rest = "";
                    ns
                }
            }
        } else {
            ROOT_NAMESPACE
        };

        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        let id = if digits > 0 {
            let id = rest[..digits]
                .parse::<u64>()
                .map_err(|_| DecodeError::MalformedPacket("ack id out of range"))?;
            rest = &rest[digits..];
            Some(id)
        } else {
            None
        };

        let data = if rest.is_empty() {
            None
        } else {
            Some(
                serde_json::from_str(rest)
                    .map_err(|e| DecodeError::InvalidJson(e.to_string()))?,
            )
        };

        Ok(Self {
            packet_type,
            namespace: namespace.to_string(),
            id,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_connect_root() {
        assert_eq!(SocketIoPacket::connect("/").encode(), "0");
        assert_eq!(
            SocketIoPacket::decode("0").unwrap(),
            SocketIoPacket::connect("/")
        );
    }

    #[test]
    fn test_connect_namespace() {
        let packet = SocketIoPacket::connect("/chat");
        assert_eq!(packet.encode(), "0/chat,");
        assert_eq!(SocketIoPacket::decode("0/chat,").unwrap(), packet);
        assert_eq!(SocketIoPacket::decode("0/chat").unwrap(), packet);
    }

    #[test]
    fn test_event_with_ack_id() {
        let packet = SocketIoPacket::event("/chat", "message", vec![json!("hi"), json!(3)])
            .with_id(12);
        let encoded = packet.encode();
        assert_eq!(encoded, r#"2/chat,12["message","hi",3]"#);

        let decoded = SocketIoPacket::decode(&encoded).unwrap();
        assert_eq!(decoded, packet);
        assert_eq!(decoded.event_name(), Some("message"));
        assert_eq!(decoded.args(), &[json!("hi"), json!(3)]);
    }

    #[test]
    fn test_ack_args() {
        let packet = SocketIoPacket::decode(r#"37["ok"]"#).unwrap();
        assert_eq!(packet.packet_type, SocketIoPacketType::Ack);
        assert_eq!(packet.id, Some(7));
        assert_eq!(packet.args(), &[json!("ok")]);
        assert_eq!(packet.event_name(), None);
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(SocketIoPacket::decode(""), Err(DecodeError::EmptyPacket));
        assert_eq!(
            SocketIoPacket::decode("9"),
            Err(DecodeError::InvalidPacketType(b'9'))
        );
        assert!(matches!(
            SocketIoPacket::decode("2[\"unterminated"),
            Err(DecodeError::InvalidJson(_))
        ));
        assert!(matches!(
            SocketIoPacket::decode("51-[\"x\",{}]"),
            Err(DecodeError::MalformedPacket(_))
        ));
    }
}
