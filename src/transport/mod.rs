//! Transport Layer
//!
//! One [`TransportConnection`] trait over the two ways a session reaches
//! its peer: repeated HTTP long-polling requests and a persistent WebSocket.

mod buffer;
mod polling;
mod socket;
mod websocket;

pub use buffer::OutboundBuffer;
pub use polling::{read_request, PollingConnection};
pub use socket::{close_code_reason, SocketChannel, SocketConnection};
pub use websocket::{accept_with_path, WsChannel};

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{header, Request, Response, StatusCode};

use crate::protocol::{EnginePacket, Handshake, ProtocolError, SocketIoPacket};
use crate::session::ConnectionState;

/// Response type produced by [`TransportConnection::handle`]
pub type HttpResponse = Response<Full<Bytes>>;

/// Which transport carries a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Polling,
    WebSocket,
}

impl TransportKind {
    /// Name used in the `transport` query parameter and handshake upgrades
    pub fn name(self) -> &'static str {
        match self {
            TransportKind::Polling => "polling",
            TransportKind::WebSocket => "websocket",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Transport errors
#[derive(Debug)]
pub enum TransportError {
    /// Transport or underlying channel is closed
    Closed,
    /// The owning session no longer exists
    SessionGone,
    /// Write to the channel failed
    Io(std::io::Error),
    /// The peer violated the protocol
    Protocol(ProtocolError),
}

impl TransportError {
    /// HTTP status reported to the client when this error ends a request
    pub fn status_code(&self) -> StatusCode {
        match self {
            TransportError::Closed | TransportError::SessionGone => StatusCode::BAD_REQUEST,
            TransportError::Protocol(ProtocolError::PayloadTooLarge) => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            TransportError::Protocol(_) => StatusCode::BAD_REQUEST,
            TransportError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Error response for the request that failed
    pub fn into_response(self) -> HttpResponse {
        text_response(self.status_code(), self.to_string())
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Closed => write!(f, "transport closed"),
            TransportError::SessionGone => write!(f, "session no longer exists"),
            TransportError::Io(e) => write!(f, "IO error: {}", e),
            TransportError::Protocol(e) => write!(f, "protocol violation: {}", e),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::Io(e) => Some(e),
            TransportError::Protocol(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        TransportError::Io(e)
    }
}

impl From<ProtocolError> for TransportError {
    fn from(e: ProtocolError) -> Self {
        TransportError::Protocol(e)
    }
}

/// A session's binding to one physical channel.
///
/// All methods may be called concurrently from any task. `abort` must be
/// safe to call while `handle` is in flight and must never block
/// indefinitely.
#[async_trait]
pub trait TransportConnection: Send + Sync {
    /// Which transport this is
    fn kind(&self) -> TransportKind;

    /// Current lifecycle state
    fn state(&self) -> ConnectionState;

    /// Process one inbound HTTP request addressed to this connection
    async fn handle(&self, request: Request<Bytes>) -> Result<HttpResponse, TransportError>;

    /// Queue or write one Engine.IO packet
    async fn send(&self, packet: EnginePacket) -> Result<(), TransportError>;

    /// Send an application packet wrapped in a MESSAGE packet
    async fn send_message(&self, packet: &SocketIoPacket) -> Result<(), TransportError> {
        self.send(EnginePacket::message(packet.encode())).await
    }

    /// Terminate the connection. Idempotent. Does not shut the session down.
    async fn abort(&self);
}

/// Handshake packet for a new session on this server
pub(crate) fn handshake_packet(
    sid: &str,
    config: &crate::config::EngineConfig,
) -> Result<EnginePacket, ProtocolError> {
    let handshake = Handshake::new(sid, Vec::new(), config.ping_interval, config.ping_timeout);
    Ok(EnginePacket::open(&handshake)?)
}

pub(crate) fn text_response(status: StatusCode, body: impl Into<Bytes>) -> HttpResponse {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/plain"),
    );
    response
}

pub(crate) fn empty_response(status: StatusCode) -> HttpResponse {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}
