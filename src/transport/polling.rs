//! HTTP long-polling transport
//!
//! Each request is a separate HTTP exchange:
//!
//! - `POST` carries a text batch of packets from the client
//! - `GET` waits until the server has something to say, then returns every
//!   queued packet as binary payload records
//!
//! Server-initiated packets wait in an [`OutboundBuffer`] until the next
//! GET picks them up.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::{header, Method, Request, Response, StatusCode};
use tracing::{debug, error, warn};

use super::{
    empty_response, handshake_packet, text_response, HttpResponse, OutboundBuffer,
    TransportConnection, TransportError, TransportKind,
};
use crate::codec;
use crate::config::EngineConfig;
use crate::protocol::{DecodeError, EnginePacket, ProtocolError, SocketIoPacket};
use crate::session::{AtomicState, ConnectionState, DisconnectReason, SessionHandle};

/// Content type of GET responses
pub const BINARY_CONTENT_TYPE: &str = "application/octet-stream";

/// Long-polling transport connection
pub struct PollingConnection {
    session: Weak<dyn SessionHandle>,
    config: EngineConfig,
    buffer: OutboundBuffer,
    /// Set by `abort` before the wake-up NOOP is queued
    done: AtomicBool,
    state: AtomicState,
}

impl PollingConnection {
    pub fn new(session: Weak<dyn SessionHandle>, config: EngineConfig) -> Arc<Self> {
        Arc::new(Self {
            session,
            config,
            buffer: OutboundBuffer::new(),
            done: AtomicBool::new(false),
            state: AtomicState::new(ConnectionState::Connecting),
        })
    }

    /// Queue the handshake and CONNECT packets for the first GET, then
    /// notify the session. On failure the session is marked CONNECT_FAILED
    /// and the connection aborted.
    pub async fn connect(self: &Arc<Self>) -> Result<(), TransportError> {
        let session = self.session()?;

        let result: Result<(), TransportError> = async {
            self.send(handshake_packet(session.session_id(), &self.config)?).await?;
            self.send_message(&SocketIoPacket::connect("/")).await?;
            session
                .on_connect(self.clone() as Arc<dyn TransportConnection>)
                .await
        }
        .await;

        match result {
            Ok(()) => {
                self.state.advance(ConnectionState::Connected);
                Ok(())
            }
            Err(e) => {
                error!("Session[{}]: cannot connect: {}", session.session_id(), e);
                session.set_disconnect_reason(DisconnectReason::ConnectFailed);
                self.abort().await;
                Err(e)
            }
        }
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Number of packets waiting for the next GET
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn session(&self) -> Result<Arc<dyn SessionHandle>, TransportError> {
        self.session.upgrade().ok_or(TransportError::SessionGone)
    }

    /// POST: decode the batch and hand each packet to the session in order
    async fn handle_incoming(
        &self,
        request: Request<Bytes>,
    ) -> Result<HttpResponse, TransportError> {
        let content_type = request
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        if !content_type.starts_with("text/") {
            let err = ProtocolError::UnsupportedContentType(content_type.to_string());
            warn!("{}", err);
            return Err(err.into());
        }

        let payload = std::str::from_utf8(request.body())
            .map_err(|_| ProtocolError::Decode(DecodeError::InvalidUtf8))?;
        let packets = codec::decode_payload(payload).map_err(|e| {
            warn!("Invalid polling payload: {}", e);
            ProtocolError::from(e)
        })?;

        let session = self.session()?;
        debug!(
            "Session[{}]: {} packet(s) posted",
            session.session_id(),
            packets.len()
        );
        for packet in packets {
            session.on_packet(packet).await?;
        }

        Ok(text_response(StatusCode::OK, "ok"))
    }

    /// GET: wait for the first packet, then drain whatever else is queued
    async fn handle_outgoing(&self) -> HttpResponse {
        let mut body = BytesMut::new();

        let mut next = self.buffer.take().await;
        while let Some(packet) = next {
            if self.is_done() {
                break;
            }
            codec::binary_encode(&packet, &mut body);
            next = self.buffer.poll();
        }

        if body.is_empty() {
            debug!("Polling connection aborted while waiting");
        }

        let mut response = Response::new(Full::new(body.freeze()));
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static(BINARY_CONTENT_TYPE),
        );
        response
    }
}

#[async_trait]
impl TransportConnection for PollingConnection {
    fn kind(&self) -> TransportKind {
        TransportKind::Polling
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    async fn handle(&self, request: Request<Bytes>) -> Result<HttpResponse, TransportError> {
        if self.is_done() {
            debug!("Ignoring {} on aborted polling connection", request.method());
            return Ok(empty_response(StatusCode::OK));
        }

        let method = request.method().clone();
        match method {
            Method::POST => self.handle_incoming(request).await,
            Method::GET => Ok(self.handle_outgoing().await),
            _ => {
                debug!("Rejecting {} on polling connection", method);
                Ok(empty_response(StatusCode::METHOD_NOT_ALLOWED))
            }
        }
    }

    async fn send(&self, packet: EnginePacket) -> Result<(), TransportError> {
        self.buffer.push(packet)
    }

    async fn abort(&self) {
        if self.done.swap(true, Ordering::AcqRel) {
            return;
        }
        self.state.advance(ConnectionState::Closing);
        // Wakes every pending GET; each sees `done` and returns without data
        self.buffer.close_with(EnginePacket::noop());
        self.state.advance(ConnectionState::Closed);
    }
}

/// Collect a hyper request body into memory, refusing bodies over `limit` bytes
pub async fn read_request<B>(
    request: Request<B>,
    limit: usize,
) -> Result<Request<Bytes>, TransportError>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = request.into_parts();
    let collected = Limited::new(body, limit).collect().await.map_err(|e| {
        if e.is::<LengthLimitError>() {
            TransportError::Protocol(ProtocolError::PayloadTooLarge)
        } else {
            TransportError::Io(std::io::Error::other(e))
        }
    })?;
    Ok(Request::from_parts(parts, collected.to_bytes()))
}
