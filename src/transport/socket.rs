//! WebSocket transport
//!
//! The channel is always writable, so packets go straight out instead of
//! being buffered. Writes are serialized by the [`SocketChannel`]
//! implementation. The I/O driver (see [`SocketConnection::serve`]) feeds
//! inbound frames and the final close event into the `on_*` handlers.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use hyper::Request;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, warn};

use super::{
    handshake_packet, HttpResponse, TransportConnection, TransportError, TransportKind, WsChannel,
};
use crate::codec;
use crate::config::EngineConfig;
use crate::protocol::{EnginePacket, PacketData, ProtocolError, SocketIoPacket};
use crate::session::{AtomicState, ConnectionState, DisconnectReason, SessionHandle};

/// Write side of a full-duplex channel
#[async_trait]
pub trait SocketChannel: Send + Sync {
    fn is_open(&self) -> bool;

    /// Write one text frame. Concurrent callers are serialized.
    async fn send_text(&self, text: String) -> io::Result<()>;

    /// Write one binary frame. Concurrent callers are serialized.
    async fn send_binary(&self, data: Bytes) -> io::Result<()>;

    /// Force the channel closed. Returns in bounded time.
    async fn disconnect(&self);
}

/// Classify an unexpected close by its close code
pub fn close_code_reason(code: CloseCode) -> DisconnectReason {
    match code {
        CloseCode::Away => DisconnectReason::ClientGone,
        _ => DisconnectReason::Error,
    }
}

/// WebSocket transport connection
pub struct SocketConnection {
    session: Weak<dyn SessionHandle>,
    config: EngineConfig,
    /// Cleared by `abort` and on close
    remote: Mutex<Option<Arc<dyn SocketChannel>>>,
    state: AtomicState,
    close_seen: AtomicBool,
}

impl SocketConnection {
    pub fn new(session: Weak<dyn SessionHandle>, config: EngineConfig) -> Arc<Self> {
        Arc::new(Self {
            session,
            config,
            remote: Mutex::new(None),
            state: AtomicState::new(ConnectionState::Connecting),
            close_seen: AtomicBool::new(false),
        })
    }

    /// Channel established: send OPEN and CONNECT, then notify the session.
    /// Any failure marks the session CONNECT_FAILED and aborts.
    pub async fn on_connect(
        self: &Arc<Self>,
        channel: Arc<dyn SocketChannel>,
    ) -> Result<(), TransportError> {
        *self.remote.lock() = Some(channel);

        let Some(session) = self.session.upgrade() else {
            warn!("WebSocket connected for a session that no longer exists");
            self.abort().await;
            return Err(TransportError::SessionGone);
        };

        session.set_timeout(self.config.ping_timeout);
        debug!(
            "{} WebSocket connection configuration: timeout={:?}",
            self.config.namespace,
            session.timeout()
        );

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

    /// Inbound text frame
    pub async fn on_text(&self, text: &str) {
        debug!("Text received: {}", text);
        let Some(session) = self.session.upgrade() else {
            return;
        };
        session.reset_timeout();

        if let Err(e) = session.on_text(text).await {
            warn!("Invalid packet received: {}", e);
        }
    }

    /// Inbound binary frame
    pub async fn on_binary(&self, data: Bytes) {
        debug!("Binary received: {} bytes", data.len());
        let Some(session) = self.session.upgrade() else {
            return;
        };
        session.reset_timeout();

        if let Err(e) = session.on_binary(data).await {
            warn!("Problem processing binary received: {}", e);
        }
    }

    /// The channel closed. Only the first call has any effect.
    pub async fn on_close(&self, code: CloseCode, reason: &str) {
        if self.close_seen.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(
            "WebSocket closed. Close code: {} message: {}",
            u16::from(code),
            reason
        );
        self.state.set(ConnectionState::Closed);
        self.remote.lock().take();

        let Some(session) = self.session.upgrade() else {
            return;
        };

        // A session-initiated close already carries its reason
        if session.connection_state() < ConnectionState::Closing {
            session.set_disconnect_reason(close_code_reason(code));
        }
        session.set_disconnect_message((!reason.is_empty()).then(|| reason.to_string()));
        session.on_shutdown().await;
    }

    /// Drive an accepted WebSocket until it closes
    pub async fn serve<S>(self: &Arc<Self>, ws: WebSocketStream<S>)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sink, mut stream) = ws.split();
        let channel = Arc::new(WsChannel::new(sink));

        // On failure the channel is already disconnected; the loop below
        // observes that and reports the close.
        let _ = self
            .on_connect(channel.clone() as Arc<dyn SocketChannel>)
            .await;

        let (code, reason) = loop {
            tokio::select! {
                biased;

                _ = channel.closed() => break (CloseCode::Abnormal, String::new()),
                message = stream.next() => match message {
                    Some(Ok(Message::Text(text))) => self.on_text(&text).await,
                    Some(Ok(Message::Binary(data))) => self.on_binary(Bytes::from(data)).await,
                    Some(Ok(Message::Close(frame))) => {
                        break frame
                            .map(|f| (f.code, f.reason.into_owned()))
                            .unwrap_or((CloseCode::Status, String::new()));
                    }
                    // Ping/pong are answered by tungstenite
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("WebSocket read error: {}", e);
                        break (CloseCode::Abnormal, String::new());
                    }
                    None => break (CloseCode::Abnormal, String::new()),
                },
            }
        };

        self.on_close(code, &reason).await;
    }

    fn channel(&self) -> Option<Arc<dyn SocketChannel>> {
        self.remote.lock().clone()
    }
}

#[async_trait]
impl TransportConnection for SocketConnection {
    fn kind(&self) -> TransportKind {
        TransportKind::WebSocket
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    async fn handle(&self, _request: Request<Bytes>) -> Result<HttpResponse, TransportError> {
        Err(ProtocolError::UnexpectedRequest.into())
    }

    async fn send(&self, packet: EnginePacket) -> Result<(), TransportError> {
        let channel = self.channel().ok_or(TransportError::Closed)?;
        if !channel.is_open() {
            return Err(TransportError::Closed);
        }

        let result = match &packet.data {
            PacketData::Text(_) => {
                let text = codec::encode_packet(&packet);
                debug!("sendString: {}", text);
                channel.send_text(text).await
            }
            PacketData::Binary(_) => {
                debug!("sendBinary: {} bytes", packet.data.len());
                channel.send_binary(codec::encode_binary_frame(&packet)).await
            }
        };

        if let Err(e) = result {
            channel.disconnect().await;
            return Err(TransportError::Io(e));
        }
        Ok(())
    }

    async fn abort(&self) {
        if let Some(session) = self.session.upgrade() {
            session.clear_timeout();
        }
        let channel = self.remote.lock().take();
        if let Some(channel) = channel {
            self.state.advance(ConnectionState::Closing);
            channel.disconnect().await;
        }
    }
}
