//! Engine.IO Session
//!
//! [`SessionHandle`] is the contract a transport connection calls back
//! into. [`Session`] is the implementation used by this crate: it owns the
//! active transport, enforces the idle timeout, answers heartbeats and
//! publishes [`SessionEvent`]s for the application.
//!
//! Aborting a transport never ends the session by itself. Session shutdown
//! happens through [`SessionHandle::on_shutdown`], which the WebSocket
//! transport calls when its channel closes, and which [`Session::close`]
//! and the idle timeout call directly.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::codec;
use crate::config::EngineConfig;
use crate::protocol::{EnginePacket, PacketData, PacketType, ProtocolError, SocketIoPacket};
use crate::transport::{TransportConnection, TransportError};

/// Lifecycle of a session or of a transport connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ConnectionState {
    Connecting = 0,
    Connected = 1,
    Closing = 2,
    Closed = 3,
}

impl ConnectionState {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Connected,
            2 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DisconnectReason {
    /// Not classified yet
    #[default]
    Unknown,
    /// Handshake or session notification failed while connecting
    ConnectFailed,
    /// Application asked the peer to disconnect
    Disconnect,
    /// No packet arrived within the ping timeout
    Timeout,
    /// The peer went away (WebSocket close code 1001)
    ClientGone,
    /// Unexpected channel close
    Error,
    /// The peer sent a CLOSE packet
    ClosedRemotely,
    /// Closed by the server
    Closed,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DisconnectReason::Unknown => "unknown",
            DisconnectReason::ConnectFailed => "connect failed",
            DisconnectReason::Disconnect => "disconnect",
            DisconnectReason::Timeout => "timeout",
            DisconnectReason::ClientGone => "client gone",
            DisconnectReason::Error => "error",
            DisconnectReason::ClosedRemotely => "closed remotely",
            DisconnectReason::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Callbacks a transport connection makes into the session that owns it.
///
/// Transports hold only a `Weak` reference to the session.
#[async_trait]
pub trait SessionHandle: Send + Sync {
    fn session_id(&self) -> &str;

    fn connection_state(&self) -> ConnectionState;

    /// Record why the session ended. The first classification wins.
    fn set_disconnect_reason(&self, reason: DisconnectReason);

    fn set_disconnect_message(&self, message: Option<String>);

    /// Set the idle timeout without starting it
    fn set_timeout(&self, timeout: Duration);

    fn timeout(&self) -> Duration;

    /// Restart the idle timer
    fn reset_timeout(&self);

    /// Stop the idle timer
    fn clear_timeout(&self);

    /// The transport finished its handshake
    async fn on_connect(
        &self,
        connection: Arc<dyn TransportConnection>,
    ) -> Result<(), TransportError>;

    /// One decoded inbound packet
    async fn on_packet(&self, packet: EnginePacket) -> Result<(), TransportError>;

    /// Inbound WebSocket text frame
    async fn on_text(&self, text: &str) -> Result<(), TransportError> {
        let packet = codec::decode_packet(text).map_err(ProtocolError::from)?;
        self.on_packet(packet).await
    }

    /// Inbound WebSocket binary frame
    async fn on_binary(&self, data: Bytes) -> Result<(), TransportError> {
        let packet = codec::decode_binary_frame(data).map_err(ProtocolError::from)?;
        self.on_packet(packet).await
    }

    /// The session is over. Must tolerate repeated calls.
    async fn on_shutdown(&self);
}

/// Events published to the application
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Connected,
    /// Socket.IO packet received
    Message(SocketIoPacket),
    /// Binary MESSAGE received
    Binary(Bytes),
    /// Published exactly once
    Disconnected {
        reason: DisconnectReason,
        message: Option<String>,
    },
}

/// Lock-free holder for a [`ConnectionState`]
#[derive(Debug)]
pub(crate) struct AtomicState(AtomicU8);

impl AtomicState {
    pub(crate) fn new(state: ConnectionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: ConnectionState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Move forward to `state`; never moves backwards. Returns the previous state.
    pub(crate) fn advance(&self, state: ConnectionState) -> ConnectionState {
        ConnectionState::from_u8(self.0.fetch_max(state as u8, Ordering::AcqRel))
    }
}

/// A logical client connection, independent of the transport carrying it
pub struct Session {
    id: Arc<str>,
    config: EngineConfig,
    me: Weak<Session>,
    state: AtomicState,
    /// Active transport. The session is its only long-lived owner.
    connection: Mutex<Option<Arc<dyn TransportConnection>>>,
    disconnect_reason: Mutex<DisconnectReason>,
    disconnect_message: Mutex<Option<String>>,
    timeout: Mutex<Duration>,
    timer: Mutex<Option<JoinHandle<()>>>,
    events: broadcast::Sender<SessionEvent>,
    shut_down: AtomicBool,
}

impl Session {
    pub fn new(id: impl Into<Arc<str>>, config: EngineConfig) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        let timeout = config.ping_timeout;
        Arc::new_cyclic(|me| Session {
            id: id.into(),
            config,
            me: me.clone(),
            state: AtomicState::new(ConnectionState::Connecting),
            connection: Mutex::new(None),
            disconnect_reason: Mutex::new(DisconnectReason::Unknown),
            disconnect_message: Mutex::new(None),
            timeout: Mutex::new(timeout),
            timer: Mutex::new(None),
            events,
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> &Arc<str> {
        &self.id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    pub fn disconnect_reason(&self) -> DisconnectReason {
        *self.disconnect_reason.lock()
    }

    pub fn disconnect_message(&self) -> Option<String> {
        self.disconnect_message.lock().clone()
    }

    /// Receive events published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Non-owning handle for a transport connection
    pub fn handle(&self) -> Weak<dyn SessionHandle> {
        let me: Weak<dyn SessionHandle> = self.me.clone();
        me
    }

    /// Make `connection` the active transport, replacing any previous one
    pub fn bind(&self, connection: Arc<dyn TransportConnection>) {
        debug!(
            "Session[{}]: bound to {} transport",
            self.id,
            connection.kind()
        );
        *self.connection.lock() = Some(connection);
    }

    pub fn connection(&self) -> Option<Arc<dyn TransportConnection>> {
        self.connection.lock().clone()
    }

    /// Send a packet over the active transport
    pub async fn send(&self, packet: EnginePacket) -> Result<(), TransportError> {
        let connection = self.connection().ok_or(TransportError::Closed)?;
        connection.send(packet).await
    }

    /// Send a Socket.IO packet over the active transport
    pub async fn send_message(&self, packet: &SocketIoPacket) -> Result<(), TransportError> {
        let connection = self.connection().ok_or(TransportError::Closed)?;
        connection.send_message(packet).await
    }

    /// Emit an event on the root namespace
    pub async fn emit(&self, name: &str, args: Vec<Value>) -> Result<(), TransportError> {
        self.send_message(&SocketIoPacket::event("/", name, args)).await
    }

    /// Server-initiated close. The reason is fixed before the transport is
    /// torn down so close codes observed afterwards cannot replace it.
    ///
    /// Over WebSocket the peer receives a CLOSE packet. Over long-polling the
    /// CLOSE packet is queued but the abort that follows discards it, so the
    /// client only notices when its next request fails.
    pub async fn close(&self) {
        if self.state.advance(ConnectionState::Closing) >= ConnectionState::Closing {
            return;
        }
        self.set_disconnect_reason(DisconnectReason::Closed);

        if let Some(connection) = self.connection() {
            if let Err(e) = connection.send(EnginePacket::close()).await {
                debug!("Session[{}]: close packet not sent: {}", self.id, e);
            }
            connection.abort().await;
        }

        self.on_shutdown().await;
    }

    async fn on_timeout(&self) {
        // Detach our own timer handle so clear_timeout does not cancel this task
        self.timer.lock().take();

        if self.state.get() >= ConnectionState::Closing {
            return;
        }
        debug!("Session[{}]: timed out", self.id);
        self.set_disconnect_reason(DisconnectReason::Timeout);
        self.state.advance(ConnectionState::Closing);

        if let Some(connection) = self.connection() {
            connection.abort().await;
        }
        self.on_shutdown().await;
    }

    fn publish(&self, event: SessionEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl SessionHandle for Session {
    fn session_id(&self) -> &str {
        &self.id
    }

    fn connection_state(&self) -> ConnectionState {
        self.state.get()
    }

    fn set_disconnect_reason(&self, reason: DisconnectReason) {
        let mut current = self.disconnect_reason.lock();
        if *current == DisconnectReason::Unknown {
            *current = reason;
        }
    }

    fn set_disconnect_message(&self, message: Option<String>) {
        *self.disconnect_message.lock() = message;
    }

    fn set_timeout(&self, timeout: Duration) {
        *self.timeout.lock() = timeout;
    }

    fn timeout(&self) -> Duration {
        *self.timeout.lock()
    }

    fn reset_timeout(&self) {
        let timeout = self.timeout();
        let mut timer = self.timer.lock();
        if let Some(handle) = timer.take() {
            handle.abort();
        }
        if timeout.is_zero() || self.state.get() >= ConnectionState::Closing {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("Session[{}]: no runtime, idle timeout disabled", self.id);
            return;
        };
        let me = self.me.clone();
        *timer = Some(runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(session) = me.upgrade() {
                session.on_timeout().await;
            }
        }));
    }

    fn clear_timeout(&self) {
        if let Some(handle) = self.timer.lock().take() {
            handle.abort();
        }
    }

    async fn on_connect(
        &self,
        connection: Arc<dyn TransportConnection>,
    ) -> Result<(), TransportError> {
        if self.state.get() >= ConnectionState::Closing {
            return Err(TransportError::Closed);
        }
        self.bind(connection);
        self.state.advance(ConnectionState::Connected);
        self.reset_timeout();
        self.publish(SessionEvent::Connected);
        Ok(())
    }

    async fn on_packet(&self, packet: EnginePacket) -> Result<(), TransportError> {
        self.reset_timeout();

        match packet.packet_type {
            PacketType::Ping => self.send(EnginePacket::pong(packet.data)).await,
            PacketType::Message => {
                match packet.data {
                    PacketData::Text(text) => {
                        let message =
                            SocketIoPacket::decode(&text).map_err(ProtocolError::from)?;
                        self.publish(SessionEvent::Message(message));
                    }
                    PacketData::Binary(data) => self.publish(SessionEvent::Binary(data)),
                }
                Ok(())
            }
            PacketType::Close => {
                debug!("Session[{}]: peer sent CLOSE", self.id);
                self.set_disconnect_reason(DisconnectReason::ClosedRemotely);
                self.state.advance(ConnectionState::Closing);
                if let Some(connection) = self.connection() {
                    connection.abort().await;
                }
                self.on_shutdown().await;
                Ok(())
            }
            PacketType::Open | PacketType::Pong | PacketType::Upgrade | PacketType::Noop => {
                debug!(
                    "Session[{}]: ignoring {:?} packet",
                    self.id, packet.packet_type
                );
                Ok(())
            }
        }
    }

    async fn on_shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.state.set(ConnectionState::Closed);
        self.clear_timeout();
        let connection = self.connection.lock().take();
        drop(connection);

        let reason = self.disconnect_reason();
        let message = self.disconnect_message();
        debug!("Session[{}]: shut down ({})", self.id, reason);
        self.publish(SessionEvent::Disconnected { reason, message });
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state.get())
            .field("disconnect_reason", &self.disconnect_reason())
            .finish_non_exhaustive()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(handle) = self.timer.get_mut().take() {
            handle.abort();
        }
    }
}
