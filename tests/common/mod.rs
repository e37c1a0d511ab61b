//! Shared helpers for transport integration tests
#![allow(dead_code)]

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use vibeio::session::{ConnectionState, DisconnectReason, SessionHandle};
use vibeio::transport::{SocketChannel, TransportConnection, TransportError};
use vibeio::EnginePacket;

/// Session double that records every callback a transport makes
pub struct RecordingSession {
    id: String,
    pub state: Mutex<ConnectionState>,
    /// Every reason passed in, in call order
    pub reasons: Mutex<Vec<DisconnectReason>>,
    pub message: Mutex<Option<String>>,
    pub timeout: Mutex<Duration>,
    pub resets: AtomicUsize,
    pub clears: AtomicUsize,
    pub packets: Mutex<Vec<EnginePacket>>,
    pub connection: Mutex<Option<Arc<dyn TransportConnection>>>,
    pub shutdowns: AtomicUsize,
    /// Make `on_connect` fail
    pub fail_connect: AtomicBool,
}

impl RecordingSession {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            state: Mutex::new(ConnectionState::Connecting),
            reasons: Mutex::new(Vec::new()),
            message: Mutex::new(None),
            timeout: Mutex::new(Duration::ZERO),
            resets: AtomicUsize::new(0),
            clears: AtomicUsize::new(0),
            packets: Mutex::new(Vec::new()),
            connection: Mutex::new(None),
            shutdowns: AtomicUsize::new(0),
            fail_connect: AtomicBool::new(false),
        })
    }

    pub fn handle(self: &Arc<Self>) -> Weak<dyn SessionHandle> {
        let weak: Weak<Self> = Arc::downgrade(self);
        weak
    }

    pub fn set_state(&self, state: ConnectionState) {
        *self.state.lock() = state;
    }

    pub fn reasons(&self) -> Vec<DisconnectReason> {
        self.reasons.lock().clone()
    }

    pub fn packets(&self) -> Vec<EnginePacket> {
        self.packets.lock().clone()
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionHandle for RecordingSession {
    fn session_id(&self) -> &str {
        &self.id
    }

    fn connection_state(&self) -> ConnectionState {
        *self.state.lock()
    }

    fn set_disconnect_reason(&self, reason: DisconnectReason) {
        self.reasons.lock().push(reason);
    }

    fn set_disconnect_message(&self, message: Option<String>) {
        *self.message.lock() = message;
    }

    fn set_timeout(&self, timeout: Duration) {
        *self.timeout.lock() = timeout;
    }

    fn timeout(&self) -> Duration {
        *self.timeout.lock()
    }

    fn reset_timeout(&self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
    }

    fn clear_timeout(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
    }

    async fn on_connect(
        &self,
        connection: Arc<dyn TransportConnection>,
    ) -> Result<(), TransportError> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        *self.connection.lock() = Some(connection);
        self.set_state(ConnectionState::Connected);
        Ok(())
    }

    async fn on_packet(&self, packet: EnginePacket) -> Result<(), TransportError> {
        self.packets.lock().push(packet);
        Ok(())
    }

    async fn on_shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        self.set_state(ConnectionState::Closed);
        self.connection.lock().take();
    }
}

/// A frame written to a [`MockChannel`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
}

/// In-memory channel that records writes
pub struct MockChannel {
    pub frames: Mutex<Vec<Frame>>,
    open: AtomicBool,
    /// Make every write fail
    pub fail_writes: AtomicBool,
    pub disconnects: AtomicUsize,
}

impl MockChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            frames: Mutex::new(Vec::new()),
            open: AtomicBool::new(true),
            fail_writes: AtomicBool::new(false),
            disconnects: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        let channel = Self::new();
        channel.fail_writes.store(true, Ordering::SeqCst);
        channel
    }

    pub fn frames(&self) -> Vec<Frame> {
        self.frames.lock().clone()
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    fn write(&self, frame: Frame) -> io::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe"));
        }
        self.frames.lock().push(frame);
        Ok(())
    }
}

#[async_trait]
impl SocketChannel for MockChannel {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn send_text(&self, text: String) -> io::Result<()> {
        self.write(Frame::Text(text))
    }

    async fn send_binary(&self, data: Bytes) -> io::Result<()> {
        self.write(Frame::Binary(data))
    }

    async fn disconnect(&self) {
        self.open.store(false, Ordering::SeqCst);
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}
