//! vibeio - Engine.IO / Socket.IO server transports
//!
//! Long-polling and WebSocket transport connections sharing one
//! [`TransportConnection`] contract, the Engine.IO packet codec, and a
//! reference [`Session`] that answers heartbeats and enforces the idle
//! timeout.

pub mod codec;
pub mod config;
pub mod logging;
pub mod protocol;
pub mod session;
pub mod transport;

pub use config::{Config, EngineConfig};
pub use protocol::{EnginePacket, Handshake, PacketData, PacketType, SocketIoPacket};
pub use session::{ConnectionState, DisconnectReason, Session, SessionEvent, SessionHandle};
pub use transport::{
    PollingConnection, SocketChannel, SocketConnection, TransportConnection, TransportError,
    TransportKind,
};
