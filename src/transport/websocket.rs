//! WebSocket channel
//!
//! Adapts the write half of a tokio-tungstenite stream to [`SocketChannel`].
//! The read half stays with [`SocketConnection::serve`], which selects on
//! [`WsChannel::closed`] to notice a local disconnect.
//!
//! [`SocketConnection::serve`]: super::SocketConnection::serve

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Mutex, Notify};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::debug;

use super::SocketChannel;

/// Upper bound on sending the close frame during `disconnect`
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Write half of an accepted WebSocket
pub struct WsChannel<S> {
    /// Held for the duration of one frame write
    sink: Mutex<SplitSink<WebSocketStream<S>, Message>>,
    open: AtomicBool,
    closed: Notify,
}

impl<S> WsChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(sink: SplitSink<WebSocketStream<S>, Message>) -> Self {
        Self {
            sink: Mutex::new(sink),
            open: AtomicBool::new(true),
            closed: Notify::new(),
        }
    }

    /// Resolves once `disconnect` has been called
    pub async fn closed(&self) {
        // notify_one keeps a permit, so a disconnect before this call still wakes it
        self.closed.notified().await;
    }

    async fn write(&self, message: Message) -> io::Result<()> {
        if !self.is_open() {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "WebSocket is closed",
            ));
        }
        let mut sink = self.sink.lock().await;
        sink.send(message).await.map_err(io::Error::other)
    }
}

#[async_trait]
impl<S> SocketChannel for WsChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    async fn send_text(&self, text: String) -> io::Result<()> {
        self.write(Message::Text(text)).await
    }

    async fn send_binary(&self, data: Bytes) -> io::Result<()> {
        self.write(Message::Binary(data.to_vec())).await
    }

    async fn disconnect(&self) {
        if !self.open.swap(false, Ordering::AcqRel) {
            return;
        }
        self.closed.notify_one();

        // A writer stuck on a full socket holds the lock; skip the close
        // frame rather than wait behind it.
        match self.sink.try_lock() {
            Ok(mut sink) => {
                if tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await.is_err() {
                    debug!("WebSocket close frame timed out");
                }
            }
            Err(_) => debug!("WebSocket busy, closing without close frame"),
        }
    }
}

/// Accept a WebSocket handshake, rejecting request paths outside `expected_path`
pub async fn accept_with_path<S>(
    stream: S,
    expected_path: &str,
) -> Result<WebSocketStream<S>, io::Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let expected_path = expected_path.to_string();

    tokio_tungstenite::accept_hdr_async(stream, move |req: &Request, response: Response| {
        let request_path = req.uri().path();
        if !request_path.starts_with(&expected_path) {
            let mut error = ErrorResponse::new(Some(format!(
                "Invalid path: expected '{}', got '{}'",
                expected_path, request_path
            )));
            *error.status_mut() = StatusCode::NOT_FOUND;
            return Err(error);
        }
        Ok(response)
    })
    .await
    .map_err(io::Error::other)
}
