//! Outbound packet buffer for long-polling.
//!
//! Producers (the session, application tasks) push packets at any time; the
//! standing GET request waits for the first packet and then drains whatever
//! else is queued. The queue is unbounded so a slow poller never blocks or
//! drops a send.

use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_queue::SegQueue;
use tokio::sync::Notify;

use crate::protocol::EnginePacket;

use super::TransportError;

/// Unbounded FIFO with a blocking take and non-blocking poll
#[derive(Debug, Default)]
pub struct OutboundBuffer {
    queue: SegQueue<EnginePacket>,
    /// Signalled on every push and once more for all waiters on close
    notify: Notify,
    closed: AtomicBool,
}

impl OutboundBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a packet. Fails once the buffer is closed.
    pub fn push(&self, packet: EnginePacket) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.enqueue(packet);
        Ok(())
    }

    /// Close the buffer, enqueue `sentinel` and wake every waiting reader
    pub fn close_with(&self, sentinel: EnginePacket) {
        self.closed.store(true, Ordering::Release);
        self.enqueue(sentinel);
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Wait until a packet is available and remove it. Returns `None` once
    /// the buffer is closed and drained.
    ///
    /// Cancel-safe: if the returned future is dropped, no packet is lost.
    pub async fn take(&self) -> Option<EnginePacket> {
        loop {
            // Registered before the checks so a close in between still wakes us
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(packet) = self.queue.pop() {
                return Some(packet);
            }
            if self.is_closed() {
                return None;
            }
            notified.await;
        }
    }

    /// Remove the next packet if one is queued
    pub fn poll(&self) -> Option<EnginePacket> {
        self.queue.pop()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn enqueue(&self, packet: EnginePacket) {
        self.queue.push(packet);
        self.notify.notify_one();
    }
}
