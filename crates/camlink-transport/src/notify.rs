//! Notification-based transport (BLE GATT model).
//!
//! A platform BLE stack reports characteristic updates and disconnects
//! through callbacks. Instead of mutating shared state from those callbacks,
//! the platform glue pushes [`LinkEvent`]s into a [`NotificationLink`] and the
//! receive loop consumes them in order through [`NotificationTransport`].
//!
//! Two inbound characteristics are modelled: the frame characteristic
//! (notifications capped at the MTU, carrying header and payload bytes) and the
//! command characteristic (handshake ack). Writes from the client side are
//! queued for the platform to forward to the command characteristic.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::Transport;

/// Default depth of the inbound event queue.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// An event reported by the platform BLE stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Notification on the frame characteristic.
    Frame(Bytes),
    /// Notification on the command characteristic.
    Command(Bytes),
    /// The peripheral disconnected.
    Disconnected,
}

/// Create a connected transport / platform-link pair.
pub fn notification_pair(capacity: usize) -> (NotificationTransport, NotificationLink) {
    let (event_tx, event_rx) = mpsc::channel(capacity.max(1));
    let (write_tx, write_rx) = mpsc::channel(capacity.max(1));

    let transport = NotificationTransport {
        events: event_rx,
        writes: write_tx,
        pending_frame: BytesMut::new(),
        pending_reply: BytesMut::new(),
        open: true,
    };
    let link = NotificationLink {
        events: event_tx,
        writes: write_rx,
    };
    (transport, link)
}

/// Client side of a notification link.
#[derive(Debug)]
pub struct NotificationTransport {
    events: mpsc::Receiver<LinkEvent>,
    writes: mpsc::Sender<Bytes>,
    pending_frame: BytesMut,
    pending_reply: BytesMut,
    open: bool,
}

impl NotificationTransport {
    /// Wait for the next event until `deadline`, filing notifications into the
    /// per-characteristic buffers.
    async fn pump(&mut self, deadline: Instant, timeout: Duration) -> Result<()> {
        if !self.open {
            return Err(TransportError::Closed);
        }
        match tokio::time::timeout_at(deadline, self.events.recv()).await {
            Err(_elapsed) => Err(TransportError::Timeout(timeout)),
            Ok(Some(LinkEvent::Frame(data))) => {
                self.pending_frame.extend_from_slice(&data);
                Ok(())
            }
            Ok(Some(LinkEvent::Command(data))) => {
                self.pending_reply.extend_from_slice(&data);
                Ok(())
            }
            Ok(Some(LinkEvent::Disconnected)) | Ok(None) => {
                debug!("notification link disconnected");
                self.open = false;
                Err(TransportError::Closed)
            }
        }
    }
}

impl Transport for NotificationTransport {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        if !self.open {
            return Err(TransportError::Closed);
        }
        self.writes
            .send(Bytes::copy_from_slice(data))
            .await
            .map_err(|_| TransportError::Closed)
    }

    async fn read(&mut self, max: usize, timeout: Duration) -> Result<Bytes> {
        let deadline = Instant::now() + timeout;
        while self.pending_frame.is_empty() {
            self.pump(deadline, timeout).await?;
        }
        let take = max.max(1).min(self.pending_frame.len());
        Ok(self.pending_frame.split_to(take).freeze())
    }

    async fn read_reply(&mut self, len: usize, timeout: Duration) -> Result<Bytes> {
        let deadline = Instant::now() + timeout;
        while self.pending_reply.len() < len {
            self.pump(deadline, timeout).await?;
        }
        Ok(self.pending_reply.split_to(len).freeze())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn close(&mut self) {
        if self.open {
            self.open = false;
            self.events.close();
            self.pending_frame.clear();
            self.pending_reply.clear();
            debug!("notification transport closed");
        }
    }
}

/// Platform side of a notification link.
#[derive(Debug)]
pub struct NotificationLink {
    events: mpsc::Sender<LinkEvent>,
    writes: mpsc::Receiver<Bytes>,
}

impl NotificationLink {
    /// Forward a frame characteristic notification.
    pub async fn notify_frame(&self, data: impl Into<Bytes>) -> Result<()> {
        self.send(LinkEvent::Frame(data.into())).await
    }

    /// Forward a command characteristic notification.
    pub async fn notify_command(&self, data: impl Into<Bytes>) -> Result<()> {
        self.send(LinkEvent::Command(data.into())).await
    }

    /// Report that the peripheral disconnected.
    pub async fn disconnected(&self) -> Result<()> {
        self.send(LinkEvent::Disconnected).await
    }

    /// Next payload the client wants written to the command characteristic.
    ///
    /// Returns `None` once the client side has been dropped.
    pub async fn next_write(&mut self) -> Option<Bytes> {
        self.writes.recv().await
    }

    async fn send(&self, event: LinkEvent) -> Result<()> {
        self.events
            .send(event)
            .await
            .map_err(|_| TransportError::Closed)
    }
}
