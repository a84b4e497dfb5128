use std::fmt;
use std::future::Future;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::time::Instant;

use crate::error::{Result, TransportError};

/// Identity of a discoverable camera device.
///
/// `address` is transport specific: a MAC address for Bluetooth, `host:port`
/// for TCP, a socket path for Unix sockets. Two handles are the same logical
/// device when they compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceHandle {
    /// Advertised device name.
    pub name: String,
    /// Transport address.
    pub address: String,
}

impl DeviceHandle {
    /// Create a new device handle.
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.address)
    }
}

/// A connected duplex byte transport.
///
/// Reads are bounded by a caller-supplied timeout and yield while waiting.
/// Implementations keep any bytes they received but did not hand out yet, so
/// no data is lost between `read`, `read_exact` and `read_reply` calls.
pub trait Transport: Send {
    /// Write all bytes to the device's command/write channel.
    fn write(&mut self, data: &[u8]) -> impl Future<Output = Result<()>> + Send;

    /// Read between 1 and `max` currently available bytes.
    ///
    /// Fails with [`TransportError::Timeout`] when nothing arrives in time and
    /// [`TransportError::Closed`] once the link is gone.
    fn read(&mut self, max: usize, timeout: Duration)
        -> impl Future<Output = Result<Bytes>> + Send;

    /// Read exactly `len` bytes within `timeout` (total, not per chunk).
    fn read_exact(
        &mut self,
        len: usize,
        timeout: Duration,
    ) -> impl Future<Output = Result<Bytes>> + Send {
        async move {
            let deadline = Instant::now() + timeout;
            let mut out = BytesMut::with_capacity(len);
            while out.len() < len {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(TransportError::Timeout(timeout));
                }
                let chunk = match self.read(len - out.len(), remaining).await {
                    Ok(chunk) => chunk,
                    Err(TransportError::Timeout(_)) => return Err(TransportError::Timeout(timeout)),
                    Err(err) => return Err(err),
                };
                out.extend_from_slice(&chunk);
            }
            Ok(out.freeze())
        }
    }

    /// Read exactly `len` bytes from the reply channel.
    ///
    /// Stream transports have a single inbound channel; notification links
    /// deliver replies on a dedicated characteristic and override this.
    fn read_reply(
        &mut self,
        len: usize,
        timeout: Duration,
    ) -> impl Future<Output = Result<Bytes>> + Send {
        self.read_exact(len, timeout)
    }

    /// Whether the device accepts writes after the handshake (feedback lines).
    fn has_back_channel(&self) -> bool {
        true
    }

    /// Whether the link is still usable.
    fn is_open(&self) -> bool;

    /// Close the link. Closing an already closed transport is a no-op.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// Discovers devices and opens transports to them.
///
/// This is the seam to the platform radio stack: discovery and connection
/// establishment live behind it, framing and handshakes do not.
pub trait Connector: Send + Sync + 'static {
    /// Transport produced by a successful connection.
    type Transport: Transport + 'static;

    /// List currently reachable devices.
    fn discover(&self) -> impl Future<Output = Result<Vec<DeviceHandle>>> + Send;

    /// Open a transport to `device`.
    fn connect(&self, device: &DeviceHandle)
        -> impl Future<Output = Result<Self::Transport>> + Send;
}
