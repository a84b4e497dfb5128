use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::{Connector, DeviceHandle, Transport};

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Default bound on connection establishment.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Stream-socket transport (Bluetooth SPP / RFCOMM, or TCP and Unix sockets).
///
/// A single inbound byte stream carries both the handshake ack and frame
/// data; writes go to the same socket.
pub struct StreamTransport<S> {
    inner: Option<S>,
    eof: bool,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap a connected stream.
    pub fn new(stream: S) -> Self {
        Self {
            inner: Some(stream),
            eof: false,
        }
    }

    /// Borrow the underlying stream, if still open.
    pub fn get_ref(&self) -> Option<&S> {
        self.inner.as_ref()
    }

    /// Take back the underlying stream, e.g. to hand it to a codec after the
    /// handshake. `None` once closed.
    pub fn into_inner(self) -> Option<S> {
        self.inner
    }
}

impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.inner.as_mut().ok_or(TransportError::Closed)?;
        stream.write_all(data).await?;
        stream.flush().await?;
        Ok(())
    }

    async fn read(&mut self, max: usize, timeout: Duration) -> Result<Bytes> {
        if self.eof {
            return Err(TransportError::Closed);
        }
        let stream = self.inner.as_mut().ok_or(TransportError::Closed)?;

        let mut buf = vec![0u8; max.clamp(1, READ_CHUNK_SIZE)];
        let read = match tokio::time::timeout(timeout, stream.read(&mut buf)).await {
            Err(_elapsed) => return Err(TransportError::Timeout(timeout)),
            Ok(Err(err)) => return Err(TransportError::Io(err)),
            Ok(Ok(n)) => n,
        };

        if read == 0 {
            debug!("stream reached end of file");
            self.eof = true;
            return Err(TransportError::Closed);
        }

        buf.truncate(read);
        Ok(Bytes::from(buf))
    }

    fn is_open(&self) -> bool {
        self.inner.is_some() && !self.eof
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.inner.take() {
            let _ = stream.shutdown().await;
            debug!("stream transport closed");
        }
    }
}

impl<S> std::fmt::Debug for StreamTransport<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTransport")
            .field("open", &self.inner.is_some())
            .field("eof", &self.eof)
            .finish()
    }
}

/// Connects to devices reachable over TCP (`address` = `host:port`).
///
/// Discovery returns the configured device list, the way a paired-device
/// registry would.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    devices: Vec<DeviceHandle>,
    connect_timeout: Duration,
}

impl TcpConnector {
    /// Create a connector that knows about `devices`.
    pub fn new(devices: Vec<DeviceHandle>) -> Self {
        Self {
            devices,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Override the connection establishment timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl Connector for TcpConnector {
    type Transport = StreamTransport<TcpStream>;

    async fn discover(&self) -> Result<Vec<DeviceHandle>> {
        Ok(self.devices.clone())
    }

    async fn connect(&self, device: &DeviceHandle) -> Result<Self::Transport> {
        let attempt = TcpStream::connect(device.address.as_str());
        let stream = match tokio::time::timeout(self.connect_timeout, attempt).await {
            Err(_elapsed) => {
                return Err(TransportError::Connect {
                    device: device.to_string(),
                    source: std::io::Error::from(std::io::ErrorKind::TimedOut),
                })
            }
            Ok(result) => result.map_err(|source| TransportError::Connect {
                device: device.to_string(),
                source,
            })?,
        };
        let _ = stream.set_nodelay(true);
        debug!(%device, "connected over tcp");
        Ok(StreamTransport::new(stream))
    }
}

/// Connects to devices exposed on Unix domain sockets (`address` = socket path).
#[cfg(unix)]
#[derive(Debug, Clone)]
pub struct UnixConnector {
    devices: Vec<DeviceHandle>,
}

#[cfg(unix)]
impl UnixConnector {
    /// Create a connector that knows about `devices`.
    pub fn new(devices: Vec<DeviceHandle>) -> Self {
        Self { devices }
    }
}

#[cfg(unix)]
impl Connector for UnixConnector {
    type Transport = StreamTransport<tokio::net::UnixStream>;

    async fn discover(&self) -> Result<Vec<DeviceHandle>> {
        Ok(self.devices.clone())
    }

    async fn connect(&self, device: &DeviceHandle) -> Result<Self::Transport> {
        let stream = tokio::net::UnixStream::connect(&device.address)
            .await
            .map_err(|source| TransportError::Connect {
                device: device.to_string(),
                source,
            })?;
        debug!(%device, "connected over unix domain socket");
        Ok(StreamTransport::new(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplex_roundtrip() {
        let (left, mut right) = tokio::io::duplex(64);
        let mut transport = StreamTransport::new(left);

        transport.write(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        right.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");

        right.write_all(b"world").await.unwrap();
        let got = transport.read(3, Duration::from_secs(1)).await.unwrap();
        assert_eq!(got.as_ref(), b"wor");
        let got = transport.read(16, Duration::from_secs(1)).await.unwrap();
        assert_eq!(got.as_ref(), b"ld");
    }

    #[tokio::test(start_paused = true)]
    async fn read_times_out_when_idle() {
        let (left, _right) = tokio::io::duplex(64);
        let mut transport = StreamTransport::new(left);
        let err = transport
            .read(4, Duration::from_millis(2000))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(transport.is_open());
    }

    #[tokio::test]
    async fn peer_hangup_reports_closed() {
        let (left, right) = tokio::io::duplex(64);
        let mut transport = StreamTransport::new(left);
        drop(right);

        let err = transport.read(4, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, TransportError::Closed));
        assert!(!transport.is_open());
    }

    #[tokio::test]
    async fn into_inner_returns_stream_until_closed() {
        let (left, _right) = tokio::io::duplex(64);
        assert!(StreamTransport::new(left).into_inner().is_some());

        let (left, _right) = tokio::io::duplex(64);
        let mut transport = StreamTransport::new(left);
        transport.close().await;
        assert!(transport.into_inner().is_none());
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (left, _right) = tokio::io::duplex(64);
        let mut transport = StreamTransport::new(left);

        transport.close().await;
        transport.close().await;

        assert!(!transport.is_open());
        assert!(matches!(
            transport.write(b"x").await,
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn tcp_connect_and_discover() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let device = DeviceHandle::new("cam", addr.to_string());
        let connector = TcpConnector::new(vec![device.clone()]);

        assert_eq!(connector.discover().await.unwrap(), vec![device.clone()]);

        let accept = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"ok").await.unwrap();
        });

        let mut transport = connector.connect(&device).await.unwrap();
        let got = transport
            .read_exact(2, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(got.as_ref(), b"ok");
        accept.await.unwrap();
    }

    #[tokio::test]
    async fn tcp_connect_refused_is_connect_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let device = DeviceHandle::new("gone", addr.to_string());
        let connector = TcpConnector::new(Vec::new());
        let err = connector.connect(&device).await.unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
    }
}
