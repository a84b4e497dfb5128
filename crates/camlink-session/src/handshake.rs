use std::time::Duration;

use bytes::Buf;
use camlink_frame::FRAME_MAGIC;
use camlink_transport::{Transport, TransportError};
use tracing::{debug, info, warn};

use crate::error::HandshakeError;

/// Request written by the client right after the link comes up.
pub const HANDSHAKE_REQUEST: u32 = FRAME_MAGIC;

/// Ack the device answers with once it is ready to stream.
pub const HANDSHAKE_ACK: u32 = 0xABCD_4321;

/// Default bound on waiting for the ack.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(5000);

const MAGIC_LEN: usize = 4;

/// Configuration for the handshake exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeConfig {
    /// Total time allowed for the 4-byte reply.
    pub timeout: Duration,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}

impl HandshakeConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Perform client-side handshake using default configuration.
pub async fn perform_handshake<T: Transport>(transport: &mut T) -> Result<(), HandshakeError> {
    perform_handshake_with_config(transport, &HandshakeConfig::default()).await
}

/// Perform client-side handshake with explicit configuration.
///
/// One request write, one bounded read of the reply channel, no retries.
pub async fn perform_handshake_with_config<T: Transport>(
    transport: &mut T,
    config: &HandshakeConfig,
) -> Result<(), HandshakeError> {
    transport
        .write(&HANDSHAKE_REQUEST.to_le_bytes())
        .await
        .map_err(HandshakeError::Transport)?;
    debug!("handshake request sent");

    let ack = read_magic(transport, config.timeout, true).await?;
    if ack != HANDSHAKE_ACK {
        warn!(ack = %format!("0x{ack:08X}"), "unexpected handshake ack");
        return Err(HandshakeError::BadAck(ack));
    }

    info!("handshake complete");
    Ok(())
}

/// Device-side counterpart: wait for the request, then acknowledge it.
pub async fn respond_to_handshake<T: Transport>(
    transport: &mut T,
    config: &HandshakeConfig,
) -> Result<(), HandshakeError> {
    let request = read_magic(transport, config.timeout, false).await?;
    if request != HANDSHAKE_REQUEST {
        warn!(request = %format!("0x{request:08X}"), "unexpected handshake request");
        return Err(HandshakeError::BadRequest(request));
    }

    transport
        .write(&HANDSHAKE_ACK.to_le_bytes())
        .await
        .map_err(HandshakeError::Transport)?;
    debug!("handshake ack sent");
    Ok(())
}

async fn read_magic<T: Transport>(
    transport: &mut T,
    timeout: Duration,
    reply_channel: bool,
) -> Result<u32, HandshakeError> {
    let mut bytes = if reply_channel {
        transport.read_reply(MAGIC_LEN, timeout).await?
    } else {
        transport.read_exact(MAGIC_LEN, timeout).await?
    };
    if bytes.len() < MAGIC_LEN {
        return Err(HandshakeError::Transport(TransportError::Closed));
    }
    Ok(bytes.get_u32_le())
}

#[cfg(test)]
mod tests {
    use camlink_transport::{notification_pair, StreamTransport};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    #[tokio::test]
    async fn client_and_device_agree() {
        let (client, device) = tokio::io::duplex(64);
        let mut client = StreamTransport::new(client);
        let mut device = StreamTransport::new(device);

        let responder = tokio::spawn(async move {
            respond_to_handshake(&mut device, &HandshakeConfig::default()).await
        });

        perform_handshake(&mut client).await.unwrap();
        responder.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn request_bytes_are_little_endian() {
        let (client, mut device) = tokio::io::duplex(64);
        let mut client = StreamTransport::new(client);

        let device_task = tokio::spawn(async move {
            let mut request = [0u8; 4];
            device.read_exact(&mut request).await.unwrap();
            device.write_all(&[0x21, 0x43, 0xCD, 0xAB]).await.unwrap();
            request
        });

        perform_handshake(&mut client).await.unwrap();
        assert_eq!(device_task.await.unwrap(), [0xBE, 0xBA, 0xFE, 0xCA]);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_device_times_out() {
        let (client, _device) = tokio::io::duplex(64);
        let mut client = StreamTransport::new(client);

        let err = perform_handshake(&mut client).await.unwrap_err();
        assert!(matches!(err, HandshakeError::Timeout(d) if d == DEFAULT_HANDSHAKE_TIMEOUT));
    }

    #[tokio::test]
    async fn wrong_ack_is_rejected() {
        let (client, mut device) = tokio::io::duplex(64);
        let mut client = StreamTransport::new(client);
        device.write_all(&0xDEAD_BEEFu32.to_le_bytes()).await.unwrap();

        let err = perform_handshake(&mut client).await.unwrap_err();
        assert!(matches!(err, HandshakeError::BadAck(0xDEAD_BEEF)));
    }

    #[tokio::test]
    async fn ack_split_across_reads() {
        let (client, mut device) = tokio::io::duplex(64);
        let mut client = StreamTransport::new(client);

        let device_task = tokio::spawn(async move {
            let mut request = [0u8; 4];
            device.read_exact(&mut request).await.unwrap();
            device.write_all(&[0x21, 0x43]).await.unwrap();
            tokio::task::yield_now().await;
            device.write_all(&[0xCD, 0xAB]).await.unwrap();
            device
        });

        perform_handshake(&mut client).await.unwrap();
        drop(device_task.await.unwrap());
    }

    #[tokio::test]
    async fn hangup_is_transport_error() {
        let (client, device) = tokio::io::duplex(64);
        let mut client = StreamTransport::new(client);
        drop(device);

        let err = perform_handshake(&mut client).await.unwrap_err();
        assert!(matches!(err, HandshakeError::Transport(_)));
    }

    #[tokio::test]
    async fn ack_over_command_characteristic() {
        let (mut transport, mut link) = notification_pair(16);

        let platform = tokio::spawn(async move {
            let request = link.next_write().await.unwrap();
            assert_eq!(request.as_ref(), &HANDSHAKE_REQUEST.to_le_bytes());
            // Frame data arriving early must not be mistaken for the ack.
            link.notify_frame(vec![0xBEu8, 0xBA]).await.unwrap();
            link.notify_command(HANDSHAKE_ACK.to_le_bytes().to_vec())
                .await
                .unwrap();
            link
        });

        perform_handshake(&mut transport).await.unwrap();
        let _link = platform.await.unwrap();
    }

    #[tokio::test]
    async fn device_rejects_unknown_request() {
        let (mut client, device) = tokio::io::duplex(64);
        let mut device = StreamTransport::new(device);
        client.write_all(&[1, 2, 3, 4]).await.unwrap();

        let err = respond_to_handshake(&mut device, &HandshakeConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, HandshakeError::BadRequest(0x0403_0201)));
    }
}
