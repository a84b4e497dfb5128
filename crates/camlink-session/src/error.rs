use std::time::Duration;

use camlink_transport::TransportError;

/// Errors from the handshake exchange.
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    /// No complete ack arrived before the deadline.
    #[error("handshake timed out after {0:?}")]
    Timeout(Duration),

    /// The device answered with something other than the ack magic.
    #[error("unexpected handshake ack 0x{0:08X}")]
    BadAck(u32),

    /// Device side: the client sent something other than the request magic.
    #[error("unexpected handshake request 0x{0:08X}")]
    BadRequest(u32),

    /// The transport failed or closed during the exchange.
    #[error("transport error during handshake: {0}")]
    Transport(TransportError),
}

impl From<TransportError> for HandshakeError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout(after) => HandshakeError::Timeout(after),
            other => HandshakeError::Transport(other),
        }
    }
}

/// Errors that end a connection session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Handshake failed.
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    /// Transport-level error (read timeout, closed link, connect failure).
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The stream kept producing misaligned headers.
    #[error("{0} consecutive misaligned headers without a valid frame")]
    RepeatedBadMagic(u32),

    /// The receive task ended abnormally.
    #[error("receive task failed: {0}")]
    TaskFailed(String),

    /// The session was cancelled locally.
    #[error("session cancelled")]
    Cancelled,
}

impl SessionError {
    /// True when the session ended because nothing arrived in time.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            SessionError::Transport(TransportError::Timeout(_))
                | SessionError::Handshake(HandshakeError::Timeout(_))
        )
    }
}

/// Image decoding failure reported by an [`ImageDecoder`](crate::ImageDecoder).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("image decode failed: {0}")]
pub struct DecodeError(pub String);

impl DecodeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Errors loading a [`ClientConfig`](crate::ClientConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;
