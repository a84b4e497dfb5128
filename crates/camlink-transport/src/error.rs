use std::time::Duration;

/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open a connection to the device.
    #[error("failed to connect to {device}: {source}")]
    Connect {
        device: String,
        source: std::io::Error,
    },

    /// No device matched the discovery request.
    #[error("device not found: {0}")]
    NotFound(String),

    /// A bounded read did not complete before its deadline.
    #[error("read timed out after {0:?}")]
    Timeout(Duration),

    /// The transport was closed (locally or by the device).
    #[error("transport closed")]
    Closed,

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// True for the bounded-wait failure, as opposed to a broken link.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
