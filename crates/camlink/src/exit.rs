use std::fmt;
use std::io;

use camlink_frame::FrameError;
use camlink_session::{ConfigError, HandshakeError, SessionError};
use camlink_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::NotFound
        | io::ErrorKind::AddrInUse => TRANSPORT_ERROR,
        io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput => DATA_INVALID,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Connect { source, .. } | TransportError::Io(source) => {
            io_error(context, source)
        }
        TransportError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn handshake_error(context: &str, err: HandshakeError) -> CliError {
    match err {
        HandshakeError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        HandshakeError::Transport(err) => transport_error(context, err),
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn session_error(context: &str, err: SessionError) -> CliError {
    match err {
        SessionError::Handshake(err) => handshake_error(context, err),
        SessionError::Transport(err) => transport_error(context, err),
        SessionError::RepeatedBadMagic(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        SessionError::Cancelled => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn config_error(err: ConfigError) -> CliError {
    match err {
        ConfigError::Io { .. } => CliError::new(USAGE, err.to_string()),
        ConfigError::Json(_) => CliError::new(DATA_INVALID, err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn timeouts_map_to_124() {
        let err = session_error(
            "stream failed",
            SessionError::Handshake(HandshakeError::Timeout(Duration::from_secs(5))),
        );
        assert_eq!(err.code, TIMEOUT);

        let err = transport_error("read", TransportError::Timeout(Duration::from_secs(2)));
        assert_eq!(err.code, TIMEOUT);
    }

    #[test]
    fn refused_connection_is_transport_error() {
        let err = transport_error(
            "connect failed",
            TransportError::Connect {
                device: "cam".into(),
                source: io::Error::from(io::ErrorKind::ConnectionRefused),
            },
        );
        assert_eq!(err.code, TRANSPORT_ERROR);
        assert!(err.message.starts_with("connect failed: "));
    }

    #[test]
    fn corrupt_stream_is_data_invalid() {
        assert_eq!(
            session_error("stream", SessionError::RepeatedBadMagic(3)).code,
            DATA_INVALID
        );
        assert_eq!(
            handshake_error("handshake", HandshakeError::BadAck(1)).code,
            DATA_INVALID
        );
    }
}
