use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// Connection lifecycle as observed by the UI or CLI.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Idle,
    Scanning,
    Connecting,
    Handshaking,
    Streaming,
    Disconnected(String),
}

impl ConnectionState {
    /// True while a connection is being set up or is live.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Handshaking | ConnectionState::Streaming
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Idle => write!(f, "idle"),
            ConnectionState::Scanning => write!(f, "scanning"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Handshaking => write!(f, "handshaking"),
            ConnectionState::Streaming => write!(f, "streaming"),
            ConnectionState::Disconnected(reason) => write!(f, "disconnected: {reason}"),
        }
    }
}

/// Latest observable status of a supervised connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub state: ConnectionState,
    pub last_description: Option<String>,
    /// Decode + inference time of the last analyzed frame.
    #[serde(serialize_with = "serialize_millis")]
    pub last_latency: Option<Duration>,
    /// Set when the last analyzed frame exceeded the latency SLA.
    pub sla_exceeded: bool,
    pub frames_completed: u64,
    pub frames_discarded: u64,
    /// Failed attempts since the last successful handshake.
    pub attempt_count: u32,
}

fn serialize_millis<S: serde::Serializer>(
    value: &Option<Duration>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(duration) => serializer.serialize_some(&(duration.as_millis() as u64)),
        None => serializer.serialize_none(),
    }
}
