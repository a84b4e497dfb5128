use std::path::Path;
use std::time::Duration;

use camlink_frame::{FrameConfig, DEFAULT_MAX_PAYLOAD};
use serde::{Deserialize, Serialize};

use crate::detection::{DescriptionTable, DEFAULT_SCORE_THRESHOLD};
use crate::error::ConfigError;
use crate::handshake::{HandshakeConfig, DEFAULT_HANDSHAKE_TIMEOUT};

/// Name the camera firmware advertises.
pub const DEFAULT_DEVICE_NAME: &str = "ESP32CAM-Detector";

/// Default read timeout while waiting for the next header.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_millis(5000);

/// Default read timeout once a frame has started arriving.
pub const DEFAULT_PAYLOAD_TIMEOUT: Duration = Duration::from_millis(2000);

/// Default decode + inference latency target.
pub const DEFAULT_LATENCY_SLA: Duration = Duration::from_millis(2000);

/// Default number of misaligned headers in a row before giving up.
pub const DEFAULT_MAX_BAD_MAGIC: u32 = 3;

const DEFAULT_READ_CHUNK: usize = 4096;

/// Receive loop tuning.
#[derive(Debug, Clone)]
pub struct ReceiveConfig {
    /// Read timeout while awaiting a header.
    pub idle_timeout: Duration,
    /// Read timeout while a frame is partially received.
    pub payload_timeout: Duration,
    /// Latency above which a warning is logged.
    pub latency_sla: Duration,
    /// Consecutive `BadMagic` discards that end the session. `0` disables.
    pub max_bad_magic: u32,
    /// Upper bound on a single transport read.
    pub read_chunk_size: usize,
    pub frame: FrameConfig,
}

impl Default for ReceiveConfig {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            payload_timeout: DEFAULT_PAYLOAD_TIMEOUT,
            latency_sla: DEFAULT_LATENCY_SLA,
            max_bad_magic: DEFAULT_MAX_BAD_MAGIC,
            read_chunk_size: DEFAULT_READ_CHUNK,
            frame: FrameConfig::default(),
        }
    }
}

impl ReceiveConfig {
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_payload_timeout(mut self, timeout: Duration) -> Self {
        self.payload_timeout = timeout;
        self
    }

    pub fn with_latency_sla(mut self, sla: Duration) -> Self {
        self.latency_sla = sla;
        self
    }

    pub fn with_max_bad_magic(mut self, count: u32) -> Self {
        self.max_bad_magic = count;
        self
    }
}

/// Reconnect delay: `min(max, max(min, base * attempt))`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub min: Duration,
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(2000),
            min: Duration::from_millis(1000),
            max: Duration::from_millis(10_000),
        }
    }
}

impl BackoffPolicy {
    /// Delay before retrying after `attempt` failures.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base
            .saturating_mul(attempt)
            .max(self.min)
            .min(self.max)
    }
}

/// File-backed client settings. Durations are in milliseconds; missing fields
/// take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub device_name: String,
    pub handshake_timeout_ms: u64,
    pub idle_timeout_ms: u64,
    pub payload_timeout_ms: u64,
    pub latency_sla_ms: u64,
    pub max_bad_magic: u32,
    pub max_payload_size: usize,
    pub backoff_base_ms: u64,
    pub backoff_min_ms: u64,
    pub backoff_max_ms: u64,
    pub score_threshold: f32,
    pub descriptions: DescriptionTable,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let backoff = BackoffPolicy::default();
        Self {
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            handshake_timeout_ms: millis(DEFAULT_HANDSHAKE_TIMEOUT),
            idle_timeout_ms: millis(DEFAULT_IDLE_TIMEOUT),
            payload_timeout_ms: millis(DEFAULT_PAYLOAD_TIMEOUT),
            latency_sla_ms: millis(DEFAULT_LATENCY_SLA),
            max_bad_magic: DEFAULT_MAX_BAD_MAGIC,
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            backoff_base_ms: millis(backoff.base),
            backoff_min_ms: millis(backoff.min),
            backoff_max_ms: millis(backoff.max),
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            descriptions: DescriptionTable::common_objects(),
        }
    }
}

impl ClientConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn handshake_config(&self) -> HandshakeConfig {
        HandshakeConfig::default().with_timeout(Duration::from_millis(self.handshake_timeout_ms))
    }

    pub fn receive_config(&self) -> ReceiveConfig {
        ReceiveConfig {
            idle_timeout: Duration::from_millis(self.idle_timeout_ms),
            payload_timeout: Duration::from_millis(self.payload_timeout_ms),
            latency_sla: Duration::from_millis(self.latency_sla_ms),
            max_bad_magic: self.max_bad_magic,
            read_chunk_size: DEFAULT_READ_CHUNK,
            frame: FrameConfig {
                max_payload_size: self.max_payload_size,
            },
        }
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            base: Duration::from_millis(self.backoff_base_ms),
            min: Duration::from_millis(self.backoff_min_ms),
            max: Duration::from_millis(self.backoff_max_ms),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let policy = BackoffPolicy::default();
        let delays: Vec<u64> = (0..8).map(|a| policy.delay(a).as_millis() as u64).collect();
        assert_eq!(
            delays,
            vec![1000, 2000, 4000, 6000, 8000, 10_000, 10_000, 10_000]
        );
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(policy.delay(u32::MAX), Duration::from_millis(10_000));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = ClientConfig::from_json_str(
            r#"{"device_name": "cam-7", "idle_timeout_ms": 750, "descriptions": {"dog": "Dog."}}"#,
        )
        .unwrap();

        assert_eq!(config.device_name, "cam-7");
        assert_eq!(config.receive_config().idle_timeout, Duration::from_millis(750));
        assert_eq!(
            config.receive_config().payload_timeout,
            DEFAULT_PAYLOAD_TIMEOUT
        );
        assert_eq!(config.handshake_config(), HandshakeConfig::default());
        assert_eq!(config.backoff_policy(), BackoffPolicy::default());
        assert_eq!(config.descriptions.describe("dog"), "Dog.");
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            ClientConfig::from_json_str("{not json"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let path = std::env::temp_dir().join(format!(
            "camlink-config-missing-{}.json",
            std::process::id()
        ));
        assert!(matches!(
            ClientConfig::from_json_file(&path),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn file_roundtrip() {
        let path = std::env::temp_dir().join(format!(
            "camlink-config-roundtrip-{}.json",
            std::process::id()
        ));
        let config = ClientConfig {
            max_bad_magic: 9,
            ..ClientConfig::default()
        };
        std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = ClientConfig::from_json_file(&path).unwrap();
        assert_eq!(loaded, config);
        let _ = std::fs::remove_file(&path);
    }
}
