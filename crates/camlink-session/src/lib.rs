//! Connection management for camera streaming links.
//!
//! This is the layer that keeps frames flowing: perform the handshake, run
//! the receive loop that turns transport chunks into detections, and keep
//! reconnecting with backoff when the link drops.

pub mod config;
pub mod detection;
pub mod error;
pub mod handshake;
pub mod session;
pub mod state;
pub mod supervisor;

pub use config::{
    BackoffPolicy, ClientConfig, ReceiveConfig, DEFAULT_DEVICE_NAME, DEFAULT_IDLE_TIMEOUT,
    DEFAULT_LATENCY_SLA, DEFAULT_MAX_BAD_MAGIC, DEFAULT_PAYLOAD_TIMEOUT,
};
pub use detection::{
    DecodedImage, DescriptionTable, DetectionCandidate, DetectionPipeline, DetectionResult,
    ImageDecoder, ObjectDetector, DEFAULT_SCORE_THRESHOLD,
};
pub use error::{ConfigError, DecodeError, HandshakeError, Result, SessionError};
pub use handshake::{
    perform_handshake, perform_handshake_with_config, respond_to_handshake, HandshakeConfig,
    DEFAULT_HANDSHAKE_TIMEOUT, HANDSHAKE_ACK, HANDSHAKE_REQUEST,
};
pub use session::{ConnectionSession, OnDetection};
pub use state::{ConnectionState, StatusSnapshot};
pub use supervisor::{ReconnectSupervisor, RetryContext};
