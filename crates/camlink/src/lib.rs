//! Camera frame streaming over Bluetooth-style links.
//!
//! camlink receives CRC-checked JPEG frames from a camera device, runs them
//! through a detection pipeline and keeps the link alive with a reconnecting
//! supervisor.
//!
//! # Crate Structure
//!
//! - [`transport`]: Duplex byte transports (stream sockets, BLE-style notifications)
//! - [`frame`]: Frame header codec, CRC-16 and the chunk-tolerant assembler
//! - [`session`]: Handshake, receive loop and reconnect supervision (behind `session` feature)
//! - [`probe`]: JPEG marker probe used as a stand-in decoder (behind `session` feature)

/// Re-export transport types.
pub mod transport {
    pub use camlink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use camlink_frame::*;
}

/// Re-export session types (requires `session` feature).
#[cfg(feature = "session")]
pub mod session {
    pub use camlink_session::*;
}

#[cfg(feature = "session")]
pub mod probe;
