//! CRC-checked, length-delimited camera frame codec.
//!
//! Every camera frame on the wire is a fixed 14-byte little-endian header
//! followed by a JPEG payload:
//! - A 4-byte magic number (`0xCAFEBABE`) for stream synchronization
//! - A 4-byte payload length
//! - A 4-byte source timestamp in milliseconds
//! - A 2-byte CRC-16/CCITT-FALSE of the payload
//!
//! [`FrameAssembler`] turns arbitrarily fragmented transport chunks back into
//! validated frames and resynchronizes after garbage.

pub mod assembler;
pub mod codec;
pub mod crc;
pub mod error;

#[cfg(feature = "async")]
pub mod framed;

pub use assembler::{AssemblerEvent, AssemblerState, DiscardReason, FrameAssembler};
pub use codec::{
    encode_frame, Frame, FrameConfig, FrameHeader, DEFAULT_MAX_PAYLOAD, FRAME_MAGIC, HEADER_SIZE,
};
pub use crc::crc16;
pub use error::{FrameError, Result};

#[cfg(feature = "async")]
pub use framed::CameraFrameCodec;
