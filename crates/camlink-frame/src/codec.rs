use bytes::{BufMut, Bytes, BytesMut};

use crate::crc::crc16;
use crate::error::{FrameError, Result};

/// Frame header: magic (4) + length (4) + timestamp (4) + crc (2) = 14 bytes.
pub const HEADER_SIZE: usize = 14;

/// Header magic, shared with the handshake request.
pub const FRAME_MAGIC: u32 = 0xCAFE_BABE;

/// Default maximum payload size: 1 MiB, well above a VGA JPEG.
pub const DEFAULT_MAX_PAYLOAD: usize = 1024 * 1024;

/// Fixed-size header preceding every camera frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Synchronization magic, [`FRAME_MAGIC`] when aligned.
    pub magic: u32,
    /// Number of payload bytes following the header.
    pub payload_length: u32,
    /// Capture time on the device, in milliseconds.
    pub source_timestamp: u32,
    /// CRC-16/CCITT-FALSE of the payload.
    pub crc16: u16,
}

impl FrameHeader {
    /// Build the header describing `payload`.
    pub fn for_payload(source_timestamp: u32, payload: &[u8]) -> Result<Self> {
        let payload_length =
            u32::try_from(payload.len()).map_err(|_| FrameError::PayloadTooLarge {
                size: payload.len(),
                max: u32::MAX as usize,
            })?;
        Ok(Self {
            magic: FRAME_MAGIC,
            payload_length,
            source_timestamp,
            crc16: crc16(payload),
        })
    }

    /// Whether the magic marks an aligned header.
    pub fn has_valid_magic(&self) -> bool {
        self.magic == FRAME_MAGIC
    }

    /// Append the wire form of this header to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(HEADER_SIZE);
        dst.put_u32_le(self.magic);
        dst.put_u32_le(self.payload_length);
        dst.put_u32_le(self.source_timestamp);
        dst.put_u16_le(self.crc16);
    }

    /// Parse a header from exactly [`HEADER_SIZE`] bytes.
    ///
    /// Never fails on content: magic validation is left to the caller so that
    /// misaligned input can be reported and skipped.
    pub fn decode(src: &[u8; HEADER_SIZE]) -> Self {
        Self {
            magic: u32::from_le_bytes([src[0], src[1], src[2], src[3]]),
            payload_length: u32::from_le_bytes([src[4], src[5], src[6], src[7]]),
            source_timestamp: u32::from_le_bytes([src[8], src[9], src[10], src[11]]),
            crc16: u16::from_le_bytes([src[12], src[13]]),
        }
    }

    /// Parse a header from the front of `src`.
    pub fn decode_prefix(src: &[u8]) -> Result<Self> {
        let head: &[u8; HEADER_SIZE] = src
            .get(..HEADER_SIZE)
            .and_then(|s| s.try_into().ok())
            .ok_or(FrameError::TruncatedHeader(src.len()))?;
        Ok(Self::decode(head))
    }
}

/// A validated camera frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The header the payload was checked against.
    pub header: FrameHeader,
    /// JPEG payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame for `payload`, computing its header.
    pub fn new(source_timestamp: u32, payload: impl Into<Bytes>) -> Result<Self> {
        let payload = payload.into();
        let header = FrameHeader::for_payload(source_timestamp, &payload)?;
        Ok(Self { header, payload })
    }

    /// Capture time on the device, in milliseconds.
    pub fn source_timestamp(&self) -> u32 {
        self.header.source_timestamp
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌─────────────┬────────────┬─────────────┬──────────┬─────────────────┐
/// │ Magic (4B)  │ Length     │ Timestamp   │ CRC16    │ Payload         │
/// │ 0xCAFEBABE  │ (4B LE)    │ (4B LE, ms) │ (2B LE)  │ (Length bytes)  │
/// └─────────────┴────────────┴─────────────┴──────────┴─────────────────┘
/// ```
pub fn encode_frame(source_timestamp: u32, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let header = FrameHeader::for_payload(source_timestamp, payload)?;
    dst.reserve(HEADER_SIZE + payload.len());
    header.encode(dst);
    dst.put_slice(payload);
    Ok(())
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 1 MiB.
    ///
    /// Headers announcing more are treated as misaligned.
    pub max_payload_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}
