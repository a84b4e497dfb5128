/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame header contains an invalid magic number.
    #[error("invalid frame magic 0x{0:08X} (expected 0xCAFEBABE)")]
    InvalidMagic(u32),

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The payload does not match the CRC announced in its header.
    #[error("crc mismatch (expected 0x{expected:04X}, computed 0x{actual:04X})")]
    CrcMismatch { expected: u16, actual: u16 },

    /// Fewer bytes than a full header were supplied.
    #[error("truncated header ({0} bytes)")]
    TruncatedHeader(usize),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
