use bytes::{Buf, BytesMut};
use tracing::{debug, trace};

use crate::codec::{Frame, FrameConfig, FrameHeader, FRAME_MAGIC, HEADER_SIZE};
use crate::crc::crc16;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const MAGIC_BYTES: [u8; 4] = FRAME_MAGIC.to_le_bytes();

/// Observable assembler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblerState {
    /// Waiting for a full 14-byte header.
    AwaitingHeader,
    /// Header accepted; collecting `expected_length` payload bytes.
    AccumulatingPayload { expected_length: usize },
}

/// Why a frame (or a run of misaligned bytes) was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// The stream was not aligned to a header; bytes were skipped up to the
    /// next magic.
    BadMagic,
    /// The payload did not match the CRC announced in its header.
    CrcMismatch { expected: u16, actual: u16 },
    /// A header announced more payload than the configured maximum.
    PayloadTooLarge { size: usize, max: usize },
}

impl std::fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscardReason::BadMagic => write!(f, "bad header magic"),
            DiscardReason::CrcMismatch { expected, actual } => write!(
                f,
                "crc mismatch (expected 0x{expected:04X}, computed 0x{actual:04X})"
            ),
            DiscardReason::PayloadTooLarge { size, max } => {
                write!(f, "payload too large ({size} bytes, max {max})")
            }
        }
    }
}

/// Output of [`FrameAssembler::feed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblerEvent {
    /// A complete frame whose payload passed the CRC check.
    Completed(Frame),
    /// Bytes that could not be turned into a frame.
    Discarded(DiscardReason),
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Header,
    Payload(FrameHeader),
}

/// Reassembles frames from transport chunks of any size.
///
/// The result only depends on the byte sequence, never on how it was split:
/// single-byte chunks, MTU-sized notifications and chunks spanning several
/// frames all yield the same events. A misaligned stream produces a single
/// [`DiscardReason::BadMagic`] per run of garbage, after which the assembler
/// scans forward for the next magic instead of giving up on the connection.
/// The length of the current run is available from
/// [`misaligned_bytes`](Self::misaligned_bytes).
#[derive(Debug)]
pub struct FrameAssembler {
    buf: BytesMut,
    phase: Phase,
    resyncing: bool,
    misaligned: usize,
    config: FrameConfig,
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameAssembler {
    /// Create an assembler with default configuration.
    pub fn new() -> Self {
        Self::with_config(FrameConfig::default())
    }

    /// Create an assembler with explicit configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            phase: Phase::Header,
            resyncing: false,
            misaligned: 0,
            config,
        }
    }

    /// Consume one transport chunk and return whatever it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<AssemblerEvent> {
        self.buf.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(event) = self.advance() {
            if let Some(event) = event {
                events.push(event);
            }
        }
        events
    }

    /// Current state of the header/payload machine.
    pub fn state(&self) -> AssemblerState {
        match self.phase {
            Phase::Header => AssemblerState::AwaitingHeader,
            Phase::Payload(header) => AssemblerState::AccumulatingPayload {
                expected_length: header.payload_length as usize,
            },
        }
    }

    /// True while part of a frame has been received: a payload is being
    /// collected, or the buffered bytes start like a header. Leftovers from a
    /// resync do not count.
    pub fn is_mid_frame(&self) -> bool {
        match self.phase {
            Phase::Payload(_) => true,
            Phase::Header => {
                let prefix = &self.buf[..self.buf.len().min(MAGIC_BYTES.len())];
                !self.resyncing && !prefix.is_empty() && MAGIC_BYTES.starts_with(prefix)
            }
        }
    }

    /// Bytes skipped while looking for a header since the last one accepted.
    pub fn misaligned_bytes(&self) -> usize {
        self.misaligned
    }

    /// Bytes received but not yet consumed.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Drop any partial frame, e.g. after the transport went away.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.phase = Phase::Header;
        self.resyncing = false;
        self.misaligned = 0;
    }

    /// Current assembler configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    /// Run one transition.
    ///
    /// `None` means more input is needed; `Some(None)` means progress was made
    /// without producing an event.
    fn advance(&mut self) -> Option<Option<AssemblerEvent>> {
        match self.phase {
            Phase::Header => {
                let head: [u8; HEADER_SIZE] = self.buf.get(..HEADER_SIZE)?.try_into().ok()?;
                let header = FrameHeader::decode(&head);

                if !header.has_valid_magic() {
                    self.skip_to_next_magic();
                    return Some(self.enter_resync(DiscardReason::BadMagic));
                }

                let size = header.payload_length as usize;
                if size > self.config.max_payload_size {
                    // A magic look-alike inside garbage; keep scanning past it.
                    self.skip_to_next_magic();
                    return Some(self.enter_resync(DiscardReason::PayloadTooLarge {
                        size,
                        max: self.config.max_payload_size,
                    }));
                }

                if self.resyncing {
                    debug!(payload_length = size, "resynchronized on frame header");
                }
                self.resyncing = false;
                self.misaligned = 0;
                self.buf.advance(HEADER_SIZE);
                self.phase = Phase::Payload(header);
                trace!(
                    payload_length = size,
                    timestamp = header.source_timestamp,
                    "frame header accepted"
                );
                Some(None)
            }
            Phase::Payload(header) => {
                let expected_length = header.payload_length as usize;
                if self.buf.len() < expected_length {
                    return None;
                }

                let payload = self.buf.split_to(expected_length).freeze();
                self.phase = Phase::Header;

                let actual = crc16(&payload);
                if actual != header.crc16 {
                    debug!(
                        expected = header.crc16,
                        actual,
                        payload_length = expected_length,
                        "discarding frame with crc mismatch"
                    );
                    return Some(Some(AssemblerEvent::Discarded(
                        DiscardReason::CrcMismatch {
                            expected: header.crc16,
                            actual,
                        },
                    )));
                }

                Some(Some(AssemblerEvent::Completed(Frame { header, payload })))
            }
        }
    }

    /// Report the first discard of a garbage run; stay quiet while still in it.
    fn enter_resync(&mut self, reason: DiscardReason) -> Option<AssemblerEvent> {
        if self.resyncing {
            return None;
        }
        self.resyncing = true;
        debug!(%reason, buffered = self.buf.len(), "stream misaligned, resynchronizing");
        Some(AssemblerEvent::Discarded(reason))
    }

    /// Drop bytes up to the next possible magic start (never the current one).
    fn skip_to_next_magic(&mut self) {
        let found = self
            .buf
            .get(1..)
            .and_then(|rest| {
                rest.windows(MAGIC_BYTES.len())
                    .position(|window| window == MAGIC_BYTES)
            })
            .map(|pos| pos + 1);

        let skip = match found {
            Some(pos) => pos,
            // Keep a tail that could be the start of a magic split across chunks.
            None => self
                .buf
                .len()
                .saturating_sub(MAGIC_BYTES.len() - 1)
                .max(1)
                .min(self.buf.len()),
        };
        self.buf.advance(skip);
        self.misaligned = self.misaligned.saturating_add(skip);
    }
}
