//! `tokio_util::codec` integration.

use std::collections::VecDeque;

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::assembler::{AssemblerEvent, FrameAssembler};
use crate::codec::{Frame, FrameConfig, HEADER_SIZE};
use crate::error::{FrameError, Result};

/// Codec for camera frames over any `AsyncRead`/`AsyncWrite`.
///
/// Decoding runs through a [`FrameAssembler`]: only completed frames are
/// yielded, discards are counted and the stream stays usable after garbage.
#[derive(Debug, Default)]
pub struct CameraFrameCodec {
    assembler: FrameAssembler,
    ready: VecDeque<Frame>,
    discarded: u64,
}

impl CameraFrameCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            assembler: FrameAssembler::with_config(config),
            ready: VecDeque::new(),
            discarded: 0,
        }
    }

    /// Number of discard events seen while decoding.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }
}

impl Decoder for CameraFrameCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if !src.is_empty() {
            let chunk = src.split();
            for event in self.assembler.feed(&chunk) {
                match event {
                    AssemblerEvent::Completed(frame) => self.ready.push_back(frame),
                    AssemblerEvent::Discarded(_) => self.discarded += 1,
                }
            }
        }
        Ok(self.ready.pop_front())
    }
}

impl Encoder<Frame> for CameraFrameCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<()> {
        let max = self.assembler.config().max_payload_size;
        if frame.payload.len() > max {
            return Err(FrameError::PayloadTooLarge {
                size: frame.payload.len(),
                max,
            });
        }
        dst.reserve(HEADER_SIZE + frame.payload.len());
        frame.header.encode(dst);
        dst.extend_from_slice(&frame.payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::codec::encode_frame;

    #[test]
    fn encode_then_decode_in_pieces() {
        let mut codec = CameraFrameCodec::new();
        let mut wire = BytesMut::new();
        codec
            .encode(Frame::new(10, &b"first"[..]).unwrap(), &mut wire)
            .unwrap();
        codec
            .encode(Frame::new(20, &b"second"[..]).unwrap(), &mut wire)
            .unwrap();

        let mut src = BytesMut::new();
        let mut frames = Vec::new();
        for chunk in wire.chunks(7) {
            src.extend_from_slice(chunk);
            while let Some(frame) = codec.decode(&mut src).unwrap() {
                frames.push(frame);
            }
        }

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].payload, Bytes::from_static(b"second"));
        assert_eq!(frames[1].source_timestamp(), 20);
    }

    #[test]
    fn garbage_is_skipped_and_counted() {
        let mut codec = CameraFrameCodec::new();
        let mut src = BytesMut::from(&[0u8; HEADER_SIZE][..]);
        encode_frame(3, b"after", &mut src).unwrap();

        let frame = codec.decode(&mut src).unwrap().unwrap();
        assert_eq!(frame.payload, Bytes::from_static(b"after"));
        assert_eq!(codec.discarded(), 1);
        assert!(codec.decode(&mut src).unwrap().is_none());
    }

    #[test]
    fn encoder_enforces_max_payload() {
        let mut codec = CameraFrameCodec::with_config(FrameConfig {
            max_payload_size: 4,
        });
        let mut dst = BytesMut::new();
        let err = codec
            .encode(Frame::new(0, vec![0u8; 5]).unwrap(), &mut dst)
            .unwrap_err();
        assert!(matches!(
            err,
            FrameError::PayloadTooLarge { size: 5, max: 4 }
        ));
        assert!(dst.is_empty());
    }
}
