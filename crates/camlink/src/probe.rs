//! Lightweight JPEG inspection.
//!
//! [`JpegProbe`] checks that a payload is shaped like a baseline JPEG and reads
//! its dimensions without decoding pixels; [`ProbeDetector`] labels every
//! probed frame. Together they stand in for a real decoder and model when
//! exercising a link end to end.

use bytes::Bytes;
use camlink_session::{DecodeError, DecodedImage, DetectionCandidate, ImageDecoder, ObjectDetector};

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];
const SOS: u8 = 0xDA;

/// Label reported by [`ProbeDetector`].
pub const PROBE_LABEL: &str = "jpeg";

/// Validates JPEG markers and extracts the frame size from the SOF segment.
#[derive(Debug, Clone, Copy, Default)]
pub struct JpegProbe;

impl ImageDecoder for JpegProbe {
    fn decode(&self, jpeg: &[u8]) -> Result<DecodedImage, DecodeError> {
        if !jpeg.starts_with(&SOI) {
            return Err(DecodeError::new("missing start-of-image marker"));
        }
        if !jpeg.ends_with(&EOI) {
            return Err(DecodeError::new("missing end-of-image marker"));
        }
        let (width, height) = frame_size(jpeg)?;
        Ok(DecodedImage {
            width,
            height,
            data: Bytes::copy_from_slice(jpeg),
        })
    }
}

/// Reports one `"jpeg"` candidate for every decodable frame.
#[derive(Debug, Clone, Copy)]
pub struct ProbeDetector {
    pub confidence: f32,
}

impl Default for ProbeDetector {
    fn default() -> Self {
        Self { confidence: 1.0 }
    }
}

impl ObjectDetector for ProbeDetector {
    fn detect(&self, image: &DecodedImage) -> Vec<DetectionCandidate> {
        if image.width == 0 || image.height == 0 {
            return Vec::new();
        }
        vec![DetectionCandidate::new(PROBE_LABEL, self.confidence)]
    }
}

fn is_start_of_frame(marker: u8) -> bool {
    matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC)
}

fn frame_size(jpeg: &[u8]) -> Result<(u32, u32), DecodeError> {
    let mut pos = SOI.len();
    while pos + 4 <= jpeg.len() {
        if jpeg[pos] != 0xFF {
            return Err(DecodeError::new(format!("expected marker at offset {pos}")));
        }
        let marker = jpeg[pos + 1];
        if marker == 0xFF {
            // Fill byte.
            pos += 1;
            continue;
        }
        if marker == SOS || marker == EOI[1] {
            break;
        }

        let len = u16::from_be_bytes([jpeg[pos + 2], jpeg[pos + 3]]) as usize;
        if len < 2 || pos + 2 + len > jpeg.len() {
            return Err(DecodeError::new(format!(
                "segment 0x{marker:02X} overruns payload"
            )));
        }
        if is_start_of_frame(marker) {
            let segment = &jpeg[pos + 4..pos + 2 + len];
            if segment.len() < 5 {
                return Err(DecodeError::new("truncated start-of-frame segment"));
            }
            let height = u16::from_be_bytes([segment[1], segment[2]]) as u32;
            let width = u16::from_be_bytes([segment[3], segment[4]]) as u32;
            return Ok((width, height));
        }
        pos += 2 + len;
    }
    Err(DecodeError::new("no start-of-frame segment"))
}

/// Build a small JPEG-shaped payload: SOI, baseline SOF, a comment carrying
/// `sequence`, and EOI. Not a decodable image, but it passes [`JpegProbe`].
pub fn synthetic_jpeg(sequence: u32, width: u16, height: u16) -> Vec<u8> {
    let comment = format!("camlink synthetic frame {sequence}");
    let mut out = Vec::with_capacity(32 + comment.len());
    out.extend_from_slice(&SOI);

    // SOF0: precision, height, width, 3 components.
    out.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x11, 0x08]);
    out.extend_from_slice(&height.to_be_bytes());
    out.extend_from_slice(&width.to_be_bytes());
    out.extend_from_slice(&[0x03, 0x01, 0x22, 0x00, 0x02, 0x11, 0x01, 0x03, 0x11, 0x01]);

    out.extend_from_slice(&[0xFF, 0xFE]);
    out.extend_from_slice(&((comment.len() + 2) as u16).to_be_bytes());
    out.extend_from_slice(comment.as_bytes());

    out.extend_from_slice(&EOI);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_frames_probe_cleanly() {
        let jpeg = synthetic_jpeg(7, 160, 120);
        let image = JpegProbe.decode(&jpeg).unwrap();
        assert_eq!((image.width, image.height), (160, 120));

        let candidates = ProbeDetector::default().detect(&image);
        assert_eq!(candidates, vec![DetectionCandidate::new("jpeg", 1.0)]);
    }

    #[test]
    fn rejects_missing_markers() {
        let jpeg = synthetic_jpeg(1, 8, 8);
        assert!(JpegProbe.decode(&jpeg[2..]).is_err());
        assert!(JpegProbe.decode(&jpeg[..jpeg.len() - 2]).is_err());
        assert!(JpegProbe.decode(b"hello").is_err());
    }

    #[test]
    fn rejects_overrunning_segment() {
        let mut jpeg = synthetic_jpeg(1, 8, 8);
        jpeg[5] = 0xF0;
        assert!(JpegProbe.decode(&jpeg).is_err());
    }

    #[test]
    fn comment_before_sof_is_skipped() {
        let mut jpeg = SOI.to_vec();
        jpeg.extend_from_slice(&[0xFF, 0xFE, 0x00, 0x04, b'h', b'i']);
        jpeg.extend_from_slice(&synthetic_jpeg(0, 320, 240)[2..]);
        let image = JpegProbe.decode(&jpeg).unwrap();
        assert_eq!((image.width, image.height), (320, 240));
    }

    #[test]
    fn pipeline_with_probe_reports_jpeg() {
        let pipeline = camlink_session::DetectionPipeline::new(JpegProbe, ProbeDetector::default());
        let result = pipeline
            .analyze(&synthetic_jpeg(3, 160, 120), 42)
            .unwrap()
            .unwrap();
        assert_eq!(result.label, "jpeg");
        assert_eq!(result.description, "Object jpeg (confidence 100%)");
    }
}
