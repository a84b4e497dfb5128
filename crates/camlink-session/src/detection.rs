//! Detection collaborators.
//!
//! The session hands every validated JPEG to a [`DetectionPipeline`], which
//! decodes it with an [`ImageDecoder`], runs an [`ObjectDetector`] over the
//! result and turns the best candidate into a user-facing description.

use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

/// Default minimum confidence for a candidate to be reported.
pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.5;

/// A decoded camera image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    /// Decoder-specific pixel data.
    pub data: Bytes,
}

/// One labelled guess from the detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionCandidate {
    pub label: String,
    /// Score in `0.0..=1.0`.
    pub confidence: f32,
}

impl DetectionCandidate {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// The detection reported for a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub label: String,
    pub confidence: f32,
    /// Rendered description, also sent back to the device.
    pub description: String,
    /// Capture time on the device, in milliseconds.
    pub source_timestamp: u32,
}

/// Turns JPEG bytes into an image.
pub trait ImageDecoder: Send + Sync + 'static {
    fn decode(&self, jpeg: &[u8]) -> Result<DecodedImage, DecodeError>;
}

impl<F> ImageDecoder for F
where
    F: Fn(&[u8]) -> Result<DecodedImage, DecodeError> + Send + Sync + 'static,
{
    fn decode(&self, jpeg: &[u8]) -> Result<DecodedImage, DecodeError> {
        self(jpeg)
    }
}

/// Finds objects in a decoded image.
pub trait ObjectDetector: Send + Sync + 'static {
    fn detect(&self, image: &DecodedImage) -> Vec<DetectionCandidate>;
}

impl<F> ObjectDetector for F
where
    F: Fn(&DecodedImage) -> Vec<DetectionCandidate> + Send + Sync + 'static,
{
    fn detect(&self, image: &DecodedImage) -> Vec<DetectionCandidate> {
        self(image)
    }
}

/// Maps detector labels to human-readable descriptions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DescriptionTable {
    entries: HashMap<String, String>,
}

impl DescriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Descriptions for the everyday objects the stock detector model knows.
    pub fn common_objects() -> Self {
        [
            ("person", "Person detected."),
            ("cup", "Cup: a container for liquids."),
            ("bottle", "Bottle identified."),
            ("cell phone", "Cell phone present."),
        ]
        .into_iter()
        .collect()
    }

    pub fn with_entry(mut self, label: impl Into<String>, description: impl Into<String>) -> Self {
        self.insert(label, description);
        self
    }

    pub fn insert(&mut self, label: impl Into<String>, description: impl Into<String>) {
        self.entries.insert(label.into(), description.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Description for `label`, or `"Object {label}"` when unknown.
    pub fn describe(&self, label: &str) -> String {
        match self.entries.get(label) {
            Some(description) => description.clone(),
            None => format!("Object {label}"),
        }
    }

    /// `"{description} (confidence {pct}%)"`, percentage truncated.
    pub fn render(&self, label: &str, confidence: f32) -> String {
        let pct = (confidence.clamp(0.0, 1.0) * 100.0) as u32;
        format!("{} (confidence {pct}%)", self.describe(label))
    }
}

impl<L, D> FromIterator<(L, D)> for DescriptionTable
where
    L: Into<String>,
    D: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (L, D)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(label, description)| (label.into(), description.into()))
                .collect(),
        }
    }
}

/// Decode, detect and describe.
pub struct DetectionPipeline {
    decoder: Box<dyn ImageDecoder>,
    detector: Box<dyn ObjectDetector>,
    descriptions: DescriptionTable,
    score_threshold: f32,
}

impl DetectionPipeline {
    pub fn new(decoder: impl ImageDecoder, detector: impl ObjectDetector) -> Self {
        Self {
            decoder: Box::new(decoder),
            detector: Box::new(detector),
            descriptions: DescriptionTable::default(),
            score_threshold: DEFAULT_SCORE_THRESHOLD,
        }
    }

    pub fn with_descriptions(mut self, descriptions: DescriptionTable) -> Self {
        self.descriptions = descriptions;
        self
    }

    pub fn with_score_threshold(mut self, threshold: f32) -> Self {
        self.score_threshold = threshold;
        self
    }

    pub fn score_threshold(&self) -> f32 {
        self.score_threshold
    }

    pub fn descriptions(&self) -> &DescriptionTable {
        &self.descriptions
    }

    /// Analyze one frame payload.
    ///
    /// `Ok(None)` means the image decoded but nothing scored at or above the
    /// threshold.
    pub fn analyze(
        &self,
        payload: &[u8],
        source_timestamp: u32,
    ) -> Result<Option<DetectionResult>, DecodeError> {
        let image = self.decoder.decode(payload)?;
        let best = self
            .detector
            .detect(&image)
            .into_iter()
            .filter(|c| c.confidence >= self.score_threshold)
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence));

        Ok(best.map(|candidate| DetectionResult {
            description: self
                .descriptions
                .render(&candidate.label, candidate.confidence),
            label: candidate.label,
            confidence: candidate.confidence,
            source_timestamp,
        }))
    }
}

impl fmt::Debug for DetectionPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetectionPipeline")
            .field("descriptions", &self.descriptions.len())
            .field("score_threshold", &self.score_threshold)
            .finish_non_exhaustive()
    }
}
