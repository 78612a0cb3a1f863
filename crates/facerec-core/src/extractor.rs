//! Image bytes to face embedding.

use crate::alignment;
use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::Embedding;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Maps raw image bytes to a face embedding.
///
/// `Ok(None)` means the image holds no usable face.
pub trait EmbeddingExtractor: Send {
    fn extract(&mut self, image_bytes: &[u8]) -> Result<Option<Embedding>, ExtractError>;
}

/// SCRFD + ArcFace extractor.
///
/// Embeds the most confident face; other faces in the image are ignored.
pub struct OnnxExtractor {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxExtractor {
    pub fn new(detector: FaceDetector, recognizer: FaceRecognizer) -> Self {
        Self {
            detector,
            recognizer,
        }
    }

    /// Load both models, failing fast if either file is missing.
    pub fn load(scrfd_path: &Path, arcface_path: &Path) -> Result<Self, ExtractError> {
        let detector = FaceDetector::load(scrfd_path)?;
        let recognizer = FaceRecognizer::load(arcface_path)?;
        Ok(Self::new(detector, recognizer))
    }
}

impl EmbeddingExtractor for OnnxExtractor {
    fn extract(&mut self, image_bytes: &[u8]) -> Result<Option<Embedding>, ExtractError> {
        // Undecodable uploads count as "no face", matching what clients already expect.
        let img = match image::load_from_memory(image_bytes) {
            Ok(img) => img.to_rgb8(),
            Err(e) => {
                tracing::warn!(error = %e, bytes = image_bytes.len(), "could not decode image");
                return Ok(None);
            }
        };

        let faces = self.detector.detect(&img)?;
        let Some(face) = faces.first() else {
            tracing::debug!(width = img.width(), height = img.height(), "no face detected");
            return Ok(None);
        };
        let Some(landmarks) = face.landmarks.as_ref() else {
            tracing::debug!(confidence = face.confidence, "face without landmarks");
            return Ok(None);
        };

        tracing::debug!(
            faces = faces.len(),
            confidence = face.confidence,
            "embedding most confident face"
        );

        let aligned = alignment::align_face(&img, landmarks);
        let embedding = self.recognizer.embed(&aligned)?;
        Ok(Some(embedding))
    }
}
