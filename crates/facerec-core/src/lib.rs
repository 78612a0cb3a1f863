//! facerec-core — face embedding matching and extraction.
//!
//! The matcher is a linear nearest-neighbour scan under a Euclidean distance
//! threshold. Extraction runs SCRFD detection and ArcFace recognition through
//! ONNX Runtime behind the [`EmbeddingExtractor`] trait.

pub mod alignment;
pub mod detector;
pub mod extractor;
pub mod matcher;
pub mod recognizer;
pub mod types;

use std::path::PathBuf;

pub use detector::FaceDetector;
pub use extractor::{EmbeddingExtractor, ExtractError, OnnxExtractor};
pub use matcher::{
    EuclideanMatcher, MatchError, MatchResult, Matcher, DEFAULT_MATCH_THRESHOLD, UNKNOWN_NAME,
};
pub use recognizer::FaceRecognizer;
pub use types::{BoundingBox, Embedding, FaceRecord};

/// Default data directory for the face store and models.
///
/// `$XDG_DATA_HOME/facerec`, falling back to `~/.local/share/facerec`.
pub fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facerec")
}

/// Default directory holding the ONNX model files.
pub fn default_model_dir() -> PathBuf {
    default_data_dir().join("models")
}
