//! Nearest-embedding matching under a Euclidean distance threshold.

use crate::types::{Embedding, FaceRecord};
use thiserror::Error;

/// Maximum distance accepted as a match. Tuned for 128-d dlib embeddings;
/// re-validate when switching extraction models.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.6;

/// Name reported when no stored face is close enough.
pub const UNKNOWN_NAME: &str = "Unknown";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    #[error("embedding dimension mismatch for record {record_id}: expected {expected}, got {actual}")]
    DimensionMismatch {
        record_id: i64,
        expected: usize,
        actual: usize,
    },
}

/// Result of matching a probe embedding against the gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub matched: bool,
    /// Distance to the closest record; `None` when the gallery was empty.
    pub distance: Option<f32>,
    /// ID of the closest record (set even when it is beyond the threshold).
    pub record_id: Option<i64>,
    /// Name of the matched record, only set when `matched`.
    pub name: Option<String>,
}

impl MatchResult {
    fn empty() -> Self {
        Self {
            matched: false,
            distance: None,
            record_id: None,
            name: None,
        }
    }

    /// The matched name, or [`UNKNOWN_NAME`].
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(UNKNOWN_NAME)
    }

    /// `1 - distance`, unclamped. An empty gallery reports 0.0.
    pub fn confidence(&self) -> f32 {
        match self.distance {
            Some(distance) => 1.0 - distance,
            None => 0.0,
        }
    }
}

/// Strategy for comparing a probe embedding against a gallery of registered faces.
pub trait Matcher {
    fn compare(&self, probe: &Embedding, gallery: &[FaceRecord]) -> Result<MatchResult, MatchError>;
}

/// Linear-scan Euclidean matcher.
///
/// Equal distances resolve to the lowest record id, whatever order the
/// gallery arrives in.
#[derive(Debug, Clone, Copy)]
pub struct EuclideanMatcher {
    pub threshold: f32,
}

impl Default for EuclideanMatcher {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }
}

impl EuclideanMatcher {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl Matcher for EuclideanMatcher {
    fn compare(&self, probe: &Embedding, gallery: &[FaceRecord]) -> Result<MatchResult, MatchError> {
        let mut best: Option<(f32, &FaceRecord)> = None;

        for record in gallery {
            if record.embedding.dim() != probe.dim() {
                return Err(MatchError::DimensionMismatch {
                    record_id: record.id,
                    expected: probe.dim(),
                    actual: record.embedding.dim(),
                });
            }

            let distance = probe.euclidean_distance(&record.embedding);
            let closer = match best {
                None => true,
                Some((best_distance, best_record)) => {
                    distance < best_distance
                        || (distance == best_distance && record.id < best_record.id)
                }
            };
            if closer {
                best = Some((distance, record));
            }
        }

        let Some((distance, record)) = best else {
            return Ok(MatchResult::empty());
        };

        let matched = distance <= self.threshold;
        tracing::debug!(
            distance,
            record_id = record.id,
            matched,
            gallery = gallery.len(),
            "closest face"
        );

        Ok(MatchResult {
            matched,
            distance: Some(distance),
            record_id: Some(record.id),
            name: matched.then(|| record.name.clone()),
        })
    }
}
