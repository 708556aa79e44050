//! Per-frame analysis: feature extraction followed by classification.

use crate::classifier::{classify, ClassificationResult};
use crate::features::{DetectionConfig, FeatureExtractor};
use crate::types::LandmarkFrame;

/// Owns the extractor state for one monitoring session.
#[derive(Debug, Clone, Default)]
pub struct Analyzer {
    extractor: FeatureExtractor,
}

impl Analyzer {
    pub fn new(config: DetectionConfig) -> Self {
        Self {
            extractor: FeatureExtractor::new(config),
        }
    }

    /// Analyze one frame. `None` means the provider found no face; the
    /// tracked head position is left as it was.
    ///
    /// A mesh missing any required index is treated as no face, so malformed
    /// provider output can never raise an alert.
    pub fn analyze(&mut self, landmarks: Option<&LandmarkFrame>) -> ClassificationResult {
        let features = landmarks
            .filter(|frame| {
                let complete = frame.is_complete();
                if !complete {
                    tracing::debug!(points = frame.len(), "incomplete mesh; treating as no face");
                }
                complete
            })
            .map(|frame| self.extractor.extract(frame));
        classify(features.as_ref())
    }
}
