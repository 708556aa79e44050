//! vigil-core — Facial-signal geometry and surveillance classification.
//!
//! Turns a face mesh (normalized landmarks from an external provider) into
//! eye, gaze and head-movement features, then into a status, threat level
//! and alert kind through fixed rule precedence.

pub mod analyzer;
pub mod classifier;
pub mod features;
pub mod geometry;
pub mod types;

pub use analyzer::Analyzer;
pub use classifier::{classify, AlertKind, ClassificationResult, Status, ThreatLevel};
pub use features::{DetectionConfig, EyeSide, FeatureExtractor, FeatureSet, GazeLabel};
pub use types::{mesh_from_points, parse_record, LandmarkError, LandmarkFrame, LandmarkPoint};
