//! Per-frame feature extraction: eye openness, gaze direction, head displacement.
//!
//! Every extractor fails toward caution. A mesh that is too short reads as
//! closed eyes, an unmeasurable eye reads as [`GazeLabel::Error`] (which counts
//! as extreme), and a missing nose tip reads as "no movement".

use crate::geometry::distance;
use crate::types::{
    LandmarkFrame, LandmarkPoint, LEFT_EYE_INNER, LEFT_EYE_OUTER, LEFT_IRIS_CENTER, NOSE_TIP,
    RIGHT_EYE_INNER, RIGHT_EYE_OUTER, RIGHT_IRIS_CENTER,
};
use serde::{Deserialize, Serialize};
use std::fmt;

// --- Gaze ratio bands (iris offset / eye width) ---
const GAZE_EXTREME_LEFT_BELOW: f32 = 0.25;
const GAZE_LEFT_BELOW: f32 = 0.35;
const GAZE_EXTREME_RIGHT_ABOVE: f32 = 0.75;
const GAZE_RIGHT_ABOVE: f32 = 0.65;

/// Index pairs whose separation must exceed the open threshold, one per eye.
const EYE_OPENNESS_PAIRS: [(usize, usize); 2] = [
    (LEFT_EYE_OUTER, LEFT_EYE_INNER),
    (RIGHT_EYE_INNER, RIGHT_EYE_OUTER),
];

/// Thresholds for the geometric feature tests.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Frame-to-frame nose displacement above which the head counts as moved.
    pub movement_threshold: f32,
    /// Per-eye landmark separation above which the eye counts as open.
    pub eye_open_threshold: f32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            movement_threshold: 0.008,
            eye_open_threshold: 0.0012,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EyeSide {
    Left,
    Right,
}

impl EyeSide {
    /// (first corner, second corner, iris centre) mesh indices.
    fn indices(self) -> (usize, usize, usize) {
        match self {
            EyeSide::Left => (LEFT_EYE_OUTER, LEFT_EYE_INNER, LEFT_IRIS_CENTER),
            EyeSide::Right => (RIGHT_EYE_INNER, RIGHT_EYE_OUTER, RIGHT_IRIS_CENTER),
        }
    }
}

/// Coarse horizontal gaze direction for one eye.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GazeLabel {
    ExtremeLeft,
    Left,
    Center,
    Right,
    ExtremeRight,
    /// The eye could not be measured (short mesh or zero-width eye).
    Error,
}

impl GazeLabel {
    /// Band a gaze ratio. Bands are checked in a fixed order; ratios between
    /// the LEFT and RIGHT bands are CENTER.
    pub fn from_ratio(ratio: f32) -> Self {
        if ratio < GAZE_EXTREME_LEFT_BELOW {
            GazeLabel::ExtremeLeft
        } else if ratio < GAZE_LEFT_BELOW {
            GazeLabel::Left
        } else if ratio > GAZE_EXTREME_RIGHT_ABOVE {
            GazeLabel::ExtremeRight
        } else if ratio > GAZE_RIGHT_ABOVE {
            GazeLabel::Right
        } else {
            GazeLabel::Center
        }
    }

    /// Extreme readings (including unmeasurable eyes) raise suspicion.
    pub fn is_extreme(self) -> bool {
        matches!(
            self,
            GazeLabel::ExtremeLeft | GazeLabel::ExtremeRight | GazeLabel::Error
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GazeLabel::ExtremeLeft => "EXTREME_LEFT",
            GazeLabel::Left => "LEFT",
            GazeLabel::Center => "CENTER",
            GazeLabel::Right => "RIGHT",
            GazeLabel::ExtremeRight => "EXTREME_RIGHT",
            GazeLabel::Error => "ERROR",
        }
    }
}

impl fmt::Display for GazeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Features derived from one landmark frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureSet {
    pub eyes_open: bool,
    pub gaze_left: GazeLabel,
    pub gaze_right: GazeLabel,
    pub head_moved: bool,
    pub movement_magnitude: f32,
}

/// True iff both eyes' landmark separations strictly exceed `threshold`.
pub fn eye_openness(frame: &LandmarkFrame, threshold: f32) -> bool {
    EYE_OPENNESS_PAIRS.iter().all(|&(a, b)| {
        match (frame.point(a), frame.point(b)) {
            (Ok(a), Ok(b)) => distance(a, b) > threshold,
            (Err(e), _) | (_, Err(e)) => {
                tracing::trace!(error = %e, "eye openness unmeasurable");
                false
            }
        }
    })
}

/// Iris offset from the first eye corner, as a fraction of eye width.
///
/// Returns `None` when the eye cannot be measured.
pub fn gaze_ratio(frame: &LandmarkFrame, side: EyeSide) -> Option<f32> {
    let (first, second, iris) = side.indices();
    let corner_a = frame.point(first).ok()?;
    let corner_b = frame.point(second).ok()?;
    let iris = frame.point(iris).ok()?;

    let width = distance(corner_a, corner_b);
    if width == 0.0 {
        return None;
    }
    Some(distance(corner_a, iris) / width)
}

/// Gaze label for one eye; unmeasurable eyes are [`GazeLabel::Error`].
pub fn gaze_direction(frame: &LandmarkFrame, side: EyeSide) -> GazeLabel {
    match gaze_ratio(frame, side) {
        Some(ratio) => GazeLabel::from_ratio(ratio),
        None => {
            tracing::trace!(?side, "gaze unmeasurable");
            GazeLabel::Error
        }
    }
}

/// Stateful extractor. Holds the most recent nose-tip position so head
/// movement is measured frame to frame.
#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor {
    config: DetectionConfig,
    last_nose: Option<LandmarkPoint>,
}

impl FeatureExtractor {
    pub fn new(config: DetectionConfig) -> Self {
        Self {
            config,
            last_nose: None,
        }
    }

    /// Forget the tracked head position.
    pub fn reset(&mut self) {
        self.last_nose = None;
    }

    /// Displacement of the nose tip since the previous call.
    ///
    /// Always replaces the tracked position with the current one. The first
    /// call after construction or [`reset`](Self::reset) only seeds it and
    /// reports `(false, 0.0)`.
    pub fn head_movement(&mut self, frame: &LandmarkFrame) -> (bool, f32) {
        let nose = match frame.point(NOSE_TIP) {
            Ok(p) => p,
            Err(e) => {
                tracing::trace!(error = %e, "nose tip missing");
                return (false, 0.0);
            }
        };

        let Some(previous) = self.last_nose.replace(nose) else {
            return (false, 0.0);
        };

        let magnitude = distance(nose, previous);
        (magnitude > self.config.movement_threshold, magnitude)
    }

    /// Compute the full feature set for one frame.
    pub fn extract(&mut self, frame: &LandmarkFrame) -> FeatureSet {
        let eyes_open = eye_openness(frame, self.config.eye_open_threshold);
        let (head_moved, movement_magnitude) = self.head_movement(frame);
        FeatureSet {
            eyes_open,
            gaze_left: gaze_direction(frame, EyeSide::Left),
            gaze_right: gaze_direction(frame, EyeSide::Right),
            head_moved,
            movement_magnitude,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MESH_POINTS;
    use proptest::prelude::*;

    /// Open eyes, centred irises, nose at (0.5, 0.6).
    fn open_face() -> Vec<LandmarkPoint> {
        let mut points = vec![LandmarkPoint::new(0.5, 0.5); MESH_POINTS];
        points[LEFT_EYE_OUTER] = LandmarkPoint::new(0.30, 0.40);
        points[LEFT_EYE_INNER] = LandmarkPoint::new(0.40, 0.40);
        points[LEFT_IRIS_CENTER] = LandmarkPoint::new(0.35, 0.40);
        points[RIGHT_EYE_INNER] = LandmarkPoint::new(0.60, 0.40);
        points[RIGHT_EYE_OUTER] = LandmarkPoint::new(0.70, 0.40);
        points[RIGHT_IRIS_CENTER] = LandmarkPoint::new(0.65, 0.40);
        points[NOSE_TIP] = LandmarkPoint::new(0.5, 0.6);
        points
    }

    fn with_left_iris_at(x: f32) -> LandmarkFrame {
        let mut points = open_face();
        points[LEFT_IRIS_CENTER] = LandmarkPoint::new(x, 0.40);
        LandmarkFrame::new(points)
    }

    #[test]
    fn test_eyes_open() {
        let frame = LandmarkFrame::new(open_face());
        assert!(eye_openness(&frame, 0.0012));
    }

    #[test]
    fn test_eye_openness_exactly_at_threshold_is_closed() {
        let threshold = 0.0012f32;
        let mut points = open_face();
        points[LEFT_EYE_OUTER] = LandmarkPoint::new(0.3, 0.0);
        points[LEFT_EYE_INNER] = LandmarkPoint::new(0.3, threshold);
        let frame = LandmarkFrame::new(points);
        assert!(!eye_openness(&frame, threshold));
    }

    #[test]
    fn test_one_closed_eye_is_closed() {
        let mut points = open_face();
        points[RIGHT_EYE_OUTER] = points[RIGHT_EYE_INNER];
        assert!(!eye_openness(&LandmarkFrame::new(points), 0.0012));
    }

    #[test]
    fn test_eye_openness_short_mesh_fails_closed() {
        let frame = LandmarkFrame::new(vec![LandmarkPoint::new(0.1, 0.1); 100]);
        assert!(!eye_openness(&frame, 0.0012));
    }

    #[test]
    fn test_gaze_bands() {
        // Left eye spans x = 0.30..0.40, so ratio = (iris_x - 0.30) / 0.1.
        let cases = [
            (0.31, GazeLabel::ExtremeLeft),
            (0.33, GazeLabel::Left),
            (0.35, GazeLabel::Center),
            (0.37, GazeLabel::Right),
            (0.39, GazeLabel::ExtremeRight),
        ];
        for (x, expected) in cases {
            assert_eq!(
                gaze_direction(&with_left_iris_at(x), EyeSide::Left),
                expected,
                "iris at x={x}"
            );
        }
    }

    #[test]
    fn test_gaze_band_edges() {
        assert_eq!(GazeLabel::from_ratio(0.25), GazeLabel::Left);
        assert_eq!(GazeLabel::from_ratio(0.35), GazeLabel::Center);
        assert_eq!(GazeLabel::from_ratio(0.65), GazeLabel::Center);
        assert_eq!(GazeLabel::from_ratio(0.75), GazeLabel::Right);
        assert_eq!(GazeLabel::from_ratio(1.4), GazeLabel::ExtremeRight);
    }

    #[test]
    fn test_extreme_flags() {
        assert!(GazeLabel::ExtremeLeft.is_extreme());
        assert!(GazeLabel::ExtremeRight.is_extreme());
        assert!(GazeLabel::Error.is_extreme());
        assert!(!GazeLabel::Left.is_extreme());
        assert!(!GazeLabel::Center.is_extreme());
        assert!(!GazeLabel::Right.is_extreme());
    }

    #[test]
    fn test_gaze_short_mesh_is_error() {
        let frame = LandmarkFrame::new(vec![LandmarkPoint::new(0.2, 0.3); 470]);
        assert_eq!(gaze_direction(&frame, EyeSide::Left), GazeLabel::Error);
        assert_eq!(gaze_direction(&frame, EyeSide::Right), GazeLabel::Error);
    }

    #[test]
    fn test_head_movement_first_call_seeds() {
        let mut extractor = FeatureExtractor::default();
        let frame = LandmarkFrame::new(open_face());
        assert_eq!(extractor.head_movement(&frame), (false, 0.0));
    }

    #[test]
    fn test_head_movement_stationary() {
        let mut extractor = FeatureExtractor::default();
        let frame = LandmarkFrame::new(open_face());
        extractor.head_movement(&frame);
        assert_eq!(extractor.head_movement(&frame), (false, 0.0));
    }

    #[test]
    fn test_head_movement_is_frame_to_frame() {
        let mut extractor = FeatureExtractor::default();
        let mut points = open_face();
        extractor.head_movement(&LandmarkFrame::new(points.clone()));

        points[NOSE_TIP] = LandmarkPoint::new(0.55, 0.6);
        let (moved, magnitude) = extractor.head_movement(&LandmarkFrame::new(points.clone()));
        assert!(moved);
        assert!((magnitude - 0.05).abs() < 1e-5);

        // Same position again: compared to the previous frame, not the first.
        assert_eq!(
            extractor.head_movement(&LandmarkFrame::new(points)),
            (false, 0.0)
        );
    }

    #[test]
    fn test_head_movement_small_drift_not_moved() {
        let mut extractor = FeatureExtractor::default();
        let mut points = open_face();
        extractor.head_movement(&LandmarkFrame::new(points.clone()));
        points[NOSE_TIP] = LandmarkPoint::new(0.504, 0.6);
        let (moved, magnitude) = extractor.head_movement(&LandmarkFrame::new(points));
        assert!(!moved);
        assert!(magnitude > 0.0);
    }

    #[test]
    fn test_reset_forgets_head_position() {
        let mut extractor = FeatureExtractor::default();
        let mut points = open_face();
        extractor.head_movement(&LandmarkFrame::new(points.clone()));
        extractor.reset();
        points[NOSE_TIP] = LandmarkPoint::new(0.9, 0.9);
        assert_eq!(
            extractor.head_movement(&LandmarkFrame::new(points)),
            (false, 0.0)
        );
    }

    #[test]
    fn test_extract_open_centred_face() {
        let mut extractor = FeatureExtractor::default();
        let features = extractor.extract(&LandmarkFrame::new(open_face()));
        assert!(features.eyes_open);
        assert_eq!(features.gaze_left, GazeLabel::Center);
        assert_eq!(features.gaze_right, GazeLabel::Center);
        assert!(!features.head_moved);
    }

    proptest! {
        #[test]
        fn degenerate_eye_is_error_never_center(
            cx in 0.0f32..1.0, cy in 0.0f32..1.0,
            ix in 0.0f32..1.0, iy in 0.0f32..1.0,
        ) {
            let mut points = open_face();
            points[LEFT_EYE_OUTER] = LandmarkPoint::new(cx, cy);
            points[LEFT_EYE_INNER] = LandmarkPoint::new(cx, cy);
            points[LEFT_IRIS_CENTER] = LandmarkPoint::new(ix, iy);
            let label = gaze_direction(&LandmarkFrame::new(points), EyeSide::Left);
            prop_assert_eq!(label, GazeLabel::Error);
            prop_assert!(label.is_extreme());
        }

        #[test]
        fn measurable_eye_is_never_error(ratio in 0.0f32..2.0) {
            prop_assert_ne!(GazeLabel::from_ratio(ratio), GazeLabel::Error);
        }
    }
}
