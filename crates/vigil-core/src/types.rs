use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of points in a refined face mesh (468 surface points + 10 iris points).
pub const MESH_POINTS: usize = 478;

/// Smallest mesh that covers every index the feature extractor reads.
pub const REQUIRED_POINTS: usize = RIGHT_IRIS_CENTER + 1;

// --- Mesh indices used by the feature extractor ---
pub const NOSE_TIP: usize = 1;
pub const LEFT_EYE_OUTER: usize = 33;
pub const LEFT_EYE_INNER: usize = 133;
pub const RIGHT_EYE_INNER: usize = 362;
pub const RIGHT_EYE_OUTER: usize = 263;
pub const LEFT_IRIS_CENTER: usize = 468;
pub const RIGHT_IRIS_CENTER: usize = 473;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LandmarkError {
    #[error("landmark {index} missing (frame has {len} points)")]
    MissingIndex { index: usize, len: usize },
    #[error("incomplete mesh: {len} points, need {required}")]
    Incomplete { len: usize, required: usize },
    #[error("malformed landmark record: {0}")]
    Malformed(String),
}

/// A normalized facial landmark. `x` and `y` lie in [0, 1]; `z` is carried but unused.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LandmarkPoint {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

impl LandmarkPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y, z: 0.0 }
    }
}

/// One face mesh as delivered by the landmark provider.
///
/// Index access is checked: reading past the end of a short mesh yields
/// [`LandmarkError::MissingIndex`] instead of panicking.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkFrame {
    points: Box<[LandmarkPoint]>,
}

impl LandmarkFrame {
    pub fn new(points: Vec<LandmarkPoint>) -> Self {
        Self {
            points: points.into_boxed_slice(),
        }
    }

    /// Build a mesh that is known to cover every index the extractor reads.
    pub fn complete(points: Vec<LandmarkPoint>) -> Result<Self, LandmarkError> {
        if points.len() < REQUIRED_POINTS {
            return Err(LandmarkError::Incomplete {
                len: points.len(),
                required: REQUIRED_POINTS,
            });
        }
        Ok(Self::new(points))
    }

    /// Checked access to a single mesh point.
    pub fn point(&self, index: usize) -> Result<LandmarkPoint, LandmarkError> {
        self.points
            .get(index)
            .copied()
            .ok_or(LandmarkError::MissingIndex {
                index,
                len: self.points.len(),
            })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// True when every index the extractor reads is present.
    pub fn is_complete(&self) -> bool {
        self.points.len() >= REQUIRED_POINTS
    }
}

/// Parse one line of a line-delimited landmark log.
///
/// A record is either `null` (no face), an empty array (no face), or an array of
/// `{"x": .., "y": .., "z": ..}` points. Blank lines are treated as `null`.
/// A non-empty array shorter than [`REQUIRED_POINTS`] is rejected as
/// [`LandmarkError::Incomplete`].
pub fn parse_record(line: &str) -> Result<Option<LandmarkFrame>, LandmarkError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let points: Option<Vec<LandmarkPoint>> =
        serde_json::from_str(line).map_err(|e| LandmarkError::Malformed(e.to_string()))?;
    mesh_from_points(points)
}

/// `None` or an empty array means no face; anything else must be a complete mesh.
pub fn mesh_from_points(
    points: Option<Vec<LandmarkPoint>>,
) -> Result<Option<LandmarkFrame>, LandmarkError> {
    match points {
        Some(points) if !points.is_empty() => LandmarkFrame::complete(points).map(Some),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_in_range() {
        let frame = LandmarkFrame::new(vec![LandmarkPoint::new(0.1, 0.2); 3]);
        assert_eq!(frame.point(2).unwrap(), LandmarkPoint::new(0.1, 0.2));
    }

    #[test]
    fn test_point_missing_index() {
        let frame = LandmarkFrame::new(vec![LandmarkPoint::default(); 10]);
        assert_eq!(
            frame.point(LEFT_IRIS_CENTER),
            Err(LandmarkError::MissingIndex { index: 468, len: 10 })
        );
        assert!(!frame.is_complete());
    }

    #[test]
    fn test_full_mesh_is_complete() {
        let frame = LandmarkFrame::new(vec![LandmarkPoint::default(); MESH_POINTS]);
        assert!(frame.is_complete());
        assert_eq!(REQUIRED_POINTS, 474);
    }

    #[test]
    fn test_parse_record_null_and_blank() {
        assert_eq!(parse_record("null").unwrap(), None);
        assert_eq!(parse_record("   ").unwrap(), None);
        assert_eq!(parse_record("[]").unwrap(), None);
    }

    fn mesh_json(first: &str) -> String {
        let rest = vec![r#"{"x":0.5,"y":0.5}"#; REQUIRED_POINTS - 1].join(",");
        format!("[{first},{rest}]")
    }

    #[test]
    fn test_parse_record_points() {
        let frame = parse_record(&mesh_json(r#"{"x":0.1,"y":0.9,"z":-0.02}"#))
            .unwrap()
            .unwrap();
        assert_eq!(frame.len(), REQUIRED_POINTS);
        assert!(frame.is_complete());
        assert_eq!(frame.point(1).unwrap(), LandmarkPoint::new(0.5, 0.5));
        assert!((frame.point(0).unwrap().z + 0.02).abs() < 1e-6);
    }

    #[test]
    fn test_parse_record_single_point_is_incomplete() {
        assert_eq!(
            parse_record(r#"[{"x":0.5,"y":0.5}]"#),
            Err(LandmarkError::Incomplete {
                len: 1,
                required: REQUIRED_POINTS
            })
        );
    }

    #[test]
    fn test_complete_rejects_one_short() {
        let short = vec![LandmarkPoint::default(); REQUIRED_POINTS - 1];
        assert!(matches!(
            LandmarkFrame::complete(short),
            Err(LandmarkError::Incomplete { len: 473, .. })
        ));
        let exact = vec![LandmarkPoint::default(); REQUIRED_POINTS];
        assert!(LandmarkFrame::complete(exact).is_ok());
    }

    #[test]
    fn test_mesh_from_points_empty_is_no_face() {
        assert_eq!(mesh_from_points(None), Ok(None));
        assert_eq!(mesh_from_points(Some(Vec::new())), Ok(None));
    }

    #[test]
    fn test_parse_record_malformed() {
        assert!(matches!(
            parse_record("{not json"),
            Err(LandmarkError::Malformed(_))
        ));
    }
}
