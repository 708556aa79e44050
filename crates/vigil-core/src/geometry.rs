//! Planar geometry over normalized landmark coordinates.

use crate::types::LandmarkPoint;

/// Euclidean distance between two landmarks in the image plane (depth ignored).
pub fn distance(a: LandmarkPoint, b: LandmarkPoint) -> f32 {
    (a.x - b.x).hypot(a.y - b.y)
}
