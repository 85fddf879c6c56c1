//! Face-mesh landmark set and the semantic indices the solver relies on.

use crate::types::Point3;
use serde::{Deserialize, Serialize};

/// Number of points in a full face-mesh landmark set.
pub const FACE_MESH_POINTS: usize = 468;

pub const NOSE_TIP: usize = 1;
pub const FOREHEAD: usize = 10;
pub const RIGHT_EYE_OUTER: usize = 33;
pub const RIGHT_EYE_INNER: usize = 133;
pub const NOSE_BRIDGE: usize = 168;
pub const RIGHT_TEMPLE: usize = 234;
pub const LEFT_EYE_OUTER: usize = 263;
pub const LEFT_EYE_INNER: usize = 362;
pub const LEFT_TEMPLE: usize = 454;

/// Landmarks produced by one processed video frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LandmarkSet {
    points: Vec<Point3>,
}

impl LandmarkSet {
    pub fn new(points: Vec<Point3>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// True when the set has at least [`FACE_MESH_POINTS`] points.
    pub fn is_complete(&self) -> bool {
        self.points.len() >= FACE_MESH_POINTS
    }

    /// Point at `index`, or `None` if the index is out of range or the point
    /// is non-finite. Coordinates past the frame edge are kept.
    pub fn point(&self, index: usize) -> Option<Point3> {
        self.points.get(index).copied().filter(Point3::is_finite)
    }

    pub fn points(&self) -> &[Point3] {
        &self.points
    }
}

impl From<Vec<Point3>> for LandmarkSet {
    fn from(points: Vec<Point3>) -> Self {
        Self::new(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_out_of_range() {
        let set = LandmarkSet::new(vec![Point3::new(0.5, 0.5, 0.0)]);
        assert!(set.point(0).is_some());
        assert!(set.point(1).is_none());
        assert!(!set.is_complete());
    }

    #[test]
    fn test_non_finite_point_is_missing() {
        let mut points = vec![Point3::default(); FACE_MESH_POINTS];
        points[RIGHT_TEMPLE] = Point3::new(f32::NAN, 0.5, 0.0);
        let set = LandmarkSet::new(points);
        assert!(set.is_complete());
        assert!(set.point(RIGHT_TEMPLE).is_none());
        assert!(set.point(LEFT_TEMPLE).is_some());
    }

    #[test]
    fn test_point_past_frame_edge_is_kept() {
        let set = LandmarkSet::new(vec![Point3::new(-0.02, 1.05, 0.0)]);
        assert_eq!(set.point(0), Some(Point3::new(-0.02, 1.05, 0.0)));
    }

    #[test]
    fn test_deserialize_from_point_array() {
        let json = r#"[{"x":0.1,"y":0.2,"z":-0.01},{"x":0.3,"y":0.4,"z":0.0}]"#;
        let set: LandmarkSet = serde_json::from_str(json).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.point(1), Some(Point3::new(0.3, 0.4, 0.0)));
    }
}
