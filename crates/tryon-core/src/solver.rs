//! Landmark-to-transform solver.
//!
//! Places an eyewear model over the eye region from a single face-mesh
//! landmark set. Stateless: identical inputs always give identical output.

use crate::adjustment::{AdjustmentKey, ManualAdjustment};
use crate::landmarks::{
    LandmarkSet, FOREHEAD, LEFT_EYE_INNER, LEFT_EYE_OUTER, LEFT_TEMPLE, NOSE_BRIDGE, NOSE_TIP,
    RIGHT_EYE_INNER, RIGHT_EYE_OUTER, RIGHT_TEMPLE,
};
use crate::types::{Point3, RawTransform, Transform, Vec3, Viewport};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

// Hard output bounds. Not part of `Calibration`: every provider gets the same clamps.
pub const MIN_AUTO_SCALE: f32 = 0.6;
pub const MAX_AUTO_SCALE: f32 = 2.0;
pub const MIN_DEPTH_FACTOR: f32 = 0.8;
pub const MAX_DEPTH_FACTOR: f32 = 1.3;
pub const MAX_YAW: f32 = 0.6;
pub const MAX_PITCH: f32 = 0.4;

/// Empirical constants tied to the landmark model's coordinate conventions.
///
/// Defaults are tuned for a MediaPipe-style 468-point face mesh; re-tune
/// them when switching landmark providers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Calibration {
    /// Inner-eye-corner distance that maps to unit scale.
    pub baseline_eye_distance: f32,
    /// Temple-to-temple distance that maps to unit scale.
    pub baseline_temple_distance: f32,
    /// Share of the eye-distance estimate in the blended scale (rest is temples).
    pub eye_weight: f32,
    pub gain: f32,
    /// Depth factor change per unit of forehead/nose-tip z difference.
    pub depth_sensitivity: f32,
    /// Upward shift of the anchor from the nose bridge, normalized Y.
    pub bridge_lift: f32,
    pub yaw_gain: f32,
    pub pitch_gain: f32,
    /// Forehead-to-bridge vertical gap of a level head.
    pub pitch_offset: f32,
    pub temple_roll_weight: f32,
    /// Temple span relative to the outer-eye span, used when temples are missing.
    pub temple_fallback_ratio: f32,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            baseline_eye_distance: 0.065,
            baseline_temple_distance: 0.12,
            eye_weight: 0.7,
            gain: 2.5,
            depth_sensitivity: 3.0,
            bridge_lift: 0.01,
            yaw_gain: 1.5,
            pitch_gain: 2.0,
            pitch_offset: 0.08,
            temple_roll_weight: 0.3,
            temple_fallback_ratio: 1.25,
        }
    }
}

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("failed to read calibration {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("bad calibration TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid calibration: {0}")]
    Invalid(String),
}

impl Calibration {
    pub fn from_toml_str(src: &str) -> Result<Self, CalibrationError> {
        let calibration: Calibration = toml::from_str(src)?;
        calibration.validate()?;
        Ok(calibration)
    }

    pub fn load(path: &Path) -> Result<Self, CalibrationError> {
        let src = std::fs::read_to_string(path).map_err(|source| CalibrationError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let calibration = Self::from_toml_str(&src)?;
        tracing::info!(path = %path.display(), "loaded solver calibration");
        Ok(calibration)
    }

    pub fn validate(&self) -> Result<(), CalibrationError> {
        if !(self.baseline_eye_distance > 0.0 && self.baseline_temple_distance > 0.0) {
            return Err(CalibrationError::Invalid(
                "baseline distances must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.eye_weight) {
            return Err(CalibrationError::Invalid(
                "eye_weight must be within [0, 1]".into(),
            ));
        }
        let all = [
            self.gain,
            self.depth_sensitivity,
            self.bridge_lift,
            self.yaw_gain,
            self.pitch_gain,
            self.pitch_offset,
            self.temple_roll_weight,
            self.temple_fallback_ratio,
        ];
        if all.iter().any(|v| !v.is_finite()) {
            return Err(CalibrationError::Invalid("constants must be finite".into()));
        }
        Ok(())
    }
}

/// Solve with the default calibration.
pub fn solve(
    landmarks: Option<&LandmarkSet>,
    viewport: Viewport,
    adjustments: &ManualAdjustment,
) -> Option<RawTransform> {
    solve_with(&Calibration::default(), landmarks, viewport, adjustments)
}

/// Compute the raw overlay transform for one landmark set.
///
/// Returns `None` when the set is absent, has fewer than 468 points, or lacks
/// the nose bridge or an inner eye corner. Callers skip the frame.
pub fn solve_with(
    cal: &Calibration,
    landmarks: Option<&LandmarkSet>,
    viewport: Viewport,
    adjustments: &ManualAdjustment,
) -> Option<RawTransform> {
    let landmarks = landmarks.filter(|l| l.is_complete())?;

    let bridge = landmarks.point(NOSE_BRIDGE)?;
    let right_inner = landmarks.point(RIGHT_EYE_INNER)?;
    let left_inner = landmarks.point(LEFT_EYE_INNER)?;
    let outer = landmarks
        .point(RIGHT_EYE_OUTER)
        .zip(landmarks.point(LEFT_EYE_OUTER));
    let temples = landmarks.point(RIGHT_TEMPLE).zip(landmarks.point(LEFT_TEMPLE));
    let nose_tip = landmarks.point(NOSE_TIP);
    let forehead = landmarks.point(FOREHEAD);

    let eye_distance = right_inner.planar_distance(&left_inner);
    let temple_distance = match (temples, outer) {
        (Some((r, l)), _) => r.planar_distance(&l),
        (None, Some((r, l))) => r.planar_distance(&l) * cal.temple_fallback_ratio,
        (None, None) => eye_distance * cal.baseline_temple_distance / cal.baseline_eye_distance,
    };

    let face_depth = match (forehead, nose_tip) {
        (Some(f), Some(t)) => f.z - t.z,
        _ => 0.0,
    };
    let depth_factor =
        (1.0 + face_depth * cal.depth_sensitivity).clamp(MIN_DEPTH_FACTOR, MAX_DEPTH_FACTOR);

    let eye_scale = eye_distance / cal.baseline_eye_distance;
    let temple_scale = temple_distance / cal.baseline_temple_distance;
    let blended = cal.eye_weight * eye_scale + (1.0 - cal.eye_weight) * temple_scale;
    let auto_scale = (blended * depth_factor * cal.gain).clamp(MIN_AUTO_SCALE, MAX_AUTO_SCALE);
    let scale = auto_scale * adjustments.get(AdjustmentKey::Scale);

    let anchor_y = bridge.y - cal.bridge_lift;
    let position = Vec3::new(
        -(bridge.x - 0.5) * viewport.width + adjustments.get(AdjustmentKey::OffsetX),
        -(anchor_y - 0.5) * viewport.height + adjustments.get(AdjustmentKey::OffsetY),
        adjustments.get(AdjustmentKey::OffsetZ),
    );

    let eye_roll = level_angle(&right_inner, &left_inner);
    let temple_roll = temples.map_or(0.0, |(r, l)| level_angle(&r, &l));
    // Image Y points down, scene Y points up.
    let roll = -(eye_roll + cal.temple_roll_weight * temple_roll);

    let yaw = nose_tip.map_or(0.0, |tip| {
        ((tip.x - bridge.x) * cal.yaw_gain).clamp(-MAX_YAW, MAX_YAW)
    });
    let pitch = forehead.map_or(0.0, |f| {
        (((bridge.y - f.y) - cal.pitch_offset) * cal.pitch_gain).clamp(-MAX_PITCH, MAX_PITCH)
    });

    let rotation = Vec3::new(
        pitch + adjustments.get(AdjustmentKey::RotationX),
        yaw + adjustments.get(AdjustmentKey::RotationY),
        roll + adjustments.get(AdjustmentKey::RotationZ),
    );

    Some(RawTransform {
        transform: Transform {
            position,
            scale,
            rotation,
        },
        auto_scale,
        eye_distance,
        face_depth,
    })
}

/// Angle of the segment between two points, folded so the segment always
/// points towards +x. Keeps roll near zero for level features regardless of
/// which side of the image each landmark lands on (mirrored feeds).
fn level_angle(a: &Point3, b: &Point3) -> f32 {
    let (mut dx, mut dy) = (b.x - a.x, b.y - a.y);
    if dx < 0.0 {
        dx = -dx;
        dy = -dy;
    }
    dy.atan2(dx)
}
