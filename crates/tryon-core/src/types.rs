use serde::{Deserialize, Serialize};

/// A single face-mesh landmark: x/y normalized to [0, 1] within the frame,
/// z relative depth (smaller = closer to the camera).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Planar (x, y) Euclidean distance in normalized landmark space.
    pub fn planar_distance(&self, other: &Point3) -> f32 {
        ((other.x - self.x).powi(2) + (other.y - self.y).powi(2)).sqrt()
    }
}

/// Scene-space vector (Y up, origin at viewport centre).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Apply `f` to each component pair.
    pub fn zip_map(self, other: Vec3, mut f: impl FnMut(f32, f32) -> f32) -> Vec3 {
        Vec3 {
            x: f(self.x, other.x),
            y: f(self.y, other.y),
            z: f(self.z, other.z),
        }
    }
}

/// Viewport size in scene units (typically the rendered video size in pixels).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Rigid placement of the overlay model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub scale: f32,
    /// Euler angles in radians.
    pub rotation: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            scale: 1.0,
            rotation: Vec3::ZERO,
        }
    }
}

/// Solver output for a single frame, before temporal smoothing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawTransform {
    pub transform: Transform,
    /// Auto-scale before the manual `scale` multiplier, always in [0.6, 2.0].
    pub auto_scale: f32,
    /// Inner-eye-corner distance in normalized landmark space.
    pub eye_distance: f32,
    /// Forehead-to-nose-tip depth difference.
    pub face_depth: f32,
}

/// Tracker output: the transform the renderer actually applies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SmoothedTransform(pub Transform);

impl SmoothedTransform {
    pub fn transform(&self) -> &Transform {
        &self.0
    }
}
