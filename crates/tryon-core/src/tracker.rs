//! Temporal smoothing of solver output.
//!
//! Exponential moving average with a small velocity-based lead. The smoothed
//! value (not the raw one) is fed back as the next frame's baseline, so
//! smoothing compounds across frames.

use crate::types::{RawTransform, SmoothedTransform, Transform, Vec3};
use serde::{Deserialize, Serialize};

/// Smoothing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Fraction of the raw-vs-previous delta applied each frame.
    pub smoothing_factor: f32,
    /// Applied to the frame delta to estimate velocity.
    pub velocity_damping: f32,
    /// Weight of the velocity estimate added as a predictive lead.
    pub velocity_lead: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            smoothing_factor: 0.7,
            velocity_damping: 0.85,
            velocity_lead: 0.1,
        }
    }
}

/// Per-axis velocity of the transform: 3 position, 1 scale, 3 rotation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TransformVelocity {
    pub position: Vec3,
    pub scale: f32,
    pub rotation: Vec3,
}

/// Motion smoother. One instance per active session; reset whenever the
/// context it was built for (camera, model, user reset) changes.
#[derive(Debug, Clone)]
pub struct MotionTracker {
    config: TrackerConfig,
    previous: Option<Transform>,
    velocity: TransformVelocity,
}

impl Default for MotionTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl MotionTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            previous: None,
            velocity: TransformVelocity::default(),
        }
    }

    /// Feed one raw transform and get the stabilized one.
    pub fn update(&mut self, raw: &RawTransform) -> SmoothedTransform {
        let current = raw.transform;
        let Some(prev) = self.previous else {
            self.previous = Some(current);
            self.velocity = TransformVelocity::default();
            return SmoothedTransform(current);
        };

        let TrackerConfig {
            smoothing_factor,
            velocity_damping,
            velocity_lead,
        } = self.config;

        let velocity = TransformVelocity {
            position: current
                .position
                .zip_map(prev.position, |c, p| (c - p) * velocity_damping),
            scale: (current.scale - prev.scale) * velocity_damping,
            rotation: current
                .rotation
                .zip_map(prev.rotation, |c, p| (c - p) * velocity_damping),
        };

        let step = |c: f32, p: f32, v: f32| p + (c - p) * smoothing_factor + v * velocity_lead;

        let smoothed = Transform {
            position: Vec3::new(
                step(current.position.x, prev.position.x, velocity.position.x),
                step(current.position.y, prev.position.y, velocity.position.y),
                step(current.position.z, prev.position.z, velocity.position.z),
            ),
            scale: step(current.scale, prev.scale, velocity.scale),
            rotation: Vec3::new(
                step(current.rotation.x, prev.rotation.x, velocity.rotation.x),
                step(current.rotation.y, prev.rotation.y, velocity.rotation.y),
                step(current.rotation.z, prev.rotation.z, velocity.rotation.z),
            ),
        };

        self.previous = Some(smoothed);
        self.velocity = velocity;
        SmoothedTransform(smoothed)
    }

    /// Drop all history. Safe to call repeatedly.
    pub fn reset(&mut self) {
        self.previous = None;
        self.velocity = TransformVelocity::default();
    }

    pub fn is_primed(&self) -> bool {
        self.previous.is_some()
    }

    pub fn velocity(&self) -> &TransformVelocity {
        &self.velocity
    }
}
