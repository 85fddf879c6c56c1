//! tryon-core: Geometry and tracking engine for eyewear try-on.
//!
//! Maps 468-point face-mesh landmarks to a rigid transform for an overlay
//! model, and stabilizes that transform across frames.

pub mod adjustment;
pub mod detector;
pub mod landmarks;
pub mod mesh;
pub mod provider;
pub mod quality;
pub mod solver;
pub mod tracker;
pub mod types;

pub use adjustment::{AdjustmentError, AdjustmentKey, ManualAdjustment};
pub use landmarks::LandmarkSet;
pub use detector::{FaceBox, FaceDetector};
pub use mesh::{FaceMesh, FaceRegion};
pub use provider::{LandmarkProvider, ProviderError};
pub use quality::{FaceEvent, FpsMeter, QualityTracker, TrackingQuality};
pub use solver::{solve, solve_with, Calibration, CalibrationError};
pub use tracker::{MotionTracker, TrackerConfig};
pub use types::{Point3, RawTransform, SmoothedTransform, Transform, Vec3, Viewport};
