use std::path::PathBuf;
use std::time::Duration;
use tryon_core::Calibration;
use tryon_hw::{FacingMode, StreamConstraints};

use crate::catalog::Catalog;
use crate::error::SessionError;
use crate::session::SessionOptions;

/// Session configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// V4L2 device for the user-facing camera (default: /dev/video0).
    pub front_device: String,
    /// V4L2 device for the environment-facing camera, if any.
    pub rear_device: Option<String>,
    /// Face-mesh ONNX model.
    pub mesh_model: PathBuf,
    /// SCRFD face detector ONNX model that locates the crop for the mesh.
    pub detector_model: PathBuf,
    /// Catalog file; the built-in catalog is used when unset.
    pub catalog_path: Option<PathBuf>,
    /// Base directory for built-in catalog assets.
    pub asset_dir: PathBuf,
    /// Solver calibration TOML; defaults when unset.
    pub calibration_path: Option<PathBuf>,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Number of warmup frames to discard after opening the camera (AGC/AE stabilization).
    pub warmup_frames: usize,
    /// Text stamped on captured snapshots.
    pub watermark: String,
    pub capture_dir: PathBuf,
}

impl Config {
    /// Load configuration from `TRYON_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            front_device: non_empty("TRYON_FRONT_DEVICE").unwrap_or_else(|| "/dev/video0".into()),
            rear_device: non_empty("TRYON_REAR_DEVICE"),
            mesh_model: non_empty("TRYON_MESH_MODEL")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("models/face_mesh.onnx")),
            detector_model: non_empty("TRYON_DETECTOR_MODEL")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("models/det_10g.onnx")),
            catalog_path: non_empty("TRYON_CATALOG").map(PathBuf::from),
            asset_dir: non_empty("TRYON_ASSET_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("assets")),
            calibration_path: non_empty("TRYON_CALIBRATION").map(PathBuf::from),
            width: parsed("TRYON_WIDTH").map_or(1280, |v| v as u32),
            height: parsed("TRYON_HEIGHT").map_or(720, |v| v as u32),
            fps: parsed("TRYON_FPS").filter(|&v| v > 0).map_or(30, |v| v as u32),
            warmup_frames: parsed("TRYON_WARMUP_FRAMES").map_or(4, |v| v as usize),
            watermark: lookup("TRYON_WATERMARK").unwrap_or_else(|| "TRY ON".into()),
            capture_dir: non_empty("TRYON_CAPTURE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }

    /// Stream constraints for the given facing mode.
    pub fn constraints(&self, facing: FacingMode) -> StreamConstraints {
        StreamConstraints {
            width: self.width,
            height: self.height,
            facing,
            frame_rate: self.fps,
        }
    }

    /// Target interval between frame ticks.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.fps.max(1)
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            warmup_frames: self.warmup_frames,
            watermark: self.watermark.clone(),
            ..SessionOptions::default()
        }
    }

    pub fn load_catalog(&self) -> Result<Catalog, SessionError> {
        let catalog = match &self.catalog_path {
            Some(path) => Catalog::load(path)?,
            None => Catalog::builtin(self.asset_dir.clone())?,
        };
        Ok(catalog)
    }

    pub fn load_calibration(&self) -> Result<Calibration, SessionError> {
        let calibration = match &self.calibration_path {
            Some(path) => Calibration::load(path)?,
            None => Calibration::default(),
        };
        Ok(calibration)
    }

    pub fn mesh_model_path(&self) -> String {
        self.mesh_model.to_string_lossy().into_owned()
    }

    pub fn detector_model_path(&self) -> String {
        self.detector_model.to_string_lossy().into_owned()
    }
}
