//! Landmark provider seam.

use crate::landmarks::LandmarkSet;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("model file not found: {0}; place the face detector and face-mesh ONNX models there")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
    #[error("provider is closed")]
    Closed,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Per-frame face landmark detection in video mode.
///
/// Timestamps passed to `detect` must be strictly increasing for the lifetime
/// of the provider.
pub trait LandmarkProvider: Send {
    fn name(&self) -> &str;

    /// Detect landmarks in a packed RGB8 frame. `Ok(None)` means no face.
    fn detect(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
        timestamp_ms: u64,
    ) -> Result<Option<LandmarkSet>, ProviderError>;

    /// Release model resources. Further `detect` calls return `Closed`.
    fn close(&mut self);
}
