use serde::Serialize;
use thiserror::Error;
use tryon_core::{AdjustmentError, CalibrationError, ProviderError};
use tryon_hw::{CameraError, CaptureError};

use crate::catalog::CatalogError;

/// Unrecoverable session failure. The session must be fully reinitialized
/// (`retry`) before it produces frames again.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FatalError {
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),
    #[error("no camera found: {0}")]
    NoCamera(String),
    #[error("camera busy: {0}")]
    CameraBusy(String),
    #[error("camera unsupported: {0}")]
    Unsupported(String),
    #[error("face tracking unavailable: {0}")]
    TrackingUnavailable(String),
    #[error("no video frames received")]
    NoVideo,
    #[error("camera stream lost: {0}")]
    CameraLost(String),
}

impl FatalError {
    /// Actionable message for the person in front of the camera.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::PermissionDenied(_) => {
                "Camera access was denied. Allow camera access for this application and try again."
            }
            Self::NoCamera(_) => "No camera was found. Connect a camera and try again.",
            Self::CameraBusy(_) => {
                "The camera is in use by another application. Close it and try again."
            }
            Self::Unsupported(_) => {
                "This camera does not support a usable video format. Try a different camera."
            }
            Self::TrackingUnavailable(_) => {
                "Face tracking could not be started. Check that the face detector and face-mesh models are installed."
            }
            Self::NoVideo => "The camera opened but sent no video. Check the lens cover and try again.",
            Self::CameraLost(_) => "The camera stopped sending video. Reconnect it and try again.",
        }
    }

    /// Classify a camera error raised while acquiring a stream.
    pub fn from_camera(err: &CameraError) -> Self {
        match err {
            CameraError::PermissionDenied(d) => Self::PermissionDenied(d.clone()),
            CameraError::DeviceNotFound(d) => Self::NoCamera(d.clone()),
            CameraError::DeviceBusy(d) => Self::CameraBusy(d.clone()),
            CameraError::Unsupported(d) | CameraError::FormatNegotiationFailed(d) => {
                Self::Unsupported(d.clone())
            }
            CameraError::CaptureFailed(d) => Self::CameraLost(d.clone()),
            CameraError::Stopped => Self::CameraLost("stream stopped".into()),
        }
    }

    pub fn from_provider(err: &ProviderError) -> Self {
        Self::TrackingUnavailable(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Fatal(#[from] FatalError),
    #[error("session is {0}; operation needs {1}")]
    InvalidState(&'static str, &'static str),
    #[error("unknown model: {0}")]
    UnknownModel(String),
    #[error("no frame available to capture")]
    NoFrame,
    #[error("capture failed: {0}")]
    Capture(#[from] CaptureError),
    #[error("adjustment: {0}")]
    Adjustment(#[from] AdjustmentError),
    #[error("catalog: {0}")]
    Catalog(#[from] CatalogError),
    #[error("calibration: {0}")]
    Calibration(#[from] CalibrationError),
    #[error("failed to start session thread: {0}")]
    Spawn(String),
    #[error("session thread exited")]
    ChannelClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_errors_are_classified() {
        let cases = [
            (CameraError::PermissionDenied("/dev/video0".into()), "permission_denied"),
            (CameraError::DeviceNotFound("/dev/video0".into()), "no_camera"),
            (CameraError::DeviceBusy("/dev/video0".into()), "camera_busy"),
            (CameraError::Unsupported("GREY".into()), "unsupported"),
            (CameraError::FormatNegotiationFailed("ioctl".into()), "unsupported"),
        ];
        for (err, kind) in cases {
            let fatal = FatalError::from_camera(&err);
            let json = serde_json::to_value(&fatal).unwrap();
            assert_eq!(json["kind"], kind);
        }
    }

    #[test]
    fn test_user_messages_are_distinct() {
        let all = [
            FatalError::PermissionDenied(String::new()),
            FatalError::NoCamera(String::new()),
            FatalError::CameraBusy(String::new()),
            FatalError::Unsupported(String::new()),
            FatalError::TrackingUnavailable(String::new()),
            FatalError::NoVideo,
            FatalError::CameraLost(String::new()),
        ];
        let mut messages: Vec<_> = all.iter().map(FatalError::user_message).collect();
        messages.sort_unstable();
        messages.dedup();
        assert_eq!(messages.len(), all.len());
    }

    #[test]
    fn test_provider_error_is_tracking_unavailable() {
        let err = ProviderError::ModelNotFound("models/face_mesh.onnx".into());
        assert!(matches!(
            FatalError::from_provider(&err),
            FatalError::TrackingUnavailable(msg) if msg.contains("face_mesh.onnx")
        ));
    }
}
