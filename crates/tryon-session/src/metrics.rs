//! Session state and the per-frame metrics snapshot published to display layers.

use crate::error::FatalError;
use serde::Serialize;
use tryon_core::{TrackingQuality, Transform};
use tryon_hw::FacingMode;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "state", content = "error", rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Idle,
    Initializing,
    /// Running, no face acquired yet.
    Detecting,
    Tracking,
    /// A previously tracked face has been missing for too long.
    Lost,
    Closing,
    Failed(FatalError),
}

impl SessionState {
    /// The frame loop runs in these states.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Detecting | Self::Tracking | Self::Lost)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Initializing => "initializing",
            Self::Detecting => "detecting",
            Self::Tracking => "tracking",
            Self::Lost => "lost",
            Self::Closing => "closing",
            Self::Failed(_) => "failed",
        }
    }

    pub fn fatal_error(&self) -> Option<&FatalError> {
        match self {
            Self::Failed(e) => Some(e),
            _ => None,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Snapshot derived every frame. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionMetrics {
    pub state: SessionState,
    pub fps: f32,
    pub consecutive_detections: u32,
    pub consecutive_misses: u32,
    pub tracking_quality: TrackingQuality,
    pub face_detected: bool,
    pub frames_processed: u64,
    pub facing: FacingMode,
    pub selected_model: Option<String>,
    /// Model currently on screen; lags `selected_model` while a load is in flight.
    pub displayed_model: Option<String>,
    pub transform: Option<Transform>,
}
