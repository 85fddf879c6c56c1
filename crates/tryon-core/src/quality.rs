//! Detection-quality hysteresis and frame-rate bookkeeping.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Consecutive detections above which tracking is `Excellent`.
pub const EXCELLENT_AFTER: u32 = 15;
/// Consecutive detections above which tracking is `Good`.
pub const GOOD_AFTER: u32 = 8;
/// Consecutive misses above which a detected face is declared lost.
pub const LOST_AFTER_MISSES: u32 = 15;
/// Detection-count decay applied on each miss.
pub const MISS_DECAY: u32 = 2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingQuality {
    #[default]
    Fair,
    Good,
    Excellent,
}

impl TrackingQuality {
    pub fn from_detections(consecutive: u32) -> Self {
        if consecutive > EXCELLENT_AFTER {
            Self::Excellent
        } else if consecutive > GOOD_AFTER {
            Self::Good
        } else {
            Self::Fair
        }
    }
}

/// Face presence transition produced by a hit or miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceEvent {
    Acquired,
    Lost,
}

/// Counts consecutive detections and misses, requiring sustained evidence
/// before flipping face presence so single dropped frames don't flicker.
#[derive(Debug, Clone, Default)]
pub struct QualityTracker {
    consecutive_detections: u32,
    consecutive_misses: u32,
    quality: TrackingQuality,
    face_detected: bool,
}

impl QualityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&mut self) -> Option<FaceEvent> {
        self.consecutive_detections = self.consecutive_detections.saturating_add(1);
        self.consecutive_misses = 0;
        self.quality = TrackingQuality::from_detections(self.consecutive_detections);

        if self.face_detected {
            None
        } else {
            self.face_detected = true;
            Some(FaceEvent::Acquired)
        }
    }

    pub fn record_miss(&mut self) -> Option<FaceEvent> {
        self.consecutive_misses = self.consecutive_misses.saturating_add(1);
        self.consecutive_detections = self.consecutive_detections.saturating_sub(MISS_DECAY);
        self.quality = TrackingQuality::from_detections(self.consecutive_detections);

        if self.face_detected && self.consecutive_misses > LOST_AFTER_MISSES {
            self.face_detected = false;
            Some(FaceEvent::Lost)
        } else {
            None
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn consecutive_detections(&self) -> u32 {
        self.consecutive_detections
    }

    pub fn consecutive_misses(&self) -> u32 {
        self.consecutive_misses
    }

    pub fn quality(&self) -> TrackingQuality {
        self.quality
    }

    pub fn face_detected(&self) -> bool {
        self.face_detected
    }
}

/// Frames-per-second estimate refreshed once per wall-clock second.
#[derive(Debug, Clone)]
pub struct FpsMeter {
    window_start: Option<Instant>,
    frames: u32,
    fps: f32,
}

impl Default for FpsMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl FpsMeter {
    const WINDOW: Duration = Duration::from_secs(1);

    pub fn new() -> Self {
        Self {
            window_start: None,
            frames: 0,
            fps: 0.0,
        }
    }

    /// Count one frame. Returns the new FPS when a window closes.
    pub fn tick(&mut self, now: Instant) -> Option<f32> {
        let start = *self.window_start.get_or_insert(now);
        self.frames += 1;

        let elapsed = now.saturating_duration_since(start);
        if elapsed < Self::WINDOW {
            return None;
        }

        self.fps = self.frames as f32 / elapsed.as_secs_f32();
        self.frames = 0;
        self.window_start = Some(now);
        Some(self.fps)
    }

    pub fn fps(&self) -> f32 {
        self.fps
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
