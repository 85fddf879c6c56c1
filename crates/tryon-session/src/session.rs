//! Session controller: owns every piece of mutable try-on state and drives
//! the per-frame loop.
//!
//! State machine:
//! `Idle → Initializing → Detecting ⇄ (Tracking ⇄ Lost) → Closing → Idle`,
//! with `Failed` reachable from initialization or a broken camera stream.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tryon_core::{
    solve_with, AdjustmentError, AdjustmentKey, Calibration, FaceEvent, FaceMesh, FpsMeter,
    LandmarkProvider, LandmarkSet, ManualAdjustment, MotionTracker, ProviderError, QualityTracker,
    TrackerConfig, Transform, Viewport,
};
use tryon_hw::{
    snapshot, write_png, CameraError, CameraProvider, FacingMode, Frame, MediaStream,
    StreamConstraints, V4lCameraProvider,
};

use crate::catalog::{Catalog, LoadState};
use crate::config::Config;
use crate::error::{FatalError, SessionError};
use crate::loader::{AssetEvent, AssetLoader, AssetLoads, GltfLoader, SceneAsset};
use crate::metrics::{SessionMetrics, SessionState};
use crate::overlay::{ActiveModel, OverlayFrame, OverlayRenderer, SceneOverlay};

/// Opens a fresh landmark provider. Called on every (re)initialization.
pub type ProviderFactory =
    Box<dyn FnMut() -> Result<Box<dyn LandmarkProvider>, ProviderError> + Send>;

const FIRST_FRAME_POLL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Frames discarded right after the camera opens.
    pub warmup_frames: usize,
    /// Reads allowed while waiting for the first usable frame.
    pub first_frame_attempts: usize,
    pub watermark: String,
    pub tracker: TrackerConfig,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            warmup_frames: 4,
            first_frame_attempts: 30,
            watermark: "TRY ON".into(),
            tracker: TrackerConfig::default(),
        }
    }
}

/// Collaborators and initial settings for a session.
pub struct SessionParts {
    pub camera: Box<dyn CameraProvider>,
    pub provider_factory: ProviderFactory,
    pub loader: Arc<dyn AssetLoader>,
    pub overlay: Box<dyn OverlayRenderer>,
    pub catalog: Catalog,
    pub calibration: Calibration,
    pub constraints: StreamConstraints,
    pub options: SessionOptions,
}

pub struct Session {
    state: SessionState,
    camera: Box<dyn CameraProvider>,
    stream: Option<Box<dyn MediaStream>>,
    provider_factory: ProviderFactory,
    provider: Option<Box<dyn LandmarkProvider>>,
    loads: AssetLoads,
    assets: HashMap<String, Arc<SceneAsset>>,
    overlay: Box<dyn OverlayRenderer>,
    catalog: Catalog,
    calibration: Calibration,
    constraints: StreamConstraints,
    options: SessionOptions,

    tracker: MotionTracker,
    quality: QualityTracker,
    fps: FpsMeter,
    adjustments: ManualAdjustment,
    selected: Option<String>,
    displayed: Option<ActiveModel>,
    transform: Option<Transform>,
    last_landmarks: Option<LandmarkSet>,
    last_frame: Option<Frame>,
    epoch: Option<Instant>,
    last_timestamp_ms: Option<u64>,
    frames_processed: u64,

    metrics: watch::Sender<SessionMetrics>,
}

impl Session {
    pub fn new(parts: SessionParts) -> Self {
        let (metrics, _) = watch::channel(SessionMetrics {
            facing: parts.constraints.facing,
            ..SessionMetrics::default()
        });
        Self {
            state: SessionState::Idle,
            camera: parts.camera,
            stream: None,
            provider_factory: parts.provider_factory,
            provider: None,
            loads: AssetLoads::new(parts.loader),
            assets: HashMap::new(),
            overlay: parts.overlay,
            catalog: parts.catalog,
            calibration: parts.calibration,
            constraints: parts.constraints,
            tracker: MotionTracker::new(parts.options.tracker),
            options: parts.options,
            quality: QualityTracker::new(),
            fps: FpsMeter::new(),
            adjustments: ManualAdjustment::new(),
            selected: None,
            displayed: None,
            transform: None,
            last_landmarks: None,
            last_frame: None,
            epoch: None,
            last_timestamp_ms: None,
            frames_processed: 0,
            metrics,
        }
    }

    /// Build a session on the V4L2 camera, face-mesh provider, and glTF loader.
    pub fn from_config(config: &Config) -> Result<Self, SessionError> {
        let catalog = config.load_catalog()?;
        let calibration = config.load_calibration()?;
        let mesh_path = config.mesh_model_path();
        let detector_path = config.detector_model_path();

        let provider_factory: ProviderFactory = Box::new(move || {
            let mesh = FaceMesh::load(&mesh_path, &detector_path)?;
            Ok(Box::new(mesh) as Box<dyn LandmarkProvider>)
        });

        Ok(Self::new(SessionParts {
            camera: Box::new(V4lCameraProvider::new(
                config.front_device.clone(),
                config.rear_device.clone(),
            )),
            provider_factory,
            loader: Arc::new(GltfLoader),
            overlay: Box::new(SceneOverlay::new()),
            catalog,
            calibration,
            constraints: config.constraints(FacingMode::User),
            options: config.session_options(),
        }))
    }

    // -- Lifecycle --------------------------------------------------------

    /// Acquire the camera and landmark provider and wait for the first
    /// usable frame. Allowed from `Idle` or `Failed`.
    pub fn open(&mut self) -> Result<(), SessionError> {
        if !matches!(self.state, SessionState::Idle | SessionState::Failed(_)) {
            return Err(SessionError::InvalidState(self.state.name(), "idle or failed"));
        }
        self.initialize()
    }

    /// Tear down completely and initialize again.
    pub fn retry(&mut self) -> Result<(), SessionError> {
        self.close();
        self.open()
    }

    /// Release the camera and provider and return to `Idle`. Safe from any state.
    pub fn close(&mut self) {
        if self.state == SessionState::Idle {
            return;
        }
        self.set_state(SessionState::Closing);
        self.release();
        self.reset_motion();
        self.fps.reset();
        self.adjustments.clear();
        self.last_frame = None;
        self.epoch = None;
        self.last_timestamp_ms = None;
        self.set_state(SessionState::Idle);
        tracing::info!("session closed");
    }

    /// Flip between user- and environment-facing cameras. A running session
    /// is reinitialized on the new camera; otherwise only the preference changes.
    pub fn switch_camera(&mut self) -> Result<FacingMode, SessionError> {
        let facing = self.constraints.facing.flipped();
        self.constraints.facing = facing;
        tracing::info!(%facing, "switching camera");

        if !self.state.is_active() {
            self.publish();
            return Ok(facing);
        }

        self.release();
        self.reset_motion();
        self.last_frame = None;
        self.initialize()?;
        Ok(facing)
    }

    fn initialize(&mut self) -> Result<(), SessionError> {
        self.set_state(SessionState::Initializing);
        match self.acquire() {
            Ok(()) => {
                self.reset_motion();
                self.fps.reset();
                self.set_state(SessionState::Detecting);
                tracing::info!(facing = %self.constraints.facing, "session running");
                Ok(())
            }
            Err(fatal) => {
                self.release();
                tracing::error!(error = %fatal, "session initialization failed");
                self.set_state(SessionState::Failed(fatal.clone()));
                Err(fatal.into())
            }
        }
    }

    fn acquire(&mut self) -> Result<(), FatalError> {
        let stream = self
            .camera
            .acquire(&self.constraints)
            .map_err(|e| FatalError::from_camera(&e))?;
        let (width, height) = stream.resolution();
        tracing::info!(width, height, facing = %stream.facing(), "camera stream acquired");
        self.stream = Some(stream);

        let provider = (self.provider_factory)().map_err(|e| FatalError::from_provider(&e))?;
        tracing::info!(provider = provider.name(), "landmark provider ready");
        self.provider = Some(provider);

        let first = self.wait_for_first_frame()?;
        tracing::info!(width = first.width, height = first.height, "first frame received");
        self.last_frame = Some(first);
        Ok(())
    }

    /// Discard warmup frames, then read until a frame of the advertised size
    /// arrives. Dark frames are skipped while attempts remain.
    fn wait_for_first_frame(&mut self) -> Result<Frame, FatalError> {
        let stream = self.stream.as_mut().ok_or(FatalError::NoVideo)?;

        if self.options.warmup_frames > 0 {
            tracing::debug!(count = self.options.warmup_frames, "discarding warmup frames");
            for _ in 0..self.options.warmup_frames {
                stream.read_frame().map_err(|e| FatalError::from_camera(&e))?;
            }
        }

        let mut dark = None;
        for _ in 0..self.options.first_frame_attempts {
            match stream.read_frame() {
                Ok(Some(frame)) if frame.is_valid() => {
                    if !frame.is_dark() {
                        return Ok(frame);
                    }
                    tracing::debug!(seq = frame.sequence, "skipping dark frame");
                    dark = Some(frame);
                }
                Ok(Some(frame)) => {
                    tracing::debug!(
                        seq = frame.sequence,
                        len = frame.rgb.len(),
                        "skipping malformed frame"
                    );
                }
                Ok(None) => std::thread::sleep(FIRST_FRAME_POLL),
                Err(e) => return Err(FatalError::from_camera(&e)),
            }
        }

        match dark {
            Some(frame) => {
                tracing::warn!(
                    brightness = frame.avg_brightness(),
                    "camera delivers only dark frames; continuing"
                );
                Ok(frame)
            }
            None => Err(FatalError::NoVideo),
        }
    }

    fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
        }
        if let Some(mut provider) = self.provider.take() {
            provider.close();
        }
    }

    fn reset_motion(&mut self) {
        self.tracker.reset();
        self.quality.reset();
        self.transform = None;
        self.last_landmarks = None;
    }

    // -- Frame loop -------------------------------------------------------

    /// Process one frame. Does nothing unless the session is running; a
    /// stream that is no longer live is treated as a lost camera.
    ///
    /// Frame-level problems (detection errors, malformed frames) are logged
    /// and skipped; only a broken camera stream is returned, after the
    /// session has moved to `Failed`.
    pub fn tick(&mut self, now: Instant) -> Result<(), FatalError> {
        if !self.state.is_active() {
            return Ok(());
        }

        let read = match self.stream.as_mut() {
            Some(stream) if stream.is_live() => stream.read_frame(),
            _ => Err(CameraError::Stopped),
        };
        let frame = match read {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                self.poll_assets();
                return Ok(());
            }
            Err(e) => {
                let fatal = FatalError::from_camera(&e);
                tracing::error!(error = %e, "camera read failed");
                self.release();
                self.set_state(SessionState::Failed(fatal.clone()));
                return Err(fatal);
            }
        };

        if !frame.is_valid() {
            tracing::warn!(seq = frame.sequence, len = frame.rgb.len(), "dropping malformed frame");
            self.apply_asset_events();
            self.publish();
            return Ok(());
        }

        let timestamp_ms = self.next_timestamp(now);
        let detected = match self.provider.as_mut() {
            Some(provider) => provider.detect(&frame.rgb, frame.width, frame.height, timestamp_ms),
            None => Err(ProviderError::Closed),
        };
        let landmarks = detected.unwrap_or_else(|e| {
            tracing::warn!(error = %e, timestamp_ms, "landmark detection failed; skipping frame");
            None
        });

        let viewport = Viewport::new(frame.width as f32, frame.height as f32);
        match solve_with(&self.calibration, landmarks.as_ref(), viewport, &self.adjustments) {
            Some(raw) => {
                let event = self.quality.record_hit();
                self.on_face_event(event);
                let smoothed = self.tracker.update(&raw);
                tracing::trace!(
                    auto_scale = raw.auto_scale,
                    eye_distance = raw.eye_distance,
                    "transform solved"
                );
                self.transform = Some(smoothed.0);
                self.last_landmarks = landmarks;
            }
            None => {
                let event = self.quality.record_miss();
                self.on_face_event(event);
            }
        }

        self.apply_asset_events();
        self.overlay.present(&OverlayFrame {
            viewport,
            mirrored: self.constraints.facing.is_mirrored(),
            transform: self.transform.as_ref(),
            face_visible: self.quality.face_detected(),
            model: self.displayed.as_ref(),
        });

        if let Some(fps) = self.fps.tick(now) {
            tracing::debug!(fps, quality = ?self.quality.quality(), "frame rate");
        }
        self.frames_processed += 1;
        self.last_frame = Some(frame);
        self.publish();
        Ok(())
    }

    /// Milliseconds since the session started, forced strictly increasing.
    fn next_timestamp(&mut self, now: Instant) -> u64 {
        let epoch = *self.epoch.get_or_insert(now);
        let elapsed = now.saturating_duration_since(epoch).as_millis() as u64;
        let ts = match self.last_timestamp_ms {
            Some(last) if elapsed <= last => last + 1,
            _ => elapsed,
        };
        self.last_timestamp_ms = Some(ts);
        ts
    }

    fn on_face_event(&mut self, event: Option<FaceEvent>) {
        match event {
            Some(FaceEvent::Acquired) => {
                tracing::info!("face acquired");
                self.set_state(SessionState::Tracking);
            }
            Some(FaceEvent::Lost) => {
                tracing::info!(misses = self.quality.consecutive_misses(), "face lost");
                self.set_state(SessionState::Lost);
            }
            None => {}
        }
    }

    // -- Models -----------------------------------------------------------

    /// Select a catalog model. Tracking and adjustments restart; the model
    /// on screen stays until the new one has loaded.
    pub fn select_model(&mut self, id: &str) -> Result<(), SessionError> {
        let model = self
            .catalog
            .get(id)
            .ok_or_else(|| SessionError::UnknownModel(id.to_string()))?;
        let base_scale = model.base_scale;
        let path = self.catalog.resolve(model);
        let loading = model.load_state.is_loading();

        self.selected = Some(id.to_string());
        self.tracker.reset();
        self.adjustments.clear();
        tracing::info!(model = id, "model selected");

        if let Some(asset) = self.assets.get(id) {
            self.displayed = Some(ActiveModel {
                id: id.to_string(),
                base_scale,
                asset: Arc::clone(asset),
            });
        } else if !loading {
            self.start_load(id, path);
        }
        self.publish();
        Ok(())
    }

    /// Reload a model whose load failed. Session state is untouched.
    pub fn retry_model(&mut self, id: &str) -> Result<(), SessionError> {
        let model = self
            .catalog
            .get(id)
            .ok_or_else(|| SessionError::UnknownModel(id.to_string()))?;
        if self.assets.contains_key(id) || model.load_state.is_loading() {
            return Ok(());
        }
        let path = self.catalog.resolve(model);
        self.start_load(id, path);
        self.publish();
        Ok(())
    }

    fn start_load(&mut self, id: &str, path: PathBuf) {
        let state = match self.loads.start(id, path) {
            Ok(()) => LoadState::Loading { progress: 0.0 },
            Err(e) => {
                tracing::warn!(model = id, error = %e, "asset load could not start");
                LoadState::Error {
                    message: e.to_string(),
                }
            }
        };
        if let Some(model) = self.catalog.get_mut(id) {
            model.load_state = state;
        }
    }

    /// Apply finished asset loads without processing a frame.
    pub fn poll_assets(&mut self) {
        if self.apply_asset_events() {
            self.publish();
        }
    }

    fn apply_asset_events(&mut self) -> bool {
        let events = self.loads.poll();
        let changed = !events.is_empty();

        for event in events {
            match event {
                AssetEvent::Progress { id, progress } => {
                    if let Some(model) = self.catalog.get_mut(&id) {
                        if model.load_state.is_loading() {
                            model.load_state = LoadState::Loading { progress };
                        }
                    }
                }
                AssetEvent::Loaded { id, asset } => {
                    tracing::info!(model = %id, nodes = asset.nodes, meshes = asset.meshes, "model loaded");
                    let Some(model) = self.catalog.get_mut(&id) else {
                        continue;
                    };
                    model.load_state = LoadState::Loaded;
                    if self.selected.as_deref() == Some(id.as_str()) {
                        self.displayed = Some(ActiveModel {
                            id: id.clone(),
                            base_scale: model.base_scale,
                            asset: Arc::clone(&asset),
                        });
                    }
                    self.assets.insert(id, asset);
                }
                AssetEvent::Failed { id, message } => {
                    tracing::warn!(model = %id, error = %message, "model load failed");
                    if let Some(model) = self.catalog.get_mut(&id) {
                        model.load_state = LoadState::Error { message };
                    }
                }
            }
        }
        changed
    }

    // -- Adjustments, tracking, capture ------------------------------------

    pub fn set_adjustment(&mut self, key: AdjustmentKey, value: f32) -> Result<(), SessionError> {
        if !value.is_finite() {
            return Err(AdjustmentError::InvalidValue {
                key,
                value: value.to_string(),
            }
            .into());
        }
        self.adjustments.set(key, value);
        tracing::debug!(%key, value, "adjustment set");
        Ok(())
    }

    pub fn clear_adjustments(&mut self) {
        self.adjustments.clear();
    }

    /// Forget motion history and detection counters.
    pub fn reset_tracking(&mut self) {
        self.reset_motion();
        if self.state.is_active() {
            self.set_state(SessionState::Detecting);
        }
        tracing::info!("tracking reset");
        self.publish();
    }

    /// Export the latest frame as a PNG, mirrored for the front camera.
    pub fn capture(&self, path: &Path) -> Result<PathBuf, SessionError> {
        let frame = self.last_frame.as_ref().ok_or(SessionError::NoFrame)?;
        let image = snapshot(
            frame,
            self.constraints.facing.is_mirrored(),
            &self.options.watermark,
        )?;
        write_png(&image, path)?;
        Ok(path.to_path_buf())
    }

    // -- Observation ------------------------------------------------------

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn facing(&self) -> FacingMode {
        self.constraints.facing
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn adjustments(&self) -> &ManualAdjustment {
        &self.adjustments
    }

    pub fn transform(&self) -> Option<&Transform> {
        self.transform.as_ref()
    }

    pub fn last_landmarks(&self) -> Option<&LandmarkSet> {
        self.last_landmarks.as_ref()
    }

    pub fn tracker(&self) -> &MotionTracker {
        &self.tracker
    }

    pub fn selected_model(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn displayed_model(&self) -> Option<&ActiveModel> {
        self.displayed.as_ref()
    }

    pub fn metrics(&self) -> SessionMetrics {
        SessionMetrics {
            state: self.state.clone(),
            fps: self.fps.fps(),
            consecutive_detections: self.quality.consecutive_detections(),
            consecutive_misses: self.quality.consecutive_misses(),
            tracking_quality: self.quality.quality(),
            face_detected: self.quality.face_detected(),
            frames_processed: self.frames_processed,
            facing: self.constraints.facing,
            selected_model: self.selected.clone(),
            displayed_model: self.displayed.as_ref().map(|m| m.id.clone()),
            transform: self.transform,
        }
    }

    /// Metrics receiver, updated on every state change and processed frame.
    pub fn subscribe(&self) -> watch::Receiver<SessionMetrics> {
        self.metrics.subscribe()
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            tracing::debug!(from = %self.state, to = %state, "session state");
            self.state = state;
            self.publish();
        }
    }

    fn publish(&self) {
        self.metrics.send_replace(self.metrics());
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.release();
    }
}
