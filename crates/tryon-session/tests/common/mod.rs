#![allow(dead_code)]

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use tryon_core::landmarks::{
    FACE_MESH_POINTS, FOREHEAD, LEFT_EYE_INNER, LEFT_EYE_OUTER, LEFT_TEMPLE, NOSE_BRIDGE,
    NOSE_TIP, RIGHT_EYE_INNER, RIGHT_EYE_OUTER, RIGHT_TEMPLE,
};
use tryon_core::{Calibration, LandmarkProvider, LandmarkSet, Point3, ProviderError};
use tryon_hw::{CameraError, CameraProvider, FacingMode, Frame, MediaStream, StreamConstraints};
use tryon_session::{
    AssetError, AssetFormat, AssetLoader, Catalog, ModelNode, OverlayFrame, OverlayRenderer,
    SceneAsset, SceneOverlay, Session, SessionOptions, SessionParts,
};

pub const WIDTH: u32 = 64;
pub const HEIGHT: u32 = 48;
pub const LEFT_COLOR: [u8; 3] = [200, 40, 40];
pub const RIGHT_COLOR: [u8; 3] = [40, 40, 200];

/// A face close to the calibration baselines.
pub fn face() -> LandmarkSet {
    let mut points = vec![Point3::new(0.5, 0.5, 0.0); FACE_MESH_POINTS];
    for (idx, p) in [
        (RIGHT_EYE_INNER, Point3::new(0.48, 0.5, 0.0)),
        (LEFT_EYE_INNER, Point3::new(0.52, 0.5, 0.0)),
        (RIGHT_EYE_OUTER, Point3::new(0.45, 0.5, 0.0)),
        (LEFT_EYE_OUTER, Point3::new(0.55, 0.5, 0.0)),
        (RIGHT_TEMPLE, Point3::new(0.46, 0.5, 0.0)),
        (LEFT_TEMPLE, Point3::new(0.54, 0.5, 0.0)),
        (NOSE_BRIDGE, Point3::new(0.5, 0.51, 0.0)),
        (NOSE_TIP, Point3::new(0.5, 0.53, -0.02)),
        (FOREHEAD, Point3::new(0.5, 0.43, 0.0)),
    ] {
        points[idx] = p;
    }
    LandmarkSet::new(points)
}

// -- Camera -------------------------------------------------------------

#[derive(Default)]
pub struct CameraState {
    pub acquire_error: Option<fn(String) -> CameraError>,
    pub missing_environment: bool,
    /// Dark frames at the start of every stream.
    pub dark_frames: u32,
    /// Every frame has a short pixel buffer.
    pub malformed: bool,
    pub fail_reads: bool,
    /// Streams report no frame ready.
    pub starved: bool,
    /// Streams report they are no longer live.
    pub ended: bool,
    pub acquired: Vec<FacingMode>,
    pub live_streams: usize,
    pub stops: usize,
}

#[derive(Clone, Default)]
pub struct FakeCamera {
    pub state: Arc<Mutex<CameraState>>,
}

impl CameraProvider for FakeCamera {
    fn acquire(
        &mut self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn MediaStream>, CameraError> {
        let mut state = self.state.lock().unwrap();
        if let Some(make) = state.acquire_error {
            return Err(make("/dev/video-fake".into()));
        }
        if constraints.facing == FacingMode::Environment && state.missing_environment {
            return Err(CameraError::DeviceNotFound("rear".into()));
        }
        state.acquired.push(constraints.facing);
        state.live_streams += 1;
        Ok(Box::new(FakeStream {
            state: Arc::clone(&self.state),
            facing: constraints.facing,
            seq: 0,
            live: true,
        }))
    }
}

pub struct FakeStream {
    state: Arc<Mutex<CameraState>>,
    facing: FacingMode,
    seq: u32,
    live: bool,
}

fn split_frame(dark: bool) -> Vec<u8> {
    let mut rgb = Vec::with_capacity((WIDTH * HEIGHT * 3) as usize);
    for _ in 0..HEIGHT {
        for x in 0..WIDTH {
            let px = if dark {
                [2, 2, 2]
            } else if x < WIDTH / 2 {
                LEFT_COLOR
            } else {
                RIGHT_COLOR
            };
            rgb.extend_from_slice(&px);
        }
    }
    rgb
}

impl MediaStream for FakeStream {
    fn read_frame(&mut self) -> Result<Option<Frame>, CameraError> {
        if !self.live {
            return Err(CameraError::Stopped);
        }
        let state = self.state.lock().unwrap();
        if state.fail_reads {
            return Err(CameraError::CaptureFailed("device unplugged".into()));
        }
        if state.starved {
            return Ok(None);
        }
        let dark = self.seq < state.dark_frames;
        let mut rgb = split_frame(dark);
        if state.malformed {
            rgb.truncate(10);
        }
        self.seq += 1;
        Ok(Some(Frame {
            rgb,
            width: WIDTH,
            height: HEIGHT,
            timestamp: Instant::now(),
            sequence: self.seq,
        }))
    }

    fn stop(&mut self) {
        if self.live {
            self.live = false;
            let mut state = self.state.lock().unwrap();
            state.live_streams -= 1;
            state.stops += 1;
        }
    }

    fn is_live(&self) -> bool {
        self.live && !self.state.lock().unwrap().ended
    }

    fn resolution(&self) -> (u32, u32) {
        (WIDTH, HEIGHT)
    }

    fn facing(&self) -> FacingMode {
        self.facing
    }
}

impl Drop for FakeStream {
    fn drop(&mut self) {
        self.stop();
    }
}

// -- Landmark provider --------------------------------------------------

#[derive(Default)]
pub struct ProviderState {
    pub face: bool,
    /// Number of upcoming detect calls that fail.
    pub fail_next: usize,
    pub load_error: bool,
    pub timestamps: Vec<u64>,
    pub opened: usize,
    pub closed: usize,
}

pub struct FakeProvider {
    state: Arc<Mutex<ProviderState>>,
    closed: bool,
}

impl LandmarkProvider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    fn detect(
        &mut self,
        _rgb: &[u8],
        _width: u32,
        _height: u32,
        timestamp_ms: u64,
    ) -> Result<Option<LandmarkSet>, ProviderError> {
        if self.closed {
            return Err(ProviderError::Closed);
        }
        let mut state = self.state.lock().unwrap();
        state.timestamps.push(timestamp_ms);
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(ProviderError::InferenceFailed("graph error".into()));
        }
        Ok(state.face.then(face))
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.state.lock().unwrap().closed += 1;
        }
    }
}

// -- Asset loader -------------------------------------------------------

#[derive(Default)]
pub struct Gate {
    pub released: HashSet<String>,
    pub failing: HashSet<String>,
    pub loads: Vec<String>,
}

/// Loader that blocks each load until its file stem is released.
#[derive(Clone, Default)]
pub struct GatedLoader {
    inner: Arc<(Mutex<Gate>, Condvar)>,
}

impl GatedLoader {
    pub fn release(&self, stem: &str) {
        let (lock, cv) = &*self.inner;
        lock.lock().unwrap().released.insert(stem.to_string());
        cv.notify_all();
    }

    pub fn set_failing(&self, stem: &str, failing: bool) {
        let (lock, _) = &*self.inner;
        let mut gate = lock.lock().unwrap();
        if failing {
            gate.failing.insert(stem.to_string());
        } else {
            gate.failing.remove(stem);
        }
    }

    pub fn loads(&self) -> Vec<String> {
        self.inner.0.lock().unwrap().loads.clone()
    }
}

impl AssetLoader for GatedLoader {
    fn load(&self, path: &Path, progress: &mut dyn FnMut(f32)) -> Result<SceneAsset, AssetError> {
        let stem = path.file_stem().unwrap().to_string_lossy().into_owned();
        let (lock, cv) = &*self.inner;
        let mut gate = lock.lock().unwrap();
        gate.loads.push(stem.clone());
        let (gate, _) = cv
            .wait_timeout_while(gate, Duration::from_secs(5), |g| !g.released.contains(&stem))
            .unwrap();
        progress(0.5);

        if gate.failing.contains(&stem) {
            return Err(AssetError::NotFound(path.display().to_string()));
        }
        Ok(SceneAsset {
            path: path.to_path_buf(),
            format: AssetFormat::Glb,
            generator: None,
            nodes: 2,
            meshes: 1,
            bytes: 128,
        })
    }
}

// -- Overlay ------------------------------------------------------------

/// Scene overlay that records the node after every presented frame.
pub struct RecordingOverlay {
    scene: SceneOverlay,
    log: Arc<Mutex<Vec<Option<ModelNode>>>>,
}

impl OverlayRenderer for RecordingOverlay {
    fn present(&mut self, frame: &OverlayFrame<'_>) {
        self.scene.present(frame);
        self.log.lock().unwrap().push(self.scene.node().cloned());
    }
}

// -- Harness ------------------------------------------------------------

pub const CATALOG: &str = r#"
[[model]]
id = "alpha"
name = "Alpha"
asset = "alpha.glb"

[[model]]
id = "beta"
name = "Beta"
asset = "beta.glb"
base_scale = 0.5
"#;

pub struct Harness {
    pub session: Session,
    pub camera: Arc<Mutex<CameraState>>,
    pub provider: Arc<Mutex<ProviderState>>,
    pub loader: GatedLoader,
    pub overlay: Arc<Mutex<Vec<Option<ModelNode>>>>,
}

impl Harness {
    pub fn new() -> Self {
        let camera = FakeCamera::default();
        let provider = Arc::new(Mutex::new(ProviderState {
            face: true,
            ..ProviderState::default()
        }));
        let loader = GatedLoader::default();
        let overlay = Arc::new(Mutex::new(Vec::new()));

        let factory_state = Arc::clone(&provider);
        let session = Session::new(SessionParts {
            camera: Box::new(camera.clone()),
            provider_factory: Box::new(move || {
                let mut state = factory_state.lock().unwrap();
                if state.load_error {
                    return Err(ProviderError::ModelNotFound("models/face_mesh.onnx".into()));
                }
                state.opened += 1;
                Ok(Box::new(FakeProvider {
                    state: Arc::clone(&factory_state),
                    closed: false,
                }) as Box<dyn LandmarkProvider>)
            }),
            loader: Arc::new(loader.clone()),
            overlay: Box::new(RecordingOverlay {
                scene: SceneOverlay::new(),
                log: Arc::clone(&overlay),
            }),
            catalog: Catalog::from_toml_str(CATALOG, "/models").unwrap(),
            calibration: Calibration::default(),
            constraints: StreamConstraints {
                width: WIDTH,
                height: HEIGHT,
                ..StreamConstraints::default()
            },
            options: SessionOptions {
                warmup_frames: 2,
                first_frame_attempts: 10,
                ..SessionOptions::default()
            },
        });

        Self {
            session,
            camera: camera.state,
            provider,
            loader,
            overlay,
        }
    }

    pub fn tick(&mut self, n: usize) {
        for _ in 0..n {
            self.session.tick(Instant::now()).unwrap();
        }
    }

    pub fn last_node(&self) -> Option<ModelNode> {
        self.overlay.lock().unwrap().last().cloned().flatten()
    }

    /// Poll asset events until `done` holds or a deadline passes.
    pub fn wait_for(&mut self, mut done: impl FnMut(&Session) -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            self.session.poll_assets();
            if done(&self.session) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }
}

pub fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir()
        .join(format!("tryon-session-{}", std::process::id()))
        .join(name)
}
