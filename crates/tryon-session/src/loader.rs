//! 3D asset loading.
//!
//! `GltfLoader` validates glTF 2.0 assets (binary `.glb` or JSON `.gltf`)
//! and extracts scene-graph counts. `AssetLoads` runs loads on background
//! threads and queues their events for the session loop to apply.

use serde_json::Value;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

const GLB_MAGIC: u32 = 0x4654_6C67; // "glTF"
const GLB_VERSION: u32 = 2;
const GLB_HEADER_LEN: usize = 12;
const CHUNK_JSON: u32 = 0x4E4F_534A; // "JSON"
const READ_CHUNK: usize = 64 * 1024;

#[derive(Error, Debug)]
pub enum AssetError {
    #[error("asset not found: {0}")]
    NotFound(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("unsupported asset format: {0}")]
    UnsupportedFormat(String),
    #[error("invalid GLB: {0}")]
    InvalidGlb(String),
    #[error("unsupported glTF version: {0}")]
    UnsupportedVersion(String),
    #[error("invalid glTF JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to start loader thread: {0}")]
    Spawn(std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetFormat {
    Glb,
    Gltf,
}

/// A loaded, scene-graph-compatible asset.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneAsset {
    pub path: PathBuf,
    pub format: AssetFormat,
    pub generator: Option<String>,
    pub nodes: usize,
    pub meshes: usize,
    pub bytes: u64,
}

/// Loads an asset by path, reporting fractional progress in [0, 1].
pub trait AssetLoader: Send + Sync {
    fn load(&self, path: &Path, progress: &mut dyn FnMut(f32)) -> Result<SceneAsset, AssetError>;
}

/// glTF 2.0 loader for `.glb` and `.gltf` files.
#[derive(Debug, Default, Clone, Copy)]
pub struct GltfLoader;

impl AssetLoader for GltfLoader {
    fn load(&self, path: &Path, progress: &mut dyn FnMut(f32)) -> Result<SceneAsset, AssetError> {
        let display = path.display().to_string();
        let io_err = |source: std::io::Error| {
            if source.kind() == std::io::ErrorKind::NotFound {
                AssetError::NotFound(display.clone())
            } else {
                AssetError::Io {
                    path: display.clone(),
                    source,
                }
            }
        };

        let mut file = std::fs::File::open(path).map_err(io_err)?;
        let total = file.metadata().map_err(io_err)?.len();
        let data = read_with_progress(&mut file, total, progress).map_err(io_err)?;

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let is_glb = data.len() >= 4 && read_u32(&data, 0) == GLB_MAGIC;

        let (format, json) = match ext.as_deref() {
            Some("glb") => (AssetFormat::Glb, parse_glb(&data)?),
            Some("gltf") if !is_glb => (AssetFormat::Gltf, serde_json::from_slice(&data)?),
            _ if is_glb => (AssetFormat::Glb, parse_glb(&data)?),
            _ => return Err(AssetError::UnsupportedFormat(display)),
        };

        let asset = scene_from_json(path, format, &json, data.len() as u64)?;
        progress(1.0);
        tracing::debug!(
            path = %path.display(),
            nodes = asset.nodes,
            meshes = asset.meshes,
            "asset parsed"
        );
        Ok(asset)
    }
}

fn read_with_progress(
    reader: &mut impl Read,
    total: u64,
    progress: &mut dyn FnMut(f32),
) -> std::io::Result<Vec<u8>> {
    let mut data = Vec::with_capacity(total as usize);
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        if total > 0 {
            // The final 1.0 is reported after parsing.
            progress((data.len() as f32 / total as f32).min(0.99));
        }
    }
    Ok(data)
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

/// Validate the GLB container and return its JSON chunk.
fn parse_glb(data: &[u8]) -> Result<Value, AssetError> {
    if data.len() < GLB_HEADER_LEN + 8 {
        return Err(AssetError::InvalidGlb(format!("{} bytes is too short", data.len())));
    }
    if read_u32(data, 0) != GLB_MAGIC {
        return Err(AssetError::InvalidGlb("bad magic".into()));
    }
    let version = read_u32(data, 4);
    if version != GLB_VERSION {
        return Err(AssetError::UnsupportedVersion(version.to_string()));
    }
    let length = read_u32(data, 8) as usize;
    if length > data.len() {
        return Err(AssetError::InvalidGlb(format!(
            "header length {length} exceeds file size {}",
            data.len()
        )));
    }

    let chunk_len = read_u32(data, GLB_HEADER_LEN) as usize;
    let chunk_type = read_u32(data, GLB_HEADER_LEN + 4);
    if chunk_type != CHUNK_JSON {
        return Err(AssetError::InvalidGlb("first chunk is not JSON".into()));
    }
    let start = GLB_HEADER_LEN + 8;
    let end = start
        .checked_add(chunk_len)
        .filter(|&end| end <= length)
        .ok_or_else(|| AssetError::InvalidGlb("JSON chunk overruns file".into()))?;

    Ok(serde_json::from_slice(&data[start..end])?)
}

fn scene_from_json(
    path: &Path,
    format: AssetFormat,
    json: &Value,
    bytes: u64,
) -> Result<SceneAsset, AssetError> {
    let version = json
        .pointer("/asset/version")
        .and_then(Value::as_str)
        .ok_or_else(|| AssetError::UnsupportedVersion("missing asset.version".into()))?;
    if !version.starts_with("2.") {
        return Err(AssetError::UnsupportedVersion(version.to_string()));
    }

    let count = |key: &str| json.get(key).and_then(Value::as_array).map_or(0, Vec::len);

    Ok(SceneAsset {
        path: path.to_path_buf(),
        format,
        generator: json
            .pointer("/asset/generator")
            .and_then(Value::as_str)
            .map(str::to_string),
        nodes: count("nodes"),
        meshes: count("meshes"),
        bytes,
    })
}

/// Outcome of a background load, applied by the session loop.
#[derive(Debug)]
pub enum AssetEvent {
    Progress { id: String, progress: f32 },
    Loaded { id: String, asset: Arc<SceneAsset> },
    Failed { id: String, message: String },
}

/// Background asset loads. Each load runs on its own thread; events are
/// queued and drained by `poll`.
pub struct AssetLoads {
    loader: Arc<dyn AssetLoader>,
    tx: mpsc::UnboundedSender<AssetEvent>,
    rx: mpsc::UnboundedReceiver<AssetEvent>,
}

impl AssetLoads {
    pub fn new(loader: Arc<dyn AssetLoader>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { loader, tx, rx }
    }

    /// Start loading `path` for model `id`.
    pub fn start(&self, id: &str, path: PathBuf) -> Result<(), AssetError> {
        let loader = Arc::clone(&self.loader);
        let tx = self.tx.clone();
        let id = id.to_string();

        std::thread::Builder::new()
            .name("tryon-asset".into())
            .spawn(move || {
                tracing::info!(model = %id, path = %path.display(), "loading asset");
                let mut report = |progress: f32| {
                    let _ = tx.send(AssetEvent::Progress {
                        id: id.clone(),
                        progress,
                    });
                };
                let event = match loader.load(&path, &mut report) {
                    Ok(asset) => AssetEvent::Loaded {
                        id,
                        asset: Arc::new(asset),
                    },
                    Err(e) => AssetEvent::Failed {
                        id,
                        message: e.to_string(),
                    },
                };
                let _ = tx.send(event);
            })
            .map_err(AssetError::Spawn)?;
        Ok(())
    }

    /// Drain queued events without blocking.
    pub fn poll(&mut self) -> Vec<AssetEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}
