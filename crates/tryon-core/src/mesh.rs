//! 468-point face-mesh landmark provider via ONNX Runtime.
//!
//! Two stages: the SCRFD detector finds the face, then a MediaPipe-style
//! face-mesh model runs on a square crop around it (192×192 RGB NHWC input
//! scaled to [-1, 1], 1404-float landmark output in crop pixels, plus an
//! optional face-presence logit). Landmarks are mapped back through the crop
//! into normalized frame coordinates.

use crate::detector::{FaceBox, FaceDetector};
use crate::landmarks::{LandmarkSet, FACE_MESH_POINTS};
use crate::provider::{LandmarkProvider, ProviderError};
use crate::types::Point3;
use image::imageops::FilterType;
use image::{ImageBuffer, Rgb};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

const MESH_INPUT_SIZE: usize = 192;
const MESH_MEAN: f32 = 127.5;
const MESH_STD: f32 = 127.5;
const MESH_PRESENCE_THRESHOLD: f32 = 0.5;
/// The crop side is the longer face-box side grown by this fraction.
const CROP_PAD: f32 = 0.5;
/// Output names used by common exports for the face-presence logit.
const PRESENCE_OUTPUT_NAMES: [&str; 3] = ["conv_faceflag", "face_flag", "score"];

/// Square crop around a detected face, clipped to the frame, in frame pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FaceRegion {
    /// Square region centred on `face` with side `max(w, h) * (1 + pad)`.
    /// `None` when nothing of it lies inside the frame.
    pub fn around(face: &FaceBox, pad: f32, frame_width: u32, frame_height: u32) -> Option<Self> {
        let side = face.width.max(face.height) * (1.0 + pad);
        let cx = face.x + face.width / 2.0;
        let cy = face.y + face.height / 2.0;
        if !(side.is_finite() && cx.is_finite() && cy.is_finite()) {
            return None;
        }

        let x0 = (cx - side / 2.0).max(0.0);
        let y0 = (cy - side / 2.0).max(0.0);
        let x1 = (cx + side / 2.0).min(frame_width as f32);
        let y1 = (cy + side / 2.0).min(frame_height as f32);
        if !(x1 - x0 >= 1.0 && y1 - y0 >= 1.0) {
            return None;
        }

        let x = x0.floor() as u32;
        let y = y0.floor() as u32;
        Some(Self {
            x,
            y,
            width: (x1.ceil() as u32).min(frame_width) - x,
            height: (y1.ceil() as u32).min(frame_height) - y,
        })
    }
}

/// Face-mesh landmark provider.
pub struct FaceMesh {
    detector: Option<FaceDetector>,
    session: Option<Session>,
    /// Index of the face-presence output, when the model has one.
    presence_output: Option<usize>,
    last_timestamp_ms: Option<u64>,
}

impl FaceMesh {
    /// Load the face detector and face-mesh ONNX models.
    pub fn load(mesh_path: &str, detector_path: &str) -> Result<Self, ProviderError> {
        if !Path::new(mesh_path).exists() {
            return Err(ProviderError::ModelNotFound(mesh_path.to_string()));
        }
        let detector = FaceDetector::load(detector_path)?;

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(mesh_path)?;

        let output_names: Vec<String> = session
            .outputs()
            .iter()
            .map(|o| o.name().to_string())
            .collect();

        tracing::info!(
            path = mesh_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?output_names,
            "loaded face-mesh model"
        );

        let presence_output = discover_presence_output(&output_names);
        tracing::debug!(?presence_output, "face-mesh presence output");

        Ok(Self {
            detector: Some(detector),
            session: Some(session),
            presence_output,
            last_timestamp_ms: None,
        })
    }

    /// Crop the face region, resize it to the model input, and normalize into
    /// an NHWC tensor.
    fn preprocess(
        rgb: &[u8],
        width: u32,
        height: u32,
        region: &FaceRegion,
    ) -> Result<Array4<f32>, ProviderError> {
        let view = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_raw(width, height, rgb.to_vec()).ok_or_else(|| {
            ProviderError::InvalidFrame(format!(
                "RGB buffer too short for {width}x{height}: {} bytes",
                rgb.len()
            ))
        })?;
        let crop =
            image::imageops::crop_imm(&view, region.x, region.y, region.width, region.height)
                .to_image();
        let resized = image::imageops::resize(
            &crop,
            MESH_INPUT_SIZE as u32,
            MESH_INPUT_SIZE as u32,
            FilterType::Triangle,
        );

        let mut tensor = Array4::<f32>::zeros((1, MESH_INPUT_SIZE, MESH_INPUT_SIZE, 3));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, y as usize, x as usize, c]] = (pixel[c] as f32 - MESH_MEAN) / MESH_STD;
            }
        }
        Ok(tensor)
    }
}

impl LandmarkProvider for FaceMesh {
    fn name(&self) -> &str {
        "face-mesh"
    }

    fn detect(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
        timestamp_ms: u64,
    ) -> Result<Option<LandmarkSet>, ProviderError> {
        if self.last_timestamp_ms.is_some_and(|last| timestamp_ms <= last) {
            return Err(ProviderError::InvalidFrame(format!(
                "timestamp {timestamp_ms} ms is not after the previous frame"
            )));
        }
        if width == 0 || height == 0 {
            return Err(ProviderError::InvalidFrame("empty frame".into()));
        }
        self.last_timestamp_ms = Some(timestamp_ms);

        let detector = self.detector.as_mut().ok_or(ProviderError::Closed)?;
        let faces = detector.detect(rgb, width, height)?;
        let Some(region) = faces
            .first()
            .and_then(|face| FaceRegion::around(face, CROP_PAD, width, height))
        else {
            tracing::trace!("face detector: no face");
            return Ok(None);
        };

        let input = Self::preprocess(rgb, width, height, &region)?;
        let presence_output = self.presence_output;
        let session = self.session.as_mut().ok_or(ProviderError::Closed)?;

        let outputs = session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        if let Some(idx) = presence_output {
            let (_, logit) = outputs[idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| ProviderError::InferenceFailed(format!("presence: {e}")))?;
            let score = logit.first().copied().map(sigmoid).unwrap_or(0.0);
            if score < MESH_PRESENCE_THRESHOLD {
                tracing::trace!(score, "face-mesh: no face");
                return Ok(None);
            }
        }

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ProviderError::InferenceFailed(format!("landmarks: {e}")))?;

        Ok(decode_landmarks(raw, &region, width, height))
    }

    fn close(&mut self) {
        let detector = self.detector.take();
        if self.session.take().is_some() || detector.is_some() {
            tracing::debug!("face-mesh sessions released");
        }
    }
}

/// Find the face-presence output by name; otherwise assume the second output
/// of a two-output model.
fn discover_presence_output(names: &[String]) -> Option<usize> {
    names
        .iter()
        .position(|n| PRESENCE_OUTPUT_NAMES.iter().any(|p| n.contains(p)))
        .or_else(|| (names.len() >= 2).then_some(1))
}

/// Convert flat `[x, y, z] * 468` crop-input coordinates to a set normalized
/// to the full frame. Depth shares the x scale.
fn decode_landmarks(
    raw: &[f32],
    region: &FaceRegion,
    frame_width: u32,
    frame_height: u32,
) -> Option<LandmarkSet> {
    if raw.len() < FACE_MESH_POINTS * 3 {
        tracing::warn!(len = raw.len(), "face-mesh output too short");
        return None;
    }
    let sx = region.width as f32 / MESH_INPUT_SIZE as f32;
    let sy = region.height as f32 / MESH_INPUT_SIZE as f32;
    let (fw, fh) = (frame_width as f32, frame_height as f32);
    let points = raw
        .chunks_exact(3)
        .take(FACE_MESH_POINTS)
        .map(|p| {
            Point3::new(
                (region.x as f32 + p[0] * sx) / fw,
                (region.y as f32 + p[1] * sy) / fh,
                p[2] * sx / fw,
            )
        })
        .collect();
    Some(LandmarkSet::new(points))
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
