//! SCRFD face detector via ONNX Runtime.
//!
//! Locates the face so the mesh model sees a face crop rather than the whole
//! frame. Anchor-free decoding over strides 8/16/32 with NMS.

use crate::provider::ProviderError;
use image::imageops::FilterType;
use image::{ImageBuffer, Rgb};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

const SCRFD_INPUT_SIZE: usize = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_CONFIDENCE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

/// Detected face box in frame pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub score: f32,
}

impl FaceBox {
    fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection-over-union with another box.
    pub fn iou(&self, other: &FaceBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);
        let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }
}

/// Mapping from letterboxed model input back to frame pixels.
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    fn fit(width: u32, height: u32, size: usize) -> Self {
        let scale = (size as f32 / width as f32).min(size as f32 / height as f32);
        let new_w = (width as f32 * scale).round();
        let new_h = (height as f32 * scale).round();
        Self {
            scale,
            pad_x: ((size as f32 - new_w) / 2.0).floor(),
            pad_y: ((size as f32 - new_h) / 2.0).floor(),
        }
    }

    fn to_frame(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// SCRFD-based face detector.
pub struct FaceDetector {
    session: Session,
    /// Per-stride `(score, bbox)` output indices for strides [8, 16, 32].
    stride_outputs: [(usize, usize); 3],
}

impl FaceDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, ProviderError> {
        if !Path::new(model_path).exists() {
            return Err(ProviderError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> = session
            .outputs()
            .iter()
            .map(|o| o.name().to_string())
            .collect();

        tracing::info!(
            path = model_path,
            outputs = ?output_names,
            "loaded face detector"
        );

        if output_names.len() < 6 {
            return Err(ProviderError::InferenceFailed(format!(
                "SCRFD model needs score and bbox outputs for 3 strides, got {} outputs",
                output_names.len()
            )));
        }

        let stride_outputs = discover_stride_outputs(&output_names);
        tracing::debug!(?stride_outputs, "face detector output mapping");

        Ok(Self {
            session,
            stride_outputs,
        })
    }

    /// Detect faces in a packed RGB8 frame, best first.
    pub fn detect(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<FaceBox>, ProviderError> {
        let (input, letterbox) = preprocess(rgb, width, height)?;
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut faces = Vec::new();
        for (&stride, &(score_idx, bbox_idx)) in SCRFD_STRIDES.iter().zip(&self.stride_outputs) {
            let (_, scores) = outputs[score_idx].try_extract_tensor::<f32>().map_err(|e| {
                ProviderError::InferenceFailed(format!("scores stride {stride}: {e}"))
            })?;
            let (_, bboxes) = outputs[bbox_idx].try_extract_tensor::<f32>().map_err(|e| {
                ProviderError::InferenceFailed(format!("bboxes stride {stride}: {e}"))
            })?;
            faces.extend(decode_stride(
                scores,
                bboxes,
                stride,
                &letterbox,
                SCRFD_CONFIDENCE_THRESHOLD,
            ));
        }

        Ok(suppress_overlaps(faces, SCRFD_NMS_THRESHOLD))
    }
}

/// Letterbox the frame into the square detector input as an NCHW tensor.
fn preprocess(rgb: &[u8], width: u32, height: u32) -> Result<(Array4<f32>, Letterbox), ProviderError> {
    let view = ImageBuffer::<Rgb<u8>, &[u8]>::from_raw(width, height, rgb).ok_or_else(|| {
        ProviderError::InvalidFrame(format!(
            "RGB buffer too short for {width}x{height}: {} bytes",
            rgb.len()
        ))
    })?;

    let letterbox = Letterbox::fit(width, height, SCRFD_INPUT_SIZE);
    let new_w = ((width as f32 * letterbox.scale).round() as u32).max(1);
    let new_h = ((height as f32 * letterbox.scale).round() as u32).max(1);
    let resized = image::imageops::resize(&view, new_w, new_h, FilterType::Triangle);

    // Padding stays at zero, which is the normalized mean.
    let mut tensor = Array4::<f32>::zeros((1, 3, SCRFD_INPUT_SIZE, SCRFD_INPUT_SIZE));
    let (ox, oy) = (letterbox.pad_x as usize, letterbox.pad_y as usize);
    for (x, y, pixel) in resized.enumerate_pixels() {
        let (tx, ty) = (ox + x as usize, oy + y as usize);
        if tx >= SCRFD_INPUT_SIZE || ty >= SCRFD_INPUT_SIZE {
            continue;
        }
        for c in 0..3 {
            tensor[[0, c, ty, tx]] = (pixel[c] as f32 - SCRFD_MEAN) / SCRFD_STD;
        }
    }
    Ok((tensor, letterbox))
}

/// Find `score_<stride>` / `bbox_<stride>` outputs by name, falling back to
/// the positional layout `[scores 8/16/32, bboxes 8/16/32, ...]`.
fn discover_stride_outputs(names: &[String]) -> [(usize, usize); 3] {
    let find = |prefix: &str, stride: usize| {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| *n == target)
    };

    let mut named = [(0, 0); 3];
    for (slot, &stride) in named.iter_mut().zip(&SCRFD_STRIDES) {
        match (find("score", stride), find("bbox", stride)) {
            (Some(score), Some(bbox)) => *slot = (score, bbox),
            _ => return [(0, 3), (1, 4), (2, 5)],
        }
    }
    named
}

fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    stride: usize,
    letterbox: &Letterbox,
    threshold: f32,
) -> Vec<FaceBox> {
    let grid = SCRFD_INPUT_SIZE / stride;
    let anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
    let step = stride as f32;

    let mut faces = Vec::new();
    for idx in 0..anchors.min(scores.len()) {
        let score = scores[idx];
        if score <= threshold {
            continue;
        }
        let Some(d) = bboxes.get(idx * 4..idx * 4 + 4) else {
            continue;
        };
        let cell = idx / SCRFD_ANCHORS_PER_CELL;
        let ax = (cell % grid) as f32 * step;
        let ay = (cell / grid) as f32 * step;

        let (x1, y1) = letterbox.to_frame(ax - d[0] * step, ay - d[1] * step);
        let (x2, y2) = letterbox.to_frame(ax + d[2] * step, ay + d[3] * step);
        faces.push(FaceBox {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            score,
        });
    }
    faces
}

/// Greedy NMS; returns survivors sorted by descending score.
fn suppress_overlaps(mut faces: Vec<FaceBox>, iou_threshold: f32) -> Vec<FaceBox> {
    faces.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut kept: Vec<FaceBox> = Vec::with_capacity(faces.len());
    for face in faces {
        if kept.iter().all(|k| k.iou(&face) <= iou_threshold) {
            kept.push(face);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(x: f32, y: f32, w: f32, h: f32, score: f32) -> FaceBox {
        FaceBox {
            x,
            y,
            width: w,
            height: h,
            score,
        }
    }

    #[test]
    fn test_iou() {
        let a = face(0.0, 0.0, 10.0, 10.0, 1.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert!(a.iou(&face(20.0, 20.0, 10.0, 10.0, 1.0)).abs() < 1e-6);
        let half = a.iou(&face(5.0, 0.0, 10.0, 10.0, 1.0));
        assert!((half - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_suppress_overlaps_keeps_best() {
        let kept = suppress_overlaps(
            vec![
                face(5.0, 5.0, 100.0, 100.0, 0.8),
                face(0.0, 0.0, 100.0, 100.0, 0.9),
                face(200.0, 200.0, 50.0, 50.0, 0.7),
            ],
            0.4,
        );
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].score, 0.9);
        assert_eq!(kept[1].score, 0.7);
    }

    #[test]
    fn test_decode_stride_maps_through_letterbox() {
        // 640x480 frame: scale 1, 80 px of vertical padding.
        let letterbox = Letterbox::fit(640, 480, SCRFD_INPUT_SIZE);
        assert_eq!((letterbox.scale, letterbox.pad_x, letterbox.pad_y), (1.0, 0.0, 80.0));

        let grid = SCRFD_INPUT_SIZE / 32;
        let anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
        let mut scores = vec![0.0; anchors];
        let mut bboxes = vec![0.0; anchors * 4];
        // Cell (x=3, y=4), second anchor.
        let idx = (4 * grid + 3) * SCRFD_ANCHORS_PER_CELL + 1;
        scores[idx] = 0.9;
        bboxes[idx * 4..idx * 4 + 4].copy_from_slice(&[1.0, 1.0, 1.0, 2.0]);

        let faces = decode_stride(&scores, &bboxes, 32, &letterbox, 0.5);
        assert_eq!(faces, vec![face(64.0, 16.0, 64.0, 96.0, 0.9)]);
    }

    #[test]
    fn test_stride_output_discovery() {
        let named: Vec<String> = ["bbox_8", "score_8", "bbox_16", "score_16", "bbox_32", "score_32"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(discover_stride_outputs(&named), [(1, 0), (3, 2), (5, 4)]);

        let numeric: Vec<String> = (0..9).map(|i: usize| i.to_string()).collect();
        assert_eq!(discover_stride_outputs(&numeric), [(0, 3), (1, 4), (2, 5)]);
    }

    #[test]
    fn test_preprocess_letterbox_padding() {
        let (w, h) = (64u32, 32u32);
        let rgb = vec![255u8; (w * h * 3) as usize];
        let (tensor, letterbox) = preprocess(&rgb, w, h).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 640, 640]);
        assert_eq!(letterbox.pad_y, 160.0);
        // Padding rows normalize to zero; image rows to (255 - 127.5) / 128.
        assert_eq!(tensor[[0, 0, 10, 320]], 0.0);
        assert!((tensor[[0, 1, 320, 320]] - 127.5 / 128.0).abs() < 0.01);
    }

    #[test]
    fn test_load_missing_model() {
        assert!(matches!(
            FaceDetector::load("/nonexistent/det_10g.onnx"),
            Err(ProviderError::ModelNotFound(_))
        ));
    }
}
